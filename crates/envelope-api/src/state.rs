use std::sync::Arc;
use std::time::Duration;

use envelope_credentials::CredentialStore;
use envelope_db::Database;

use crate::stages::region::RegionGate;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub credentials: CredentialStore,
    /// `None` disables the region check on registration.
    pub region_gate: Option<RegionGate>,
    pub settings: Settings,
}

/// Request handling knobs. Fixed for the life of the process.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Wall-clock budget for a whole request, store calls included.
    pub request_timeout: Duration,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}
