use std::time::Duration;

use envelope_credentials::CredentialStore;
use tracing::{info, warn};

/// Background task that drops expired device credentials.
pub async fn run_purge_loop(credentials: CredentialStore, interval: Duration) {
    let mut interval = tokio::time::interval(interval);

    loop {
        interval.tick().await;

        match credentials.purge_expired().await {
            Ok(0) => {}
            Ok(count) => info!("Purge: dropped {} expired credentials", count),
            Err(e) => warn!("Purge error: {:#}", e),
        }
    }
}
