//! Envelope device credentials
//!
//! A device registers once and receives an opaque token ("hash") that lives
//! in an expiring key-value store. Requests are then accepted for as long as
//! the device id still resolves to a token.

pub mod credentials;
pub mod store;
pub mod token;

pub use credentials::{CredentialConfig, CredentialError, CredentialStore};
pub use store::{ExpiringStore, MemoryStore};
