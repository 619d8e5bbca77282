use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use thiserror::Error;
use tracing::info;

use crate::store::ExpiringStore;
use crate::token::{LETTERS, MAX_TOKEN_LENGTH, MIN_TOKEN_LENGTH, generate_token};

/// 60 days.
pub const DEFAULT_CREDENTIAL_TTL: Duration = Duration::from_secs(60 * 24 * 60 * 60);

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("device is not registered")]
    NotRegistered,
    #[error("credential does not match the registered one")]
    Mismatch,
    #[error("credential store failure: {0}")]
    Store(anyhow::Error),
}

/// Token issuing parameters.
#[derive(Debug, Clone)]
pub struct CredentialConfig {
    /// Lifetime of an issued token. Zero means the token never expires.
    pub ttl: Duration,
    pub token_length: usize,
    pub alphabet: &'static [u8],
}

impl CredentialConfig {
    pub fn new(ttl: Duration, token_length: usize) -> Result<Self> {
        if !(MIN_TOKEN_LENGTH..=MAX_TOKEN_LENGTH).contains(&token_length) {
            bail!(
                "token length must be between {} and {}, got {}",
                MIN_TOKEN_LENGTH,
                MAX_TOKEN_LENGTH,
                token_length
            );
        }
        Ok(Self {
            ttl,
            token_length,
            alphabet: LETTERS,
        })
    }

    fn store_ttl(&self) -> Option<Duration> {
        (!self.ttl.is_zero()).then_some(self.ttl)
    }
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_CREDENTIAL_TTL,
            token_length: MIN_TOKEN_LENGTH,
            alphabet: LETTERS,
        }
    }
}

/// Issues and verifies device tokens on top of an [`ExpiringStore`].
///
/// Verification only ever reads; the sole writer is registration.
#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn ExpiringStore>,
    config: CredentialConfig,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn ExpiringStore>, config: CredentialConfig) -> Self {
        Self { store, config }
    }

    /// Store `token` for `device_id`, replacing whatever was there.
    pub async fn register(
        &self,
        device_id: &str,
        token: &str,
        ttl: Option<Duration>,
    ) -> Result<(), CredentialError> {
        self.store
            .set(device_id, token, ttl)
            .await
            .map_err(CredentialError::Store)
    }

    /// Generate a fresh token for `device_id` and register it with the
    /// configured TTL.
    pub async fn issue(&self, device_id: &str) -> Result<String, CredentialError> {
        let token = generate_token(self.config.alphabet, self.config.token_length);
        self.register(device_id, &token, self.config.store_ttl()).await?;
        info!("issued credential for device {}", device_id);
        Ok(token)
    }

    /// Currently registered token for `device_id`.
    pub async fn verify(&self, device_id: &str) -> Result<String, CredentialError> {
        self.store
            .get(device_id)
            .await
            .map_err(CredentialError::Store)?
            .ok_or(CredentialError::NotRegistered)
    }

    /// Verify that `device_id` is registered with exactly `token`.
    pub async fn check(&self, device_id: &str, token: &str) -> Result<(), CredentialError> {
        let stored = self.verify(device_id).await?;
        if stored != token {
            return Err(CredentialError::Mismatch);
        }
        Ok(())
    }

    pub async fn purge_expired(&self) -> Result<usize> {
        self.store.purge_expired().await
    }
}
