use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use envelope_api::Settings;
use envelope_api::stages::region::DEFAULT_REGION_LOOKUP_URL;
use envelope_credentials::{CredentialConfig, credentials::DEFAULT_CREDENTIAL_TTL};

/// Process configuration, read once from the environment at start-up.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub credential_ttl: Duration,
    pub token_length: usize,
    pub request_timeout: Duration,
    pub default_page_size: u32,
    pub max_page_size: u32,
    /// Unset disables the region gate.
    pub working_region: Option<String>,
    pub region_lookup_url: String,
    pub purge_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let port = match std::env::var("PORT") {
            Ok(port) => port.parse().context("invalid PORT")?,
            Err(_) => parse_or("ENVELOPE_PORT", 3000)?,
        };

        let config = Self {
            host: var_or("ENVELOPE_HOST", "0.0.0.0"),
            port,
            db_path: var_or("ENVELOPE_DB_PATH", "envelope.db").into(),
            credential_ttl: Duration::from_secs(parse_or(
                "ENVELOPE_CREDENTIAL_TTL_SECS",
                DEFAULT_CREDENTIAL_TTL.as_secs(),
            )?),
            token_length: parse_or("ENVELOPE_TOKEN_LENGTH", 20)?,
            request_timeout: Duration::from_millis(parse_or("ENVELOPE_REQUEST_TIMEOUT_MS", 10_000)?),
            default_page_size: parse_or("ENVELOPE_DEFAULT_PAGE_SIZE", 20)?,
            max_page_size: parse_or("ENVELOPE_MAX_PAGE_SIZE", 100)?,
            working_region: std::env::var("ENVELOPE_WORKING_REGION")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            region_lookup_url: var_or("ENVELOPE_REGION_LOOKUP_URL", DEFAULT_REGION_LOOKUP_URL),
            purge_interval: Duration::from_secs(parse_or("ENVELOPE_PURGE_INTERVAL_SECS", 3600)?),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            bail!("ENVELOPE_REQUEST_TIMEOUT_MS must be positive");
        }
        if self.default_page_size == 0 || self.max_page_size == 0 {
            bail!("page sizes must be positive");
        }
        if self.purge_interval.is_zero() {
            bail!("ENVELOPE_PURGE_INTERVAL_SECS must be positive");
        }
        Ok(())
    }

    pub fn credential_config(&self) -> Result<CredentialConfig> {
        CredentialConfig::new(self.credential_ttl, self.token_length)
    }

    pub fn settings(&self) -> Settings {
        Settings {
            request_timeout: self.request_timeout,
            default_page_size: self.default_page_size.min(self.max_page_size),
            max_page_size: self.max_page_size,
        }
    }
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.into())
}

fn parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {name}: {raw:?}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            host: "127.0.0.1".into(),
            port: 3000,
            db_path: "envelope.db".into(),
            credential_ttl: DEFAULT_CREDENTIAL_TTL,
            token_length: 20,
            request_timeout: Duration::from_secs(10),
            default_page_size: 20,
            max_page_size: 100,
            working_region: None,
            region_lookup_url: DEFAULT_REGION_LOOKUP_URL.into(),
            purge_interval: Duration::from_secs(3600),
        }
    }

    #[test]
    fn defaults_are_valid() {
        config().validate().unwrap();
    }

    #[test]
    fn zero_request_timeout_is_rejected() {
        let config = Config {
            request_timeout: Duration::ZERO,
            ..config()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ENVELOPE_REQUEST_TIMEOUT_MS"));
    }

    #[test]
    fn zero_page_sizes_and_purge_interval_are_rejected() {
        assert!(Config { max_page_size: 0, ..config() }.validate().is_err());
        assert!(Config { default_page_size: 0, ..config() }.validate().is_err());
        assert!(
            Config {
                purge_interval: Duration::ZERO,
                ..config()
            }
            .validate()
            .is_err()
        );
    }

    #[test]
    fn default_page_size_never_exceeds_max() {
        let settings = Config {
            default_page_size: 50,
            max_page_size: 10,
            ..config()
        }
        .settings();
        assert_eq!(settings.default_page_size, 10);
    }
}
