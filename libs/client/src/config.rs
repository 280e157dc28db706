//! Client configuration
//!
//! Values are layered: built-in defaults, then an optional config file, then
//! `MEDHOME_*` environment variables (`MEDHOME_BASE_URL`,
//! `MEDHOME_REFRESH_INTERVAL_SECS`, `MEDHOME_REQUEST_TIMEOUT_SECS`,
//! `MEDHOME_TOKEN_PATH`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::error::ClientError;

/// Proactive refresh period: 6 hours.
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 6 * 60 * 60;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_BASE_URL: &str = "http://localhost:3001";

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// Root URL of the MedHome API
    pub base_url: String,
    pub refresh_interval_secs: u64,
    pub request_timeout_secs: u64,
    /// Where to persist tokens; in memory when unset
    #[serde(default)]
    pub token_path: Option<PathBuf>,
}

impl ClientConfig {
    /// Defaults pointed at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            token_path: None,
        }
    }

    /// Load the layered configuration. A `file` that does not exist is
    /// skipped.
    pub fn load(file: Option<&Path>) -> Result<Self, ClientError> {
        let mut builder = Config::builder()
            .set_default("base_url", DEFAULT_BASE_URL)?
            .set_default("refresh_interval_secs", DEFAULT_REFRESH_INTERVAL_SECS as i64)?
            .set_default("request_timeout_secs", DEFAULT_REQUEST_TIMEOUT_SECS as i64)?;

        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(false));
        }

        let config: Self = builder
            .add_source(Environment::with_prefix("MEDHOME").try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::Message(format!(
                "base_url must be an http(s) URL, got {}",
                self.base_url
            )));
        }
        if self.refresh_interval_secs == 0 {
            return Err(ConfigError::Message(
                "refresh_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
