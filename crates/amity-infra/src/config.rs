//! Configuration loader for Amity.
//!
//! Reads `config.toml` from the data directory (`~/.amity/` in production)
//! and deserializes it into [`CoreConfig`]. Falls back to defaults when the
//! file is missing or malformed; a broken config file never prevents
//! startup. The shared encryption/API secret is never read from the file,
//! only from the `AMITY_SECRET` environment variable.

use std::path::Path;
use std::time::Duration;

use amity_core::pipeline::PipelineConfig;
use secrecy::SecretString;
use serde::Deserialize;

/// Top-level configuration for the messaging core.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Base URL of the coaching backend.
    pub backend_url: String,
    /// Budget in seconds for one dispatch attempt, stream included.
    pub dispatch_timeout_secs: u64,
    /// Total dispatch attempts (first try plus retries).
    pub max_attempts: u32,
    /// First backoff delay in milliseconds; doubles per retry.
    pub backoff_base_ms: u64,
    /// Turns kept in each in-memory conversation window.
    pub context_window_size: usize,
    /// Idle seconds before a conversation window expires.
    pub context_idle_secs: u64,
    /// Maximum outbound message length in characters.
    pub max_message_chars: usize,
    /// Override for the SQLite database URL. When absent, the path is
    /// derived from `AMITY_DATA_DIR`.
    pub database_url: Option<String>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            backend_url: "https://coach.amity.dev".to_string(),
            dispatch_timeout_secs: 30,
            max_attempts: 3,
            backoff_base_ms: 1_000,
            context_window_size: 20,
            context_idle_secs: 1_800,
            max_message_chars: 2_000,
            database_url: None,
        }
    }
}

impl CoreConfig {
    /// Pipeline knobs derived from this config.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            dispatch_timeout: Duration::from_secs(self.dispatch_timeout_secs),
            max_attempts: self.max_attempts,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            max_message_chars: self.max_message_chars,
        }
    }

    /// Idle expiry for the context manager.
    pub fn context_idle(&self) -> Duration {
        Duration::from_secs(self.context_idle_secs)
    }
}

/// Load configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`CoreConfig::default()`].
/// - If the file exists but fails to read or parse, logs a warning and
///   returns the default.
pub async fn load_config(data_dir: &Path) -> CoreConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return CoreConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return CoreConfig::default();
        }
    };

    match toml::from_str::<CoreConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            CoreConfig::default()
        }
    }
}

/// Shared secret from the `AMITY_SECRET` environment variable.
///
/// The secret backs both message encryption and backend authentication,
/// so it lives only in the environment and is wrapped the moment it is
/// read.
pub fn load_secret() -> Option<SecretString> {
    std::env::var("AMITY_SECRET").ok().map(SecretString::from)
}
