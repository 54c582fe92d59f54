//! Tracing subscriber setup for binaries and tests using the client.

use crate::error::{VaultError, VaultResult};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(VaultError::invalid_config(format!("unknown log format '{other}'"))),
        }
    }
}

/// Tracing configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub log_level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl TracingConfig {
    /// Read `VAULT_LOG` and `VAULT_LOG_FORMAT` from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown log format.
    pub fn from_env() -> VaultResult<Self> {
        Self::from_lookup(|name: &str| std::env::var(name).ok())
    }

    /// Read settings through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown log format.
    pub fn from_lookup<F>(lookup: F) -> VaultResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(level) = lookup("VAULT_LOG").filter(|l| !l.is_empty()) {
            config.log_level = level;
        }
        if let Some(format) = lookup("VAULT_LOG_FORMAT") {
            config.format = format.parse()?;
        }
        Ok(config)
    }

    /// Set the filter directive.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Emit JSON.
    #[must_use]
    pub const fn with_json_output(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }
}

/// Install the global subscriber.
///
/// Returns `false` when a subscriber was already installed.
pub fn init_tracing(config: &TracingConfig) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .is_ok(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .is_ok(),
    }
}
