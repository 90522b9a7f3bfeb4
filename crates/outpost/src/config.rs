//! Configuration management for the Outpost world server.
//!
//! The file holds the world core settings verbatim under `[world]` plus the
//! binary's own logging and bootstrap sections.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;
use world_core::WorldConfig;

/// Application configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Tick cadences, staleness windows and simulation rates
    #[serde(default)]
    pub world: WorldConfig,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub bootstrap: BootstrapSettings,
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
    /// Log every broadcast message the scheduler emits at debug level
    #[serde(default)]
    pub trace_broadcasts: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            trace_broadcasts: false,
        }
    }
}

/// Where the initial world comes from and where it goes on shutdown.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BootstrapSettings {
    /// Seed file (TOML or JSON). The built-in outbreak map is used when unset.
    pub seed_file: Option<String>,
    /// JSON snapshot written after the scheduler stops
    pub snapshot_file: Option<String>,
}

impl AppConfig {
    /// Loads configuration from a TOML file, writing the defaults to `path`
    /// first if it does not exist yet.
    pub async fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        self.world.validate().map_err(|e| e.to_string())?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level, valid_levels
            ));
        }

        if matches!(self.bootstrap.seed_file.as_deref(), Some("")) {
            return Err("Seed file path cannot be empty".to_string());
        }

        Ok(())
    }
}
