//! Configuration management for the Emberlight host.
//!
//! Loads, validates, and converts host configuration from a TOML file and
//! command-line overrides. A missing config file is created with defaults so
//! a fresh checkout runs without setup.

use ember_kernel::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

fn default_event_trace_capacity() -> usize {
    300
}

fn default_command_log_capacity() -> usize {
    300
}

fn default_error_log_capacity() -> usize {
    200
}

fn default_tick_interval() -> u64 {
    1000
}

fn default_autosave_interval() -> u64 {
    30
}

/// Host configuration loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Engine kernel settings
    #[serde(default)]
    pub engine: EngineSettings,
    /// Autosave plugin settings
    #[serde(default)]
    pub autosave: AutosaveSettings,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Kernel capacities and the host heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Event trace ring capacity
    #[serde(default = "default_event_trace_capacity")]
    pub event_trace_capacity: usize,
    /// Command replay tape capacity
    #[serde(default = "default_command_log_capacity")]
    pub command_log_capacity: usize,
    /// Error log ring capacity
    #[serde(default = "default_error_log_capacity")]
    pub error_log_capacity: usize,
    /// `engine:tick` heartbeat interval in milliseconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

/// Autosave cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutosaveSettings {
    /// Seconds between autosaves
    #[serde(default = "default_autosave_interval")]
    pub interval_secs: u64,
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            event_trace_capacity: default_event_trace_capacity(),
            command_log_capacity: default_command_log_capacity(),
            error_log_capacity: default_error_log_capacity(),
            tick_interval_ms: default_tick_interval(),
        }
    }
}

impl Default for AutosaveSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_autosave_interval(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineSettings::default(),
            autosave: AutosaveSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from `path`, writing a default file if none
    /// exists.
    pub async fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if !path.exists() {
            let config = AppConfig::default();
            let content = toml::to_string_pretty(&config)?;
            tokio::fs::write(path, content).await?;
            info!("📝 Created default configuration at {}", path.display());
            return Ok(config);
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Validates the merged configuration before the engine boots.
    pub fn validate(&self) -> Result<(), String> {
        if self.engine.tick_interval_ms == 0 {
            return Err("engine.tick_interval_ms must be greater than zero".to_string());
        }
        if self.autosave.interval_secs == 0 {
            return Err("autosave.interval_secs must be greater than zero".to_string());
        }
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(format!("unknown logging.level `{other}`")),
        }
    }

    /// Converts the engine section into the kernel's config struct.
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            event_trace_capacity: self.engine.event_trace_capacity,
            command_log_capacity: self.engine.command_log_capacity,
            error_log_capacity: self.engine.error_log_capacity,
        }
    }
}
