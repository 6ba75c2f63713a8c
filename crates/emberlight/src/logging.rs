//! Logging system setup and configuration.
//!
//! This module handles the initialization and configuration of the
//! tracing-based logging system with support for both human-readable and
//! JSON output formats.

use crate::config::LoggingSettings;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the logging system with the specified configuration.
///
/// Sets up tracing-subscriber with appropriate formatting, filtering, and
/// output based on the provided logging settings and CLI overrides. Respects
/// `RUST_LOG` when set.
///
/// # Arguments
///
/// * `config` - Logging configuration from the config file
/// * `json_format` - Whether to force JSON output format (CLI override)
pub fn setup_logging(
    config: &LoggingSettings,
    json_format: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let log_level = config.level.as_str();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let base = fmt::layer()
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(true)
        .with_thread_names(true);

    let registry = tracing_subscriber::registry().with(filter);
    if json_format || config.json_format {
        registry.with(base.json()).init();
    } else {
        registry.with(base.with_ansi(true)).init();
    }

    info!("🔧 Logging initialized with level: {}", log_level);
    Ok(())
}

/// Displays the startup banner using proper logging.
///
/// Shows the Emberlight logo and version information using structured
/// logging instead of direct console output.
pub fn display_banner() {
    let version = option_env!("CARGO_PKG_VERSION").unwrap_or("UNK");
    info!("╔══════════════════════════════════════════╗");
    info!("║          🔥 EMBERLIGHT ENGINE 🔥         ║");
    info!("║              Kernel v{}              ║", version);
    info!("║                                          ║");
    info!("║  In-Process Game Engine Kernel           ║");
    info!("║  with Plugin Lifecycle Runtime           ║");
    info!("║                                          ║");
    info!("║  📣 Synchronous Event Bus                ║");
    info!("║  🔗 Middleware Command Bus               ║");
    info!("║  ⏲️  Owner-Scoped Timers                  ║");
    info!("║  🗺️  Save Format Migrations               ║");
    info!("║  🔌 Dependency-Ordered Plugins           ║");
    info!("║                                          ║");
    info!("╚══════════════════════════════════════════╝");
}
