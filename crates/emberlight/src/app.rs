//! Main application logic and lifecycle management.
//!
//! This module contains the core `Application` struct that orchestrates
//! engine startup, the heartbeat, and graceful shutdown.

use crate::{cli::CliArgs, config::AppConfig, logging::display_banner, signals::wait_for_shutdown};
use ember_kernel::{EngineHandle, SchedulerError, SharedState};
use plugin_autosave::AutosavePlugin;
use plugin_chronicle::ChroniclePlugin;
use plugin_runtime::PluginManager;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Scheduler owner tag for timers the host itself runs.
const HOST_TIMER_OWNER: &str = "host";

/// Main application struct.
///
/// The `Application` struct manages the complete lifecycle of the Emberlight
/// engine: configuration loading, kernel wiring, plugin activation, the
/// heartbeat, and graceful shutdown handling.
pub struct Application {
    /// Loaded application configuration
    config: AppConfig,
    /// Shared engine kernel handle
    engine: Arc<EngineHandle>,
    /// Plugin lifecycle coordinator
    manager: PluginManager,
}

impl Application {
    /// Creates a new application instance.
    ///
    /// Loads configuration, applies CLI overrides, validates settings, wires
    /// up the engine kernel, and registers the bundled plugins.
    ///
    /// # Process
    ///
    /// 1. Load configuration from file (creating default if missing)
    /// 2. Apply command-line argument overrides
    /// 3. Validate merged configuration
    /// 4. Display startup banner
    /// 5. Wire up the kernel around a fresh world snapshot
    /// 6. Register the bundled plugins
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        // Apply CLI overrides
        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }
        if args.json_logs {
            config.logging.json_format = true;
        }
        if let Some(tick_interval_ms) = args.tick_interval_ms {
            config.engine.tick_interval_ms = tick_interval_ms;
        }
        if let Some(autosave_interval_secs) = args.autosave_interval_secs {
            config.autosave.interval_secs = autosave_interval_secs;
        }

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration loaded and validated successfully");

        display_banner();

        // A fresh world. A real game would hydrate this from the save vault.
        let state = Arc::new(SharedState::new(json!({
            "world": { "entities": {}, "clock": 0 },
            "settings": {},
        })));
        let engine = EngineHandle::new(config.to_engine_config(), state);

        let mut manager = PluginManager::new(engine.clone());
        manager.register(Box::new(ChroniclePlugin::default()));
        manager.register(Box::new(AutosavePlugin::new(Duration::from_secs(
            config.autosave.interval_secs,
        ))));

        info!("🚀 Emberlight Engine v{}", env!("CARGO_PKG_VERSION"));
        info!("📂 Config: {}", args.config_path.display());

        Ok(Self {
            config,
            engine,
            manager,
        })
    }

    /// Runs the application until a shutdown signal arrives.
    ///
    /// Activates the plugin set, starts the heartbeat, waits for a
    /// termination signal, and then walks everything back down: host timers
    /// first, then plugins in reverse activation order.
    pub async fn run(mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🌟 Starting Emberlight Engine");
        self.log_configuration_summary();

        self.manager.activate().await?;
        for status in self.manager.statuses() {
            match &status.failure {
                None => info!("  🔌 {} -> {}", status.id, status.phase),
                Some(reason) => info!("  🔌 {} -> {} ({reason})", status.id, status.phase),
            }
        }

        // Heartbeat: everything time-based downstream hangs off this event.
        let engine = self.engine.clone();
        let ticks = Arc::new(AtomicU64::new(0));
        self.engine.scheduler().every(
            Duration::from_millis(self.config.engine.tick_interval_ms),
            HOST_TIMER_OWNER,
            move || {
                let tick = ticks.fetch_add(1, Ordering::Relaxed);
                engine
                    .events()
                    .emit("engine:tick", json!(tick))
                    .map_err(|e| SchedulerError::CallbackFailed(e.to_string()))?;
                Ok(())
            },
        );

        info!("✅ Emberlight Engine is now running!");
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        wait_for_shutdown().await?;

        info!("🛑 Shutdown signal received, beginning graceful shutdown...");

        // Host timers first so no tick lands mid-teardown.
        self.engine.scheduler().cancel_all_for_owner(HOST_TIMER_OWNER);

        self.manager.shutdown().await;

        let bundle = self.engine.diagnostics();
        info!("📊 Final Statistics:");
        info!("  - Events traced: {}", bundle.events.len());
        info!("  - Commands logged: {}", bundle.commands.len());
        info!("  - Errors recorded: {}", bundle.errors.len());

        info!("✅ Emberlight Engine shutdown complete");
        Ok(())
    }

    /// Logs the configuration summary at startup.
    fn log_configuration_summary(&self) {
        info!("📋 Configuration Summary:");
        info!("  ⏱️ Tick interval: {}ms", self.config.engine.tick_interval_ms);
        info!("  💾 Autosave every: {}s", self.config.autosave.interval_secs);
        info!(
            "  📜 Rings: {} events | {} commands | {} errors",
            self.config.engine.event_trace_capacity,
            self.config.engine.command_log_capacity,
            self.config.engine.error_log_capacity
        );
    }
}
