//! Autosave plugin: periodic snapshots and save-format migration.
//!
//! Exercises the kernel's scheduler and migration registry the way the save
//! system in the game does: a recurring owner-scoped timer wraps the current
//! world snapshot into a versioned save, and loading an old save walks the
//! registered migration edges up to the current format.
//!
//! Save format history:
//! - `save/1`: the bare world snapshot with a version tag
//! - `save/2`: world moved under a `world` key, `settings` added
//! - `save/3`: `saved_at` timestamp added

use async_trait::async_trait;
use chrono::Utc;
use ember_kernel::{EngineHandle, MigrationError, MigrationRegistry, Snapshot};
use plugin_chronicle::{ChronicleService, CHRONICLE_SERVICE};
use plugin_runtime::{Plugin, PluginError};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;

/// Current save format version label.
pub const SAVE_VERSION: &str = "save/3";

/// Service name the vault is published under.
pub const VAULT_SERVICE: &str = "savegame:vault";

/// Scheduler owner tag for all autosave timers.
const TIMER_OWNER: &str = "autosave";

/// Holds the most recent save and knows how to bring old saves forward.
pub struct SaveVault {
    migrations: MigrationRegistry,
    latest: Mutex<Option<Snapshot>>,
}

impl SaveVault {
    fn new() -> Self {
        let migrations = MigrationRegistry::new();

        migrations.register("save/1", "save/2", |old| {
            let mut world = old;
            if let Some(map) = world.as_object_mut() {
                map.remove("version");
            }
            Ok(json!({
                "version": "save/2",
                "world": world,
                "settings": {},
            }))
        });

        migrations.register("save/2", "save/3", |mut save| {
            save["version"] = json!("save/3");
            save["saved_at"] = json!(null);
            Ok(save)
        });

        Self {
            migrations,
            latest: Mutex::new(None),
        }
    }

    /// Stores a freshly written save.
    pub fn store(&self, save: Snapshot) {
        let mut guard = match self.latest.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(save);
    }

    /// The most recent save, if any autosave has fired.
    pub fn latest(&self) -> Option<Snapshot> {
        let guard = match self.latest.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.clone()
    }

    /// Migrates a save of any known version to [`SAVE_VERSION`]. A failed
    /// migration means the save must not be loaded.
    pub fn load(&self, save: &Snapshot) -> Result<Snapshot, MigrationError> {
        let version = save
            .get("version")
            .and_then(|v| v.as_str())
            .unwrap_or("save/1");
        self.migrations.migrate_state(save, version, SAVE_VERSION)
    }

    /// The migration registry, exposed for diagnostics.
    pub fn migrations(&self) -> &MigrationRegistry {
        &self.migrations
    }
}

/// The autosave feature plugin.
pub struct AutosavePlugin {
    interval: Duration,
    vault: Option<Arc<SaveVault>>,
}

impl AutosavePlugin {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            vault: None,
        }
    }
}

#[async_trait]
impl Plugin for AutosavePlugin {
    fn id(&self) -> &str {
        "autosave"
    }

    fn requires(&self) -> Vec<String> {
        vec!["chronicle".to_string()]
    }

    async fn init(&mut self, engine: Arc<EngineHandle>) -> Result<(), PluginError> {
        let vault = Arc::new(SaveVault::new());
        engine.services().register(VAULT_SERVICE, vault.clone());
        self.vault = Some(vault);
        Ok(())
    }

    async fn start(&mut self, engine: Arc<EngineHandle>) -> Result<(), PluginError> {
        let vault = self
            .vault
            .clone()
            .ok_or_else(|| PluginError::ExecutionError("vault missing".to_string()))?;

        // Chronicle is a declared dependency, so its service is present by
        // the time we start.
        if let Some(chronicle) = engine.services().get::<ChronicleService>(CHRONICLE_SERVICE) {
            chronicle.note("autosave online");
        }

        let engine_for_timer = engine.clone();
        engine
            .scheduler()
            .every(self.interval, TIMER_OWNER, move || {
                let world = engine_for_timer.get_state();
                let save = json!({
                    "version": SAVE_VERSION,
                    "world": world,
                    "settings": {},
                    "saved_at": Utc::now().to_rfc3339(),
                });
                vault.store(save);
                engine_for_timer
                    .events()
                    .emit("autosave:written", json!({ "version": SAVE_VERSION }))
                    .map_err(|e| {
                        ember_kernel::SchedulerError::CallbackFailed(e.to_string())
                    })?;
                Ok(())
            });

        info!("💾 Autosave running every {:?}", self.interval);
        Ok(())
    }

    async fn stop(&mut self, engine: Arc<EngineHandle>) -> Result<(), PluginError> {
        // Owner-scoped cancel guarantees no autosave timer outlives us.
        engine.scheduler().cancel_all_for_owner(TIMER_OWNER);
        Ok(())
    }

    async fn dispose(&mut self, engine: Arc<EngineHandle>) -> Result<(), PluginError> {
        engine.services().unregister(VAULT_SERVICE);
        self.vault = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_kernel::{EngineConfig, SharedState};
    use plugin_chronicle::ChroniclePlugin;
    use plugin_runtime::PluginManager;

    fn engine() -> Arc<EngineHandle> {
        let state = Arc::new(SharedState::new(json!({ "gold": 42 })));
        EngineHandle::new(EngineConfig::default(), state)
    }

    #[tokio::test(start_paused = true)]
    async fn writes_saves_on_schedule_and_stops_cleanly() {
        let engine = engine();
        let mut manager = PluginManager::new(engine.clone());
        manager.register(Box::new(ChroniclePlugin::default()));
        manager.register(Box::new(AutosavePlugin::new(Duration::from_secs(30))));
        manager.activate().await.unwrap();

        let vault = engine.services().get::<SaveVault>(VAULT_SERVICE).unwrap();
        assert!(vault.latest().is_none());

        tokio::time::sleep(Duration::from_secs(31)).await;
        let save = vault.latest().expect("autosave should have fired");
        assert_eq!(save["version"], json!(SAVE_VERSION));
        assert_eq!(save["world"]["gold"], json!(42));

        manager.shutdown().await;
        assert_eq!(engine.scheduler().active_count_for_owner("autosave"), 0);

        // No firing after shutdown.
        let before = vault.latest();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(vault.latest(), before);
    }

    #[tokio::test]
    async fn loads_old_saves_through_the_migration_chain() {
        let vault = SaveVault::new();

        let ancient = json!({ "version": "save/1", "gold": 7 });
        let loaded = vault.load(&ancient).unwrap();
        assert_eq!(loaded["version"], json!(SAVE_VERSION));
        assert_eq!(loaded["world"]["gold"], json!(7));
        assert!(loaded.get("settings").is_some());
        assert!(loaded.get("saved_at").is_some());

        // Current-format saves load unchanged.
        let current = json!({ "version": SAVE_VERSION, "world": {}, "settings": {}, "saved_at": null });
        assert_eq!(vault.load(&current).unwrap(), current);

        // Unknown versions are refused, never half-loaded.
        let future = json!({ "version": "save/99" });
        assert!(matches!(
            vault.load(&future).unwrap_err(),
            MigrationError::NoPath { .. }
        ));
    }
}
