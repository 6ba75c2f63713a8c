//! Dependency-ordered plugin activation and shutdown.
//!
//! The manager is the top-level coordinator of the engine: the host registers
//! plugins, calls [`PluginManager::activate`] once, and calls
//! [`PluginManager::shutdown`] when the game closes. Everything in between
//! happens through the shared engine handle the manager exposes to plugins.

use crate::error::{ActivationError, PluginError};
use crate::plugin::{LifecyclePhase, Plugin};
use ember_kernel::utils::panic_message;
use ember_kernel::{EngineHandle, ErrorOrigin};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn};

struct PluginSlot {
    id: String,
    requires: Vec<String>,
    plugin: Box<dyn Plugin>,
    phase: LifecyclePhase,
    /// Own failure or dependency-skip reason; set once, blocks later phases
    /// and dependents.
    failure: Option<String>,
}

/// Introspection view of one registered plugin.
#[derive(Debug, Clone)]
pub struct PluginStatus {
    pub id: String,
    pub phase: LifecyclePhase,
    pub failure: Option<String>,
}

/// Plugin lifecycle coordinator.
pub struct PluginManager {
    engine: Arc<EngineHandle>,
    slots: Vec<PluginSlot>,
    /// Activation order, valid after a successful `activate`
    order: Vec<usize>,
    activated: bool,
}

impl PluginManager {
    pub fn new(engine: Arc<EngineHandle>) -> Self {
        Self {
            engine,
            slots: Vec::new(),
            order: Vec::new(),
            activated: false,
        }
    }

    /// The engine handle shared with every plugin.
    pub fn engine(&self) -> Arc<EngineHandle> {
        self.engine.clone()
    }

    /// Registers a plugin. Registration order is the tie-breaker for
    /// activation order among plugins with no dependency relationship.
    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        let id = plugin.id().to_string();
        let requires = plugin.requires();
        debug!("🔌 Registered plugin `{id}` (requires: {requires:?})");
        self.slots.push(PluginSlot {
            id,
            requires,
            plugin,
            phase: LifecyclePhase::Registered,
            failure: None,
        });
    }

    /// Activates the registered set: resolves the dependency order, then
    /// runs every plugin's `init` (each awaited to completion) before any
    /// plugin's `start`.
    ///
    /// Configuration errors (duplicate/empty ids, unknown dependencies,
    /// cycles) are returned before any plugin code runs. Individual plugin
    /// failures are isolated: they mark the plugin and its dependents as
    /// unavailable but do not fail activation of independent plugins.
    pub async fn activate(&mut self) -> Result<(), ActivationError> {
        if self.activated {
            return Err(ActivationError::AlreadyActivated);
        }
        let order = self.resolve_order()?;
        self.order = order.clone();
        self.activated = true;

        info!("🚀 Activating {} plugins", order.len());

        // Phase 1: init. Services get registered here; no plugin may assume
        // any other plugin has started.
        for &index in &order {
            if self.mark_if_blocked(index) {
                continue;
            }
            let engine = self.engine.clone();
            let slot = &mut self.slots[index];
            let outcome = AssertUnwindSafe(slot.plugin.init(engine))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => {
                    slot.phase = LifecyclePhase::Initialized;
                    debug!("✅ Plugin `{}` initialized", slot.id);
                }
                Ok(Err(e)) => self.record_failure(index, "init", e.to_string()),
                Err(panic_info) => {
                    self.record_failure(index, "init", panic_message(panic_info))
                }
            }
        }

        // Phase 2: start, same order. All inits have completed; plugins may
        // now read each other's services.
        for &index in &order {
            if self.slots[index].failure.is_some() || self.mark_if_blocked(index) {
                continue;
            }
            if self.slots[index].phase != LifecyclePhase::Initialized {
                continue;
            }
            let engine = self.engine.clone();
            let slot = &mut self.slots[index];
            let outcome = AssertUnwindSafe(slot.plugin.start(engine))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => {
                    slot.phase = LifecyclePhase::Started;
                    info!("▶️ Plugin `{}` started", slot.id);
                }
                Ok(Err(e)) => self.record_failure(index, "start", e.to_string()),
                Err(panic_info) => {
                    self.record_failure(index, "start", panic_message(panic_info))
                }
            }
        }

        Ok(())
    }

    /// Shuts the set down in reverse activation order: each plugin's `stop`
    /// then `dispose`. Per-plugin cleanup failures are logged and never block
    /// another plugin's cleanup.
    pub async fn shutdown(&mut self) {
        info!("🛑 Shutting down {} plugins", self.order.len());
        let order = self.order.clone();

        for &index in order.iter().rev() {
            if self.slots[index].phase == LifecyclePhase::Started {
                let engine = self.engine.clone();
                let slot = &mut self.slots[index];
                let outcome = AssertUnwindSafe(slot.plugin.stop(engine))
                    .catch_unwind()
                    .await;
                slot.phase = LifecyclePhase::Stopped;
                match outcome {
                    Ok(Ok(())) => debug!("⏹️ Plugin `{}` stopped", slot.id),
                    Ok(Err(e)) => self.log_cleanup_failure(index, "stop", e.to_string()),
                    Err(panic_info) => {
                        self.log_cleanup_failure(index, "stop", panic_message(panic_info))
                    }
                }
            }

            let phase = self.slots[index].phase;
            if phase == LifecyclePhase::Initialized || phase == LifecyclePhase::Stopped {
                let engine = self.engine.clone();
                let slot = &mut self.slots[index];
                let outcome = AssertUnwindSafe(slot.plugin.dispose(engine))
                    .catch_unwind()
                    .await;
                slot.phase = LifecyclePhase::Disposed;
                match outcome {
                    Ok(Ok(())) => debug!("🗑️ Plugin `{}` disposed", slot.id),
                    Ok(Err(e)) => self.log_cleanup_failure(index, "dispose", e.to_string()),
                    Err(panic_info) => {
                        self.log_cleanup_failure(index, "dispose", panic_message(panic_info))
                    }
                }
            }
        }
    }

    /// Stops one started plugin. The plugin stays registered and may be
    /// restarted later.
    pub async fn stop_plugin(&mut self, id: &str) -> Result<(), PluginError> {
        let index = self
            .slots
            .iter()
            .position(|slot| slot.id == id)
            .ok_or_else(|| PluginError::NotFound(id.to_string()))?;

        if self.slots[index].phase != LifecyclePhase::Started {
            return Err(PluginError::InvalidPhase {
                id: id.to_string(),
                phase: self.slots[index].phase.to_string(),
                attempted: "stop".to_string(),
            });
        }

        let engine = self.engine.clone();
        let slot = &mut self.slots[index];
        let outcome = AssertUnwindSafe(slot.plugin.stop(engine))
            .catch_unwind()
            .await;
        slot.phase = LifecyclePhase::Stopped;
        match outcome {
            Ok(Ok(())) => {
                debug!("⏹️ Plugin `{}` stopped", slot.id);
                Ok(())
            }
            Ok(Err(e)) => Err(PluginError::ExecutionError(e.to_string())),
            Err(panic_info) => Err(PluginError::ExecutionError(panic_message(panic_info))),
        }
    }

    /// Restarts one stopped plugin back to started.
    pub async fn restart(&mut self, id: &str) -> Result<(), PluginError> {
        let index = self
            .slots
            .iter()
            .position(|slot| slot.id == id)
            .ok_or_else(|| PluginError::NotFound(id.to_string()))?;

        if self.slots[index].phase != LifecyclePhase::Stopped {
            return Err(PluginError::InvalidPhase {
                id: id.to_string(),
                phase: self.slots[index].phase.to_string(),
                attempted: "restart".to_string(),
            });
        }

        let engine = self.engine.clone();
        let slot = &mut self.slots[index];
        let outcome = AssertUnwindSafe(slot.plugin.start(engine))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => {
                slot.phase = LifecyclePhase::Started;
                info!("▶️ Plugin `{}` restarted", slot.id);
                Ok(())
            }
            Ok(Err(e)) => Err(PluginError::ExecutionError(e.to_string())),
            Err(panic_info) => Err(PluginError::ExecutionError(panic_message(panic_info))),
        }
    }

    /// Introspection snapshot of every registered plugin.
    pub fn statuses(&self) -> Vec<PluginStatus> {
        self.slots
            .iter()
            .map(|slot| PluginStatus {
                id: slot.id.clone(),
                phase: slot.phase,
                failure: slot.failure.clone(),
            })
            .collect()
    }

    /// Stable topological order: repeatedly picks the first registered
    /// plugin whose dependencies are all placed, so ties break by
    /// registration order. Fails before any plugin runs on configuration
    /// errors.
    fn resolve_order(&self) -> Result<Vec<usize>, ActivationError> {
        let n = self.slots.len();

        for (index, slot) in self.slots.iter().enumerate() {
            if slot.id.is_empty() {
                return Err(ActivationError::EmptyPluginId);
            }
            if self.slots[..index].iter().any(|other| other.id == slot.id) {
                return Err(ActivationError::DuplicatePluginId(slot.id.clone()));
            }
            for dependency in &slot.requires {
                if !self.slots.iter().any(|other| &other.id == dependency) {
                    return Err(ActivationError::UnknownDependency {
                        plugin: slot.id.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }

        let mut placed = vec![false; n];
        let mut order = Vec::with_capacity(n);
        while order.len() < n {
            let next = (0..n).find(|&i| {
                !placed[i]
                    && self.slots[i].requires.iter().all(|dependency| {
                        self.slots
                            .iter()
                            .position(|other| &other.id == dependency)
                            .map(|j| placed[j])
                            .unwrap_or(false)
                    })
            });
            match next {
                Some(i) => {
                    placed[i] = true;
                    order.push(i);
                }
                None => {
                    let involved = self
                        .slots
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| !placed[*i])
                        .map(|(_, slot)| slot.id.clone())
                        .collect();
                    return Err(ActivationError::DependencyCycle { involved });
                }
            }
        }
        Ok(order)
    }

    /// If any dependency of the plugin has failed or been skipped, marks the
    /// plugin skipped with a reason naming the dependency. Returns whether it
    /// was blocked.
    fn mark_if_blocked(&mut self, index: usize) -> bool {
        if self.slots[index].failure.is_some() {
            return false; // already has its own reason
        }
        let blocked = self.slots[index].requires.iter().find_map(|dependency| {
            self.slots
                .iter()
                .find(|other| &other.id == dependency)
                .and_then(|other| {
                    other
                        .failure
                        .as_ref()
                        .map(|reason| format!("dependency `{dependency}` unavailable: {reason}"))
                })
        });
        if let Some(reason) = blocked {
            warn!("⏭️ Skipping plugin `{}`: {reason}", self.slots[index].id);
            self.slots[index].failure = Some(reason);
            true
        } else {
            false
        }
    }

    fn record_failure(&mut self, index: usize, phase: &str, message: String) {
        let id = self.slots[index].id.clone();
        warn!("❌ Plugin `{id}` failed during {phase}: {message}");
        self.engine.errors().record(
            ErrorOrigin::Plugin { id },
            format!("{phase} failed: {message}"),
        );
        self.slots[index].failure = Some(message);
    }

    fn log_cleanup_failure(&self, index: usize, phase: &str, message: String) {
        let id = self.slots[index].id.clone();
        warn!("❌ Plugin `{id}` failed during {phase}: {message}");
        self.engine.errors().record(
            ErrorOrigin::Plugin { id },
            format!("{phase} failed: {message}"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ember_kernel::{EngineConfig, SharedState};
    use serde_json::json;
    use std::sync::Mutex;

    type Journal = Arc<Mutex<Vec<String>>>;

    #[derive(Default)]
    struct Behavior {
        fail_init: bool,
        panic_init: bool,
        fail_start: bool,
        fail_stop: bool,
    }

    struct TestPlugin {
        id: String,
        requires: Vec<String>,
        journal: Journal,
        behavior: Behavior,
    }

    impl TestPlugin {
        fn new(id: &str, requires: &[&str], journal: &Journal) -> Box<Self> {
            Box::new(Self {
                id: id.to_string(),
                requires: requires.iter().map(|s| s.to_string()).collect(),
                journal: journal.clone(),
                behavior: Behavior::default(),
            })
        }

        fn with_behavior(mut self: Box<Self>, behavior: Behavior) -> Box<Self> {
            self.behavior = behavior;
            self
        }

        fn note(&self, phase: &str) {
            self.journal
                .lock()
                .unwrap()
                .push(format!("{}:{phase}", self.id));
        }
    }

    #[async_trait]
    impl Plugin for TestPlugin {
        fn id(&self) -> &str {
            &self.id
        }

        fn requires(&self) -> Vec<String> {
            self.requires.clone()
        }

        async fn init(&mut self, _engine: Arc<EngineHandle>) -> Result<(), PluginError> {
            if self.behavior.panic_init {
                panic!("init blew up");
            }
            if self.behavior.fail_init {
                return Err(PluginError::InitializationFailed("broken".to_string()));
            }
            self.note("init");
            Ok(())
        }

        async fn start(&mut self, _engine: Arc<EngineHandle>) -> Result<(), PluginError> {
            if self.behavior.fail_start {
                return Err(PluginError::ExecutionError("start broken".to_string()));
            }
            self.note("start");
            Ok(())
        }

        async fn stop(&mut self, _engine: Arc<EngineHandle>) -> Result<(), PluginError> {
            self.note("stop");
            if self.behavior.fail_stop {
                return Err(PluginError::ExecutionError("stop broken".to_string()));
            }
            Ok(())
        }

        async fn dispose(&mut self, _engine: Arc<EngineHandle>) -> Result<(), PluginError> {
            self.note("dispose");
            Ok(())
        }
    }

    fn manager() -> PluginManager {
        let state = Arc::new(SharedState::new(json!({})));
        PluginManager::new(EngineHandle::new(EngineConfig::default(), state))
    }

    fn position(journal: &Journal, entry: &str) -> usize {
        journal
            .lock()
            .unwrap()
            .iter()
            .position(|e| e == entry)
            .unwrap_or_else(|| panic!("journal missing entry {entry}"))
    }

    #[tokio::test]
    async fn init_respects_dependency_order_and_all_inits_precede_starts() {
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        let mut manager = manager();
        // Registered out of dependency order on purpose.
        manager.register(TestPlugin::new("quests", &["combat", "economy"], &journal));
        manager.register(TestPlugin::new("economy", &[], &journal));
        manager.register(TestPlugin::new("combat", &["economy"], &journal));

        manager.activate().await.unwrap();

        assert!(position(&journal, "economy:init") < position(&journal, "combat:init"));
        assert!(position(&journal, "combat:init") < position(&journal, "quests:init"));
        // Phase barrier: every init before any start.
        let last_init = ["economy", "combat", "quests"]
            .iter()
            .map(|id| position(&journal, &format!("{id}:init")))
            .max()
            .unwrap();
        let first_start = ["economy", "combat", "quests"]
            .iter()
            .map(|id| position(&journal, &format!("{id}:start")))
            .min()
            .unwrap();
        assert!(last_init < first_start);
        // Start respects the same dependency order.
        assert!(position(&journal, "economy:start") < position(&journal, "combat:start"));
        assert!(position(&journal, "combat:start") < position(&journal, "quests:start"));
    }

    #[tokio::test]
    async fn cycle_fails_before_any_plugin_runs() {
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        let mut manager = manager();
        manager.register(TestPlugin::new("a", &["b"], &journal));
        manager.register(TestPlugin::new("b", &["a"], &journal));

        let err = manager.activate().await.unwrap_err();
        match err {
            ActivationError::DependencyCycle { involved } => {
                assert_eq!(involved, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(journal.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_dependency_and_duplicate_ids_are_config_errors() {
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));

        let mut manager = self::manager();
        manager.register(TestPlugin::new("a", &["ghost"], &journal));
        assert!(matches!(
            manager.activate().await.unwrap_err(),
            ActivationError::UnknownDependency { ref plugin, ref dependency }
                if plugin == "a" && dependency == "ghost"
        ));

        let mut manager = self::manager();
        manager.register(TestPlugin::new("a", &[], &journal));
        manager.register(TestPlugin::new("a", &[], &journal));
        assert!(matches!(
            manager.activate().await.unwrap_err(),
            ActivationError::DuplicatePluginId(ref id) if id == "a"
        ));

        let mut manager = self::manager();
        manager.register(TestPlugin::new("", &[], &journal));
        assert!(matches!(
            manager.activate().await.unwrap_err(),
            ActivationError::EmptyPluginId
        ));

        assert!(journal.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_init_blocks_dependents_but_not_independents() {
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        let mut manager = manager();
        manager.register(
            TestPlugin::new("banking", &[], &journal).with_behavior(Behavior {
                fail_init: true,
                ..Default::default()
            }),
        );
        manager.register(TestPlugin::new("vault", &["banking"], &journal));
        manager.register(TestPlugin::new("combat", &[], &journal));

        manager.activate().await.unwrap();

        let entries = journal.lock().unwrap().clone();
        assert!(entries.contains(&"combat:init".to_string()));
        assert!(entries.contains(&"combat:start".to_string()));
        assert!(!entries.iter().any(|e| e.starts_with("vault:")));

        let statuses = manager.statuses();
        let vault = statuses.iter().find(|s| s.id == "vault").unwrap();
        assert_eq!(vault.phase, LifecyclePhase::Registered);
        let reason = vault.failure.as_deref().unwrap();
        assert!(reason.contains("banking"), "skip reason was: {reason}");

        let combat = statuses.iter().find(|s| s.id == "combat").unwrap();
        assert_eq!(combat.phase, LifecyclePhase::Started);
        assert!(combat.failure.is_none());
    }

    #[tokio::test]
    async fn panicking_init_is_contained() {
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        let mut manager = manager();
        manager.register(TestPlugin::new("wild", &[], &journal).with_behavior(Behavior {
            panic_init: true,
            ..Default::default()
        }));
        manager.register(TestPlugin::new("calm", &[], &journal));

        manager.activate().await.unwrap();

        let statuses = manager.statuses();
        let wild = statuses.iter().find(|s| s.id == "wild").unwrap();
        assert!(wild.failure.as_deref().unwrap().contains("init blew up"));
        let calm = statuses.iter().find(|s| s.id == "calm").unwrap();
        assert_eq!(calm.phase, LifecyclePhase::Started);
    }

    #[tokio::test]
    async fn start_failure_blocks_dependents_from_starting() {
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        let mut manager = manager();
        manager.register(TestPlugin::new("base", &[], &journal).with_behavior(Behavior {
            fail_start: true,
            ..Default::default()
        }));
        manager.register(TestPlugin::new("tower", &["base"], &journal));

        manager.activate().await.unwrap();

        let entries = journal.lock().unwrap().clone();
        // Both initialized (init happened before base's start failed)...
        assert!(entries.contains(&"base:init".to_string()));
        assert!(entries.contains(&"tower:init".to_string()));
        // ...but the dependent never started.
        assert!(!entries.contains(&"tower:start".to_string()));
    }

    #[tokio::test]
    async fn shutdown_walks_reverse_order_and_survives_stop_failures() {
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        let mut manager = manager();
        manager.register(TestPlugin::new("first", &[], &journal).with_behavior(Behavior {
            fail_stop: true,
            ..Default::default()
        }));
        manager.register(TestPlugin::new("second", &["first"], &journal));

        manager.activate().await.unwrap();
        manager.shutdown().await;

        let entries = journal.lock().unwrap().clone();
        // Reverse order: second stops before first.
        assert!(position(&journal, "second:stop") < position(&journal, "first:stop"));
        // first's stop failure did not block its own or second's dispose.
        assert!(entries.contains(&"first:dispose".to_string()));
        assert!(entries.contains(&"second:dispose".to_string()));

        assert!(manager
            .statuses()
            .iter()
            .all(|s| s.phase == LifecyclePhase::Disposed));
    }

    #[tokio::test]
    async fn stopped_plugins_can_be_restarted() {
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        let mut manager = manager();
        manager.register(TestPlugin::new("p", &[], &journal));
        manager.activate().await.unwrap();

        // Cannot restart a running plugin.
        assert!(matches!(
            manager.restart("p").await.unwrap_err(),
            PluginError::InvalidPhase { .. }
        ));

        manager.stop_plugin("p").await.unwrap();
        manager.restart("p").await.unwrap();

        let entries = journal.lock().unwrap().clone();
        assert_eq!(entries, vec!["p:init", "p:start", "p:stop", "p:start"]);

        let statuses = manager.statuses();
        assert_eq!(statuses[0].phase, LifecyclePhase::Started);

        assert!(matches!(
            manager.restart("ghost").await.unwrap_err(),
            PluginError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn double_activation_is_rejected() {
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        let mut manager = manager();
        manager.register(TestPlugin::new("p", &[], &journal));
        manager.activate().await.unwrap();
        assert!(matches!(
            manager.activate().await.unwrap_err(),
            ActivationError::AlreadyActivated
        ));
    }
}
