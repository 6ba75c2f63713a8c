//! The engine handle: the single capability object plugins program against.
//!
//! Plugins never receive the host, the world state, or each other. They
//! receive this handle in every lifecycle phase, and everything they can do
//! flows through it: subscribe and emit events, install middleware and
//! dispatch commands, schedule timers, publish and consume services, read
//! and commit the world snapshot, and log.

use crate::command::CommandBus;
use crate::event::EventBus;
use crate::schedule::Scheduler;
use crate::services::ServiceRegistry;
use crate::state::{Snapshot, StateAccessor};
use crate::trace::{ErrorLog, ErrorRecord};
use crate::utils::current_timestamp_ms;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Log severity exposed to plugins through [`EngineHandle::log`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Capacities and ceilings for the kernel's bounded structures.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Event trace ring capacity
    pub event_trace_capacity: usize,
    /// Command replay tape capacity
    pub command_log_capacity: usize,
    /// Error log ring capacity
    pub error_log_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_trace_capacity: 300,
            command_log_capacity: 300,
            error_log_capacity: 200,
        }
    }
}

/// Owned copy of every diagnostic ring, for bug-report bundling.
///
/// The shape is a de facto contract consumed by external reporting tooling,
/// not a stable wire format.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsBundle {
    pub generated_at_ms: u64,
    pub kernel_version: String,
    pub events: Vec<crate::event::EventRecord>,
    pub commands: Vec<crate::command::CommandEntry>,
    pub errors: Vec<ErrorRecord>,
}

/// The capability object handed to every plugin lifecycle phase.
pub struct EngineHandle {
    events: Arc<EventBus>,
    commands: Arc<CommandBus>,
    scheduler: Arc<Scheduler>,
    services: Arc<ServiceRegistry>,
    state: Arc<dyn StateAccessor>,
    errors: Arc<ErrorLog>,
}

impl EngineHandle {
    /// Wires up a complete kernel around the host's state accessor.
    pub fn new(config: EngineConfig, state: Arc<dyn StateAccessor>) -> Arc<Self> {
        let errors = Arc::new(ErrorLog::new(config.error_log_capacity));
        let events = Arc::new(EventBus::new(config.event_trace_capacity, errors.clone()));
        let commands = Arc::new(CommandBus::new(
            config.command_log_capacity,
            state.clone(),
            events.clone(),
            errors.clone(),
        ));
        let scheduler = Arc::new(Scheduler::new(errors.clone()));
        let services = Arc::new(ServiceRegistry::new());

        Arc::new(Self {
            events,
            commands,
            scheduler,
            services,
            state,
            errors,
        })
    }

    /// The shared event bus.
    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    /// The shared command bus.
    pub fn commands(&self) -> Arc<CommandBus> {
        self.commands.clone()
    }

    /// The shared scheduler.
    pub fn scheduler(&self) -> Arc<Scheduler> {
        self.scheduler.clone()
    }

    /// The shared service registry.
    pub fn services(&self) -> Arc<ServiceRegistry> {
        self.services.clone()
    }

    /// The shared error log.
    pub fn errors(&self) -> Arc<ErrorLog> {
        self.errors.clone()
    }

    /// Owned copy of the current world snapshot.
    pub fn get_state(&self) -> Snapshot {
        self.state.get()
    }

    /// Replaces the world snapshot wholesale.
    pub fn commit(&self, next: Snapshot, reason: &str) {
        self.state.commit(next, reason);
    }

    /// Logs through the engine's tracing setup on behalf of a plugin.
    pub fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => debug!("{message}"),
            LogLevel::Info => info!("{message}"),
            LogLevel::Warn => warn!("{message}"),
            LogLevel::Error => error!("{message}"),
        }
    }

    /// Bundles every diagnostic ring into one owned export.
    pub fn diagnostics(&self) -> DiagnosticsBundle {
        DiagnosticsBundle {
            generated_at_ms: current_timestamp_ms(),
            kernel_version: crate::KERNEL_VERSION.to_string(),
            events: self.events.trace(),
            commands: self.commands.log(),
            errors: self.errors.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use crate::state::SharedState;
    use serde_json::json;

    fn engine() -> Arc<EngineHandle> {
        let state = Arc::new(SharedState::new(json!({ "version": "save/1" })));
        EngineHandle::new(EngineConfig::default(), state)
    }

    #[test]
    fn state_accessor_pair_round_trips() {
        let engine = engine();
        assert_eq!(engine.get_state()["version"], json!("save/1"));

        engine.commit(json!({ "version": "save/2" }), "test commit");
        assert_eq!(engine.get_state()["version"], json!("save/2"));
    }

    #[test]
    fn diagnostics_bundle_carries_all_three_rings() {
        let engine = engine();

        engine.events().emit("a", json!(1)).unwrap();
        engine.commands().dispatch(Command::new("T"));
        engine
            .events()
            .on("b", |_| Err(crate::error::EventError::HandlerFailed("x".to_string())))
            .unwrap();
        engine.events().emit("b", json!(null)).unwrap();

        let bundle = engine.diagnostics();
        // "a", "command:dispatched", "b"
        assert_eq!(bundle.events.len(), 3);
        assert_eq!(bundle.commands.len(), 1);
        assert_eq!(bundle.errors.len(), 1);
        assert!(bundle.generated_at_ms > 0);

        // Bundles must serialize for bug-report export.
        serde_json::to_string(&bundle).unwrap();
    }
}
