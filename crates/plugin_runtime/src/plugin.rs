//! Plugin trait and lifecycle phase tracking.

use crate::error::PluginError;
use async_trait::async_trait;
use ember_kernel::EngineHandle;
use std::sync::Arc;

/// Where a plugin currently sits in its lifecycle. Strictly monotonic
/// forward, except that a stopped plugin may be restarted back to started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Registered,
    Initialized,
    Started,
    Stopped,
    Disposed,
}

impl std::fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LifecyclePhase::Registered => "registered",
            LifecyclePhase::Initialized => "initialized",
            LifecyclePhase::Started => "started",
            LifecyclePhase::Stopped => "stopped",
            LifecyclePhase::Disposed => "disposed",
        };
        write!(f, "{name}")
    }
}

/// An independently loadable feature module.
///
/// All four lifecycle callbacks default to no-ops; a plugin implements the
/// ones it needs. Callbacks may suspend internally, but the manager awaits
/// each call to completion before moving on, so phase boundaries are full
/// barriers.
///
/// Phase contract:
/// - `init`: register services, subscribe to events, set up state. Must not
///   assume any other plugin has started.
/// - `start`: may look up other plugins' services and begin doing work.
/// - `stop`: cancel timers, unsubscribe, quiesce. May be followed by a
///   restart.
/// - `dispose`: final teardown; unregister services here.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Unique, non-empty plugin id.
    fn id(&self) -> &str;

    /// Ids of plugins that must activate before this one.
    fn requires(&self) -> Vec<String> {
        Vec::new()
    }

    async fn init(&mut self, _engine: Arc<EngineHandle>) -> Result<(), PluginError> {
        Ok(())
    }

    async fn start(&mut self, _engine: Arc<EngineHandle>) -> Result<(), PluginError> {
        Ok(())
    }

    async fn stop(&mut self, _engine: Arc<EngineHandle>) -> Result<(), PluginError> {
        Ok(())
    }

    async fn dispose(&mut self, _engine: Arc<EngineHandle>) -> Result<(), PluginError> {
        Ok(())
    }
}
