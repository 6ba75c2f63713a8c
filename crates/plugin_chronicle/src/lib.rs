//! Chronicle plugin: in-game activity journal.
//!
//! A small feature plugin that exercises the kernel's observation surfaces.
//! It subscribes to the engine heartbeat, installs a command-observing
//! middleware, and publishes a `chronicle` service other plugins can append
//! their own lines to. It owns no game rules of its own.

use async_trait::async_trait;
use ember_kernel::{
    current_timestamp_ms, CommandError, EngineHandle, EventError, RingBuffer, SubscriberId,
};
use plugin_runtime::{Plugin, PluginError};
use std::sync::{Arc, Mutex};
use tracing::info;

/// Service name the chronicle is published under.
pub const CHRONICLE_SERVICE: &str = "chronicle";

/// One journal line.
#[derive(Debug, Clone)]
pub struct ChronicleEntry {
    pub timestamp_ms: u64,
    pub line: String,
}

/// Bounded activity journal, shared through the service registry.
pub struct ChronicleService {
    entries: Mutex<RingBuffer<ChronicleEntry>>,
}

impl ChronicleService {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(RingBuffer::new(capacity)),
        }
    }

    /// Appends one line to the journal.
    pub fn note(&self, line: impl Into<String>) {
        let mut guard = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push(ChronicleEntry {
            timestamp_ms: current_timestamp_ms(),
            line: line.into(),
        });
    }

    /// Owned copy of the journal, oldest first.
    pub fn recent(&self) -> Vec<ChronicleEntry> {
        let guard = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.snapshot()
    }
}

/// The chronicle feature plugin.
pub struct ChroniclePlugin {
    capacity: usize,
    service: Option<Arc<ChronicleService>>,
    subscriptions: Vec<(String, SubscriberId)>,
}

impl ChroniclePlugin {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            service: None,
            subscriptions: Vec::new(),
        }
    }
}

impl Default for ChroniclePlugin {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Plugin for ChroniclePlugin {
    fn id(&self) -> &str {
        "chronicle"
    }

    async fn init(&mut self, engine: Arc<EngineHandle>) -> Result<(), PluginError> {
        let service = Arc::new(ChronicleService::new(self.capacity));
        engine
            .services()
            .register(CHRONICLE_SERVICE, service.clone());

        // Journal the heartbeat so a bug report shows the engine was alive.
        let ticks = service.clone();
        let id = engine
            .events()
            .on("engine:tick", move |payload| {
                ticks.note(format!("tick {payload}"));
                Ok(())
            })
            .map_err(|e: EventError| PluginError::InitializationFailed(e.to_string()))?;
        self.subscriptions.push(("engine:tick".to_string(), id));

        // Journal every command that passes the bus, replay included.
        let commands = service.clone();
        engine.commands().install_fn("chronicle", move |ctx, next| {
            let tag = if ctx.command.is_replay() { "replayed" } else { "dispatched" };
            commands.note(format!("{tag} {}", ctx.command.kind));
            next.invoke();
            Ok::<(), CommandError>(())
        });

        self.service = Some(service);
        info!("📜 Chronicle ready (capacity {})", self.capacity);
        Ok(())
    }

    async fn stop(&mut self, engine: Arc<EngineHandle>) -> Result<(), PluginError> {
        let events = engine.events();
        for (name, id) in self.subscriptions.drain(..) {
            events.off(&name, id);
        }
        Ok(())
    }

    async fn dispose(&mut self, engine: Arc<EngineHandle>) -> Result<(), PluginError> {
        engine.services().unregister(CHRONICLE_SERVICE);
        self.service = None;
        Ok(())
    }
}
