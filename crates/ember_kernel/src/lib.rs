//! # Emberlight Engine Kernel
//!
//! The in-process runtime kernel that every Emberlight feature plugin is built
//! on. The kernel itself knows nothing about the game: no gold, no hit points,
//! no quests. It provides exactly five orchestration services and a single
//! capability object that ties them together:
//!
//! - **[`EventBus`]**: synchronous publish/subscribe with a bounded
//!   diagnostic trace
//! - **[`CommandBus`]**: typed command dispatch through an ordered middleware
//!   chain, with a bounded replay tape
//! - **[`Scheduler`]**: cancellable, owner-scoped timers
//! - **[`MigrationRegistry`]**: graph-based versioned state migration
//! - **[`ServiceRegistry`]**: name-to-capability mapping for plugin wiring
//!
//! ## The engine handle
//!
//! Plugins never hold references to each other. Every lifecycle phase receives
//! an [`EngineHandle`], the sole integration contract: events, commands,
//! scheduling, services, the state accessor pair, and logging.
//!
//! ```rust,no_run
//! use ember_kernel::{EngineConfig, EngineHandle, SharedState};
//! use std::sync::Arc;
//!
//! let state = Arc::new(SharedState::new(serde_json::json!({ "version": "save/1" })));
//! let engine = EngineHandle::new(EngineConfig::default(), state);
//!
//! engine.events().on("world:changed", |payload| {
//!     tracing::info!("world changed: {payload}");
//!     Ok(())
//! }).unwrap();
//!
//! engine.events().emit("world:changed", serde_json::json!({ "zone": 3 })).unwrap();
//! ```
//!
//! ## Failure policy
//!
//! A broken event handler, middleware, or scheduled callback degrades the
//! runtime, it never crashes it: the failure is caught, recorded in the
//! bounded error log, and siblings keep running. The one loud exception is
//! state migration, where a partial result would corrupt a save. Migration
//! failures abort the whole call and identify the failing edge.

pub mod command;
pub mod context;
pub mod error;
pub mod event;
pub mod migration;
pub mod schedule;
pub mod services;
pub mod state;
pub mod trace;
pub mod utils;

// Re-exports for convenience
pub use command::{
    Command, CommandBus, CommandContext, CommandEntry, Middleware, Next, UNKNOWN_COMMAND_KIND,
};
pub use context::{DiagnosticsBundle, EngineConfig, EngineHandle, LogLevel};
pub use error::{CommandError, EventError, MigrationError, SchedulerError};
pub use event::{EventBus, EventRecord, SubscriberId};
pub use migration::{MigrationConfig, MigrationRegistry, MigrationReportEntry};
pub use schedule::{Scheduler, TaskId};
pub use services::ServiceRegistry;
pub use state::{SharedState, Snapshot, StateAccessor};
pub use trace::{ErrorLog, ErrorOrigin, ErrorRecord, RingBuffer};
pub use utils::current_timestamp_ms;

/// Kernel version string, used by diagnostics bundles.
pub const KERNEL_VERSION: &str = env!("CARGO_PKG_VERSION");
