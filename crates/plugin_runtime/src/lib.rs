//! # Plugin Runtime
//!
//! Lifecycle management for Emberlight plugins. The runtime accepts plugin
//! descriptors (an id, a list of required plugin ids, and four lifecycle
//! callbacks), orders them topologically by their dependencies, and drives
//! them through activation and shutdown against a shared
//! [`EngineHandle`](ember_kernel::EngineHandle).
//!
//! ## Lifecycle
//!
//! ```text
//! registered -> initialized -> started -> stopped -> disposed
//!                                  ^          |
//!                                  +- restart +
//! ```
//!
//! Phases never skip. Activation runs every plugin's `init` (in dependency
//! order, each awaited to completion) before any plugin's `start`, so `init`
//! may only register services and set up state while `start` may read other
//! plugins' services. Shutdown walks the reverse order.
//!
//! ## Failure isolation
//!
//! A cyclic or unresolvable dependency graph is a configuration error
//! reported before any plugin code runs. A plugin failing its own `init` or
//! `start` (error or panic) only blocks the plugins that declared it as a
//! dependency; independent plugins activate normally. Cleanup failures
//! during shutdown are logged and never block another plugin's cleanup.

pub mod error;
pub mod manager;
pub mod plugin;

pub use error::{ActivationError, PluginError};
pub use manager::{PluginManager, PluginStatus};
pub use plugin::{LifecyclePhase, Plugin};
