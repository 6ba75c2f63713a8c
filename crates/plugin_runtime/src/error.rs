//! Error types for the plugin runtime.

/// Fatal configuration errors detected before any plugin code runs.
#[derive(Debug, thiserror::Error)]
pub enum ActivationError {
    /// A plugin declared an empty id
    #[error("Plugin ids must be non-empty")]
    EmptyPluginId,

    /// Two plugins declared the same id
    #[error("Duplicate plugin id: `{0}`")]
    DuplicatePluginId(String),

    /// A plugin requires an id that is not in the active set
    #[error("Plugin `{plugin}` requires unknown plugin `{dependency}`")]
    UnknownDependency { plugin: String, dependency: String },

    /// The requires graph contains a cycle
    #[error("Plugin dependency cycle involving: {}", involved.join(", "))]
    DependencyCycle { involved: Vec<String> },

    /// The manager was already activated
    #[error("Plugin set is already activated")]
    AlreadyActivated,
}

/// Errors returned by plugin lifecycle callbacks.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// `init` failed
    #[error("Plugin initialization failed: {0}")]
    InitializationFailed(String),

    /// `start`, `stop`, or `dispose` failed
    #[error("Plugin execution failed: {0}")]
    ExecutionError(String),

    /// A lifecycle call was made in the wrong phase
    #[error("Plugin `{id}` is {phase}, cannot {attempted}")]
    InvalidPhase {
        id: String,
        phase: String,
        attempted: String,
    },

    /// No plugin with the given id is registered
    #[error("Plugin not found: `{0}`")]
    NotFound(String),
}
