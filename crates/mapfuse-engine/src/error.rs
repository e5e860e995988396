//! Error types for the engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps every failure
//! mode during startup and the scenario run.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: mapfuse_core::ConfigError,
    },

    /// Registry, coordinator, or session failure.
    #[error("core error: {source}")]
    Core {
        /// The underlying core error.
        #[from]
        source: mapfuse_core::CoreError,
    },

    /// The scenario file could not be loaded.
    #[error("scenario error: {message}")]
    Scenario {
        /// Description of the scenario failure.
        message: String,
    },

    /// Writing graph snapshots failed.
    #[error("snapshot error: {message}")]
    Snapshot {
        /// Description of the snapshot failure.
        message: String,
    },
}
