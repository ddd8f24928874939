//! Error types for the engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during startup and the run.

/// Top-level error for the engine binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: tomsim_core::config::ConfigError,
    },

    /// A variant code with no matching experiment variant.
    #[error("unknown experiment variant {0}")]
    Variant(u8),

    /// A scheduler command failed.
    #[error("scheduler error: {source}")]
    Scheduler {
        /// The underlying scheduler error.
        #[from]
        source: tomsim_core::SchedulerError,
    },

    /// Observer API server failed to start.
    #[error("observer error: {source}")]
    Observer {
        /// The underlying startup error.
        #[from]
        source: tomsim_observer::StartupError,
    },

    /// Waiting for Ctrl-C failed.
    #[error("signal error: {0}")]
    Signal(#[from] std::io::Error),
}
