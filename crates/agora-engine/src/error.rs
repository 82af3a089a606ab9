//! Error types for the engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps every failure
//! mode during startup and the workload run.

use agora_core::config::ConfigError;
use agora_core::{DispatchError, StoreError};

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
        source: ConfigError,
    },

    /// A store operation the workload relies on failed.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: StoreError,
    },

    /// The dispatcher stopped accepting or answering commands.
    #[error("dispatcher error: {source}")]
    Dispatch {
        /// The underlying dispatcher error.
        #[from]
        source: DispatchError,
    },

    /// A producer or worker task panicked or was cancelled.
    #[error("task error: {source}")]
    Task {
        /// The underlying join error.
        #[from]
        source: tokio::task::JoinError,
    },

    /// The workload could not be set up.
    #[error("workload error: {message}")]
    Workload {
        /// Description of the workload failure.
        message: String,
    },
}
