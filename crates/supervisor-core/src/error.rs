//! Error types for the supervisor core

use thiserror::Error;

/// Supervisor error type
#[derive(Error, Debug)]
pub enum Error {
    /// No service with this identifier or process id
    #[error("Service not found: {0}")]
    NotFound(String),

    /// Start requested for a service whose process is alive
    #[error("Service {0} is already running")]
    AlreadyRunning(String),

    /// The OS refused to spawn the process
    #[error("Failed to start service {id}: {source}")]
    StartFailure {
        /// Service identifier
        id: String,
        /// Underlying spawn error
        #[source]
        source: command_executor::Error,
    },

    /// Signal delivery, or the wait after a stop-class signal, failed
    #[error("Failed to signal service {id}: {source}")]
    SignalFailure {
        /// Service identifier
        id: String,
        /// Underlying signal or wait error
        #[source]
        source: command_executor::Error,
    },

    /// The command specification cannot be turned into a process
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// No free identifier was found within the retry budget
    #[error("Could not generate a unique id of length {length} after {attempts} attempts")]
    IdSpaceExhausted {
        /// Requested identifier length
        length: usize,
        /// Attempts made
        attempts: usize,
    },

    /// An autostart entry failed under the strict bootstrap policy
    #[error("Autostart of '{name}' failed: {reason}")]
    AutostartFailure {
        /// Autostart entry name
        name: String,
        /// Rendered cause
        reason: String,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
