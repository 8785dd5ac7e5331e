//! Error types for process handling

use thiserror::Error;

/// Unified error type for process handling
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to spawn a process
    #[error("failed to spawn process: {reason}")]
    SpawnFailed {
        /// The reason for the spawn failure
        reason: String,
    },

    /// Failed to send signal to process, or to wait for it afterwards
    #[error("failed to send signal {signal}: {reason}")]
    SignalFailed {
        /// The name of the signal that failed
        signal: String,
        /// The reason for the signal failure
        reason: String,
    },

    /// The handle has never spawned a process
    #[error("process not running")]
    NotRunning,

    /// Unknown signal name
    #[error("invalid signal name: {0}")]
    InvalidSignal(String),

    /// Environment entry without a `=` separator
    #[error("invalid environment entry '{0}', expected KEY=VALUE")]
    InvalidEnvEntry(String),

    /// Empty program name
    #[error("command has no program")]
    EmptyProgram,

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Nix error (Unix signal handling)
    #[error(transparent)]
    Nix(#[from] nix::Error),
}

impl Error {
    /// Create a spawn failed error
    pub fn spawn_failed(reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            reason: reason.into(),
        }
    }

    /// Create a signal failed error
    pub fn signal_failed(signal: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SignalFailed {
            signal: signal.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
