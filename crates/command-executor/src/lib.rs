//! OS-process layer of the supervisor
//!
//! This crate spawns supervised commands, delivers signals to them, waits for
//! them to exit and captures their combined output into a bounded buffer.

#![warn(missing_docs)]

pub mod command;
pub mod error;
pub mod output;
pub mod process;
pub mod signal;

pub use command::{Command, CommandBuilder};
pub use error::{Error, Result};
pub use output::{DEFAULT_OUTPUT_LIMIT, OutputBuffer};
pub use process::{ExitStatus, ObservedState, ProcessHandle};
pub use signal::SignalKind;
