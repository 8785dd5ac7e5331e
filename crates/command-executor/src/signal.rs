//! Signal names accepted by the supervisor

use nix::sys::signal::Signal;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// An OS signal addressed by its canonical POSIX name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignalKind(Signal);

impl SignalKind {
    /// Graceful termination request
    pub const TERM: Self = Self(Signal::SIGTERM);
    /// Forced termination
    pub const KILL: Self = Self(Signal::SIGKILL);

    /// The underlying nix signal
    pub fn as_nix(self) -> Signal {
        self.0
    }

    /// Canonical name, e.g. `SIGTERM`
    pub fn name(self) -> &'static str {
        self.0.as_str()
    }

    /// SIGTERM and SIGKILL wait for the process to exit after delivery
    pub fn is_stop_class(self) -> bool {
        matches!(self.0, Signal::SIGTERM | Signal::SIGKILL)
    }
}

impl From<Signal> for SignalKind {
    fn from(signal: Signal) -> Self {
        Self(signal)
    }
}

impl FromStr for SignalKind {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        #[cfg(any(target_os = "linux", target_os = "android"))]
        if name == "SIGPOLL" {
            return Ok(Self(Signal::SIGIO));
        }

        Signal::from_str(name)
            .map(Self)
            .map_err(|_| Error::InvalidSignal(name.to_string()))
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
