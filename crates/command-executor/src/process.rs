//! Handle owning one OS process across its lifetime

use async_process::Child;
use chrono::{DateTime, Utc};
use futures_lite::io::{AsyncRead, AsyncReadExt};
use nix::unistd::Pid;
use std::fmt;
use tracing::{debug, warn};

use crate::command::Command;
use crate::error::{Error, Result};
use crate::output::OutputBuffer;
use crate::signal::SignalKind;

/// Process exit status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitStatus {
    /// Exit code if the process exited normally
    pub code: Option<i32>,
    /// Signal that terminated the process
    pub signal: Option<i32>,
}

impl ExitStatus {
    /// Returns true if the process exited successfully (code 0)
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Returns true if the process was terminated by a signal
    pub fn terminated_by_signal(&self) -> bool {
        self.signal.is_some()
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;
        Self {
            code: status.code(),
            signal: status.signal(),
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {}", code),
            (None, Some(signal)) => match nix::sys::signal::Signal::try_from(signal) {
                Ok(sig) => write!(f, "killed by {}", sig.as_str()),
                Err(_) => write!(f, "killed by signal {}", signal),
            },
            (None, None) => f.write_str("unknown exit"),
        }
    }
}

/// What the handle last observed about its process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservedState {
    /// Spawned and not yet observed to have exited
    Running,
    /// Never spawned, or observed to have exited
    Stopped,
}

impl ObservedState {
    /// Wire representation
    pub fn as_str(self) -> &'static str {
        match self {
            ObservedState::Running => "running",
            ObservedState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ObservedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wraps one OS process: spawn, signal, wait and output capture
///
/// The handle can be started again once the previous process has exited.
/// Dropping the handle does not signal the process.
pub struct ProcessHandle {
    command: Command,
    child: Option<Child>,
    pid: Option<u32>,
    exit: Option<ExitStatus>,
    started_at: Option<DateTime<Utc>>,
    output: OutputBuffer,
}

impl ProcessHandle {
    /// Create a handle that has not spawned anything yet
    pub fn new(command: Command, output_limit: usize) -> Self {
        Self {
            command,
            child: None,
            pid: None,
            exit: None,
            started_at: None,
            output: OutputBuffer::new(output_limit),
        }
    }

    /// The command this handle runs
    pub fn command(&self) -> &Command {
        &self.command
    }

    /// OS process id of the most recent spawn
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// When the most recent spawn happened
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Exit outcome of the most recent process, once observed
    pub fn exit_status(&self) -> Option<&ExitStatus> {
        self.exit.as_ref()
    }

    /// Captured combined output
    pub fn output(&self) -> &OutputBuffer {
        &self.output
    }

    /// Spawn the command and start capturing its output
    ///
    /// Returns once the OS has accepted the spawn.
    pub fn start(&mut self) -> Result<u32> {
        if self.poll_exit().is_none() && self.child.is_some() {
            return Err(Error::spawn_failed("process is still running"));
        }

        self.command.validate()?;
        let mut child = self
            .command
            .prepare()
            .spawn()
            .map_err(|e| Error::spawn_failed(format!("{}: {}", self.command.display(), e)))?;

        let pid = child.id();
        // Pumps from a previous run may outlive it through inherited pipes
        self.output = OutputBuffer::new(self.output.limit());

        if let Some(stdout) = child.stdout.take() {
            smol::spawn(pump(stdout, self.output.clone(), pid)).detach();
        }
        if let Some(stderr) = child.stderr.take() {
            smol::spawn(pump(stderr, self.output.clone(), pid)).detach();
        }

        debug!("Spawned '{}' with PID {}", self.command.display(), pid);

        self.child = Some(child);
        self.pid = Some(pid);
        self.exit = None;
        self.started_at = Some(Utc::now());
        Ok(pid)
    }

    /// Check, without blocking, whether the process has exited
    pub fn poll_exit(&mut self) -> Option<&ExitStatus> {
        if self.exit.is_none() {
            if let Some(child) = self.child.as_mut() {
                match child.try_status() {
                    Ok(Some(status)) => self.exit = Some(status.into()),
                    Ok(None) => {}
                    Err(e) => warn!("Failed to poll process {:?}: {}", self.pid, e),
                }
            }
        }
        self.exit.as_ref()
    }

    /// `Running` if spawned and not yet observed to have exited
    pub fn observed_state(&mut self) -> ObservedState {
        if self.child.is_none() || self.poll_exit().is_some() {
            ObservedState::Stopped
        } else {
            ObservedState::Running
        }
    }

    /// Deliver a signal to the live process
    ///
    /// For stop-class signals the call additionally waits for the process to
    /// exit and returns its status. Other signals are fire and forget.
    pub async fn signal(&mut self, kind: SignalKind) -> Result<Option<ExitStatus>> {
        if self.child.is_none() {
            return Err(Error::NotRunning);
        }
        if let Some(exit) = self.poll_exit() {
            return Err(Error::signal_failed(
                kind.name(),
                format!("process has already exited ({})", exit),
            ));
        }

        let pid = self.pid.ok_or(Error::NotRunning)?;
        nix::sys::signal::kill(Pid::from_raw(pid as i32), kind.as_nix())
            .map_err(|e| Error::signal_failed(kind.name(), e.to_string()))?;
        debug!("Delivered {} to PID {}", kind, pid);

        if !kind.is_stop_class() {
            return Ok(None);
        }

        let status = self.wait().await.map_err(|e| {
            Error::signal_failed(
                kind.name(),
                format!("failed to wait for process termination: {}", e),
            )
        })?;
        Ok(Some(status))
    }

    /// Wait for the process to exit
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        if let Some(exit) = &self.exit {
            return Ok(exit.clone());
        }
        let child = self.child.as_mut().ok_or(Error::NotRunning)?;
        let status: ExitStatus = child.status().await?.into();
        self.exit = Some(status.clone());
        Ok(status)
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("command", &self.command.display())
            .field("pid", &self.pid)
            .field("exit", &self.exit)
            .finish()
    }
}

/// Copy one output pipe into the shared buffer until EOF
async fn pump<R: AsyncRead + Unpin>(mut reader: R, output: OutputBuffer, pid: u32) {
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => output.push(&chunk[..n]),
            Err(e) => {
                debug!("Output pipe of PID {} failed: {}", pid, e);
                break;
            }
        }
    }
}
