//! One supervised unit and its lifecycle state machine

use chrono::{DateTime, Utc};
use command_executor::{Command, ObservedState, ProcessHandle, SignalKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Default working directory of a service
pub const DEFAULT_WORKING_DIR: &str = "/";

/// Lifecycle state of a supervised service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// Added but never started
    Initialized,
    /// Process spawned and not known to have exited
    Running,
    /// Process stopped by a stop-class signal or observed to have exited
    Stopped,
    /// Spawn failed, or stopping the process failed
    Error,
}

impl ServiceState {
    /// Lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceState::Initialized => "initialized",
            ServiceState::Running => "running",
            ServiceState::Stopped => "stopped",
            ServiceState::Error => "error",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status record of a service, replaced on every transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    /// Current state
    pub state: ServiceState,
    /// Human readable notes about the last transition
    pub details: Vec<String>,
    /// When the state last changed
    pub updated_at: DateTime<Utc>,
}

impl ServiceStatus {
    /// Create a status record stamped with the current time
    pub fn new(state: ServiceState, details: Vec<String>) -> Self {
        Self {
            state,
            details,
            updated_at: Utc::now(),
        }
    }
}

/// What a service runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Program to execute
    pub command: String,
    /// Positional arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// `KEY=VALUE` entries layered over the daemon's environment
    #[serde(default)]
    pub env: Vec<String>,
    /// Working directory
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,
}

fn default_working_dir() -> PathBuf {
    PathBuf::from(DEFAULT_WORKING_DIR)
}

impl ServiceSpec {
    /// A spec running `command` with no arguments from `/`
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: Vec::new(),
            working_dir: default_working_dir(),
        }
    }

    /// Set the positional arguments
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the environment entries
    pub fn with_env<I, S>(mut self, env: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.env = env.into_iter().map(Into::into).collect();
        self
    }

    /// Set the working directory
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    /// Build the executable command, rejecting malformed specifications
    pub fn to_command(&self) -> Result<Command> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args).current_dir(&self.working_dir);
        cmd.env_entries(&self.env)
            .map_err(|e| Error::InvalidCommand(e.to_string()))?;
        cmd.validate()
            .map_err(|e| Error::InvalidCommand(e.to_string()))?;
        Ok(cmd)
    }
}

/// A named unit owning at most one process handle across its lifetime
#[derive(Debug)]
pub struct SupervisedService {
    id: String,
    spec: ServiceSpec,
    command: Command,
    output_limit: usize,
    process: Option<ProcessHandle>,
    status: ServiceStatus,
}

impl SupervisedService {
    /// Create a service in state `Initialized`
    pub fn new(id: impl Into<String>, spec: ServiceSpec, output_limit: usize) -> Result<Self> {
        let command = spec.to_command()?;
        Ok(Self {
            id: id.into(),
            spec,
            command,
            output_limit,
            process: None,
            status: ServiceStatus::new(ServiceState::Initialized, Vec::new()),
        })
    }

    /// Service identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// What the service runs
    pub fn spec(&self) -> &ServiceSpec {
        &self.spec
    }

    /// Current status record
    pub fn status(&self) -> &ServiceStatus {
        &self.status
    }

    /// Current state
    pub fn state(&self) -> ServiceState {
        self.status.state
    }

    /// Process handle, present once start has been attempted
    pub fn process(&self) -> Option<&ProcessHandle> {
        self.process.as_ref()
    }

    /// OS process id of the most recent spawn
    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(ProcessHandle::pid)
    }

    /// Captured combined output, `None` before the first start
    pub fn output(&self) -> Option<String> {
        self.process.as_ref().map(|p| p.output().contents())
    }

    fn transition(&mut self, state: ServiceState, detail: String) {
        debug!("Service {} state: {} -> {}", self.id, self.status.state, state);
        self.status = ServiceStatus::new(state, vec![detail]);
    }

    /// Record an exit that happened without a stop request
    pub fn refresh(&mut self) {
        if self.status.state != ServiceState::Running {
            return;
        }
        let Some(exit) = self.process.as_mut().and_then(|p| p.poll_exit().cloned()) else {
            return;
        };
        info!("Service {} exited ({})", self.id, exit);
        self.transition(ServiceState::Stopped, format!("process exited ({})", exit));
    }

    /// `running` while the process is alive, `stopped` otherwise
    pub fn observed_state(&mut self) -> ObservedState {
        self.refresh();
        match self.process.as_mut() {
            Some(process) => process.observed_state(),
            None => ObservedState::Stopped,
        }
    }

    /// Spawn the process
    ///
    /// Fails with `AlreadyRunning`, without side effects, while the process is alive.
    pub fn start(&mut self) -> Result<u32> {
        self.refresh();
        if self.status.state == ServiceState::Running {
            return Err(Error::AlreadyRunning(self.id.clone()));
        }

        let output_limit = self.output_limit;
        let command = &self.command;
        let process = self
            .process
            .get_or_insert_with(|| ProcessHandle::new(command.clone(), output_limit));

        match process.start() {
            Ok(pid) => {
                info!("Service {} started with PID {}", self.id, pid);
                self.transition(ServiceState::Running, format!("started with PID {}", pid));
                Ok(pid)
            }
            Err(source) => {
                warn!("Service {} failed to start: {}", self.id, source);
                self.transition(ServiceState::Error, format!("failed to start: {}", source));
                Err(Error::StartFailure {
                    id: self.id.clone(),
                    source,
                })
            }
        }
    }

    /// Deliver a signal
    ///
    /// Stop-class signals block until the process has exited and move the
    /// service to `Stopped`. A stop-class signal that cannot be delivered to a
    /// service recorded as running, including one whose process already
    /// exited unobserved, moves it to `Error`. Other signals leave the state
    /// untouched.
    pub async fn signal(&mut self, kind: SignalKind) -> Result<()> {
        // No refresh here: an unobserved exit must surface as a failed stop
        let Some(process) = self.process.as_mut() else {
            return Err(Error::SignalFailure {
                id: self.id.clone(),
                source: command_executor::Error::NotRunning,
            });
        };

        match process.signal(kind).await {
            Ok(Some(exit)) => {
                info!("Service {} stopped by {} ({})", self.id, kind, exit);
                self.transition(
                    ServiceState::Stopped,
                    format!("process terminated by {} ({})", kind, exit),
                );
                Ok(())
            }
            Ok(None) => {
                debug!("Service {} received {}", self.id, kind);
                Ok(())
            }
            Err(source) => {
                warn!("Failed to deliver {} to service {}: {}", kind, self.id, source);
                if kind.is_stop_class() && self.status.state == ServiceState::Running {
                    self.transition(ServiceState::Error, format!("failed to stop: {}", source));
                } else {
                    self.refresh();
                }
                Err(Error::SignalFailure {
                    id: self.id.clone(),
                    source,
                })
            }
        }
    }
}
