//! Registry of supervised services
//!
//! The registry maps identifiers to services and exposes the supervisor's
//! operation set. Locking is two-level: the registry lock guards the map and
//! the pid index and is only held for lookups and inserts, while each service
//! sits behind its own lock that is held for the whole operation, including
//! the wait after a stop-class signal. Operations on one identifier are
//! therefore linearized without blocking operations on other identifiers.
//!
//! A service lock may be held while taking the registry lock, never the other
//! way around.

use chrono::{DateTime, Utc};
use command_executor::{DEFAULT_OUTPUT_LIMIT, ObservedState, SignalKind};
use futures::lock::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::id::{self, DEFAULT_MAX_ATTEMPTS};
use crate::service::{ServiceSpec, ServiceState, SupervisedService};

type Slot = Arc<Mutex<SupervisedService>>;

/// Tunables of a registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Output bytes retained per process
    pub output_limit: usize,
    /// Collisions tolerated by identifier generation
    pub max_id_attempts: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            output_limit: DEFAULT_OUTPUT_LIMIT,
            max_id_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Addresses a service by identifier or by OS process id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceRef {
    /// Service identifier
    Id(String),
    /// Process id of the service's most recent spawn
    Pid(u32),
}

impl fmt::Display for ServiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceRef::Id(id) => write!(f, "id {}", id),
            ServiceRef::Pid(pid) => write!(f, "PID {}", pid),
        }
    }
}

/// Answer of a status query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusReport {
    /// Process alive
    Running,
    /// Never started, or exited
    Stopped,
    /// No such service
    Unknown,
}

impl StatusReport {
    /// Wire representation
    pub fn as_str(self) -> &'static str {
        match self {
            StatusReport::Running => "running",
            StatusReport::Stopped => "stopped",
            StatusReport::Unknown => "unknown",
        }
    }
}

impl From<ObservedState> for StatusReport {
    fn from(state: ObservedState) -> Self {
        match state {
            ObservedState::Running => StatusReport::Running,
            ObservedState::Stopped => StatusReport::Stopped,
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of one service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSummary {
    /// Service identifier
    pub id: String,
    /// Recorded state
    pub state: ServiceState,
    /// Most recent process id
    pub pid: Option<u32>,
    /// Program being supervised
    pub command: String,
    /// Notes about the last transition
    pub details: Vec<String>,
    /// When the state last changed
    pub updated_at: DateTime<Utc>,
}

impl ServiceSummary {
    fn of(service: &SupervisedService) -> Self {
        Self {
            id: service.id().to_string(),
            state: service.state(),
            pid: service.pid(),
            command: service.spec().command.clone(),
            details: service.status().details.clone(),
            updated_at: service.status().updated_at,
        }
    }
}

/// PID of a slot for log messages, without waiting on a busy lock
fn describe_pid(slot: &Slot) -> String {
    match slot.try_lock() {
        Some(service) => match service.pid() {
            Some(pid) => format!("previous PID {}", pid),
            None => "previous service had no PID".to_string(),
        },
        None => "pid unavailable (busy)".to_string(),
    }
}

#[derive(Default)]
struct Entries {
    services: HashMap<String, Slot>,
    pids: HashMap<u32, String>,
}

impl Entries {
    fn insert(&mut self, id: String, service: SupervisedService) {
        if let Some(previous) = self.services.insert(id.clone(), Arc::new(Mutex::new(service))) {
            // The old handle is unreachable from now on; its process keeps running
            warn!(
                "Replacing service {} ({} is no longer supervised)",
                id,
                describe_pid(&previous)
            );
            self.pids.retain(|_, owner| owner != &id);
        } else {
            info!("Added service {}", id);
        }
    }

    fn resolve(&self, target: &ServiceRef) -> Option<(String, Slot)> {
        let id = match target {
            ServiceRef::Id(id) => id,
            ServiceRef::Pid(pid) => self.pids.get(pid)?,
        };
        self.services.get(id).map(|slot| (id.clone(), slot.clone()))
    }
}

/// Owns the identifier → service map
#[derive(Default)]
pub struct Registry {
    entries: Mutex<Entries>,
    config: RegistryConfig,
}

impl Registry {
    /// Create an empty registry with default tunables
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            config,
        }
    }

    /// Registry tunables
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Install a new service under `id`, replacing any previous entry
    ///
    /// A replaced service is not stopped.
    pub async fn add(&self, id: impl Into<String>, spec: ServiceSpec) -> Result<()> {
        let id = id.into();
        let service = SupervisedService::new(id.clone(), spec, self.config.output_limit)?;
        self.entries.lock().await.insert(id, service);
        Ok(())
    }

    /// Install a new service under a freshly generated identifier
    ///
    /// Generation and insertion happen under one registry lock acquisition,
    /// so concurrent callers never receive the same identifier.
    pub async fn add_generated(&self, length: usize, spec: ServiceSpec) -> Result<String> {
        if length == 0 {
            return Err(Error::IdSpaceExhausted {
                length,
                attempts: 0,
            });
        }

        // Reject malformed specs before consuming an identifier
        spec.to_command()?;

        let mut entries = self.entries.lock().await;
        let id = id::generate_unique(length, self.config.max_id_attempts, |candidate| {
            entries.services.contains_key(candidate)
        })?;
        let service = SupervisedService::new(id.clone(), spec, self.config.output_limit)?;
        entries.insert(id.clone(), service);
        Ok(id)
    }

    /// A random identifier not currently registered
    pub async fn generate_unique_id(&self, length: usize) -> Result<String> {
        let entries = self.entries.lock().await;
        id::generate_unique(length, self.config.max_id_attempts, |candidate| {
            entries.services.contains_key(candidate)
        })
    }

    async fn slot(&self, target: &ServiceRef) -> Option<(String, Slot)> {
        self.entries.lock().await.resolve(target)
    }

    /// Start the service registered under `id`, returning its process id
    pub async fn start(&self, id: &str) -> Result<u32> {
        let target = ServiceRef::Id(id.to_string());
        let (id, slot) = self
            .slot(&target)
            .await
            .ok_or_else(|| Error::NotFound(target.to_string()))?;

        let mut service = slot.lock().await;
        let pid = service.start()?;

        let mut entries = self.entries.lock().await;
        // Only index the pid if the entry was not replaced while spawning
        if entries
            .services
            .get(&id)
            .is_some_and(|current| Arc::ptr_eq(current, &slot))
        {
            entries.pids.retain(|_, owner| owner != &id);
            entries.pids.insert(pid, id);
        }
        drop(service);

        Ok(pid)
    }

    /// Deliver a signal, returning the identifier of the service reached
    ///
    /// Stop-class signals return only after the process has exited.
    pub async fn signal(&self, target: &ServiceRef, kind: SignalKind) -> Result<String> {
        let (id, slot) = self
            .slot(target)
            .await
            .ok_or_else(|| Error::NotFound(target.to_string()))?;

        let mut service = slot.lock().await;
        if let ServiceRef::Pid(pid) = target {
            if service.pid() != Some(*pid) {
                return Err(Error::NotFound(target.to_string()));
            }
        }

        debug!("Signalling service {} with {}", id, kind);
        service.signal(kind).await?;
        Ok(id)
    }

    /// `running`, `stopped` or `unknown`
    pub async fn status(&self, target: &ServiceRef) -> StatusReport {
        let Some((_, slot)) = self.slot(target).await else {
            return StatusReport::Unknown;
        };

        let mut service = slot.lock().await;
        if let ServiceRef::Pid(pid) = target {
            if service.pid() != Some(*pid) {
                return StatusReport::Unknown;
            }
        }
        service.observed_state().into()
    }

    /// Captured output of the service's current process
    pub async fn output(&self, target: &ServiceRef) -> Result<String> {
        let (_, slot) = self
            .slot(target)
            .await
            .ok_or_else(|| Error::NotFound(target.to_string()))?;

        let mut service = slot.lock().await;
        service.refresh();
        Ok(service.output().unwrap_or_default())
    }

    /// Process id of the most recent spawn of `id`
    pub async fn pid_of(&self, id: &str) -> Option<u32> {
        let (_, slot) = self.slot(&ServiceRef::Id(id.to_string())).await?;
        let service = slot.lock().await;
        service.pid()
    }

    /// Identifier of the service that spawned `pid`
    pub async fn id_of(&self, pid: u32) -> Option<String> {
        self.entries.lock().await.pids.get(&pid).cloned()
    }

    /// Snapshot of one service
    pub async fn describe(&self, target: &ServiceRef) -> Option<ServiceSummary> {
        let (_, slot) = self.slot(target).await?;
        let mut service = slot.lock().await;
        service.refresh();
        Some(ServiceSummary::of(&service))
    }

    /// Snapshot of every service, ordered by identifier
    pub async fn list(&self) -> Vec<ServiceSummary> {
        let mut slots: Vec<(String, Slot)> = {
            let entries = self.entries.lock().await;
            entries
                .services
                .iter()
                .map(|(id, slot)| (id.clone(), slot.clone()))
                .collect()
        };
        slots.sort_by(|a, b| a.0.cmp(&b.0));

        let mut summaries = Vec::with_capacity(slots.len());
        for (_, slot) in slots {
            let mut service = slot.lock().await;
            service.refresh();
            summaries.push(ServiceSummary::of(&service));
        }
        summaries
    }

    /// Whether `id` is registered
    pub async fn contains(&self, id: &str) -> bool {
        self.entries.lock().await.services.contains_key(id)
    }

    /// Number of registered services
    pub async fn len(&self) -> usize {
        self.entries.lock().await.services.len()
    }

    /// Whether no service is registered
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
