//! Start a known set of services before the control plane accepts traffic

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::service::ServiceSpec;

/// What to do when an autostart entry cannot be brought up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BootstrapPolicy {
    /// Log the failure, keep going and report it at the end
    #[default]
    BestEffort,
    /// Abort on the first failure
    Strict,
}

impl BootstrapPolicy {
    /// `Strict` when `strict` is set
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            BootstrapPolicy::Strict
        } else {
            BootstrapPolicy::BestEffort
        }
    }
}

/// An autostart entry that is now running
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedService {
    /// Autostart entry name
    pub name: String,
    /// Generated service identifier
    pub id: String,
    /// Process id
    pub pid: u32,
}

/// An autostart entry that could not be brought up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapFailure {
    /// Autostart entry name
    pub name: String,
    /// Rendered cause
    pub reason: String,
}

/// Outcome of a bootstrap run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Entries started, in input order
    pub started: Vec<StartedService>,
    /// Entries that failed, in input order
    pub failures: Vec<BootstrapFailure>,
}

impl BootstrapReport {
    /// Whether every entry started
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Add and start every entry under a generated identifier of `id_length`
pub async fn bootstrap<I>(
    registry: &Registry,
    entries: I,
    id_length: usize,
    policy: BootstrapPolicy,
) -> Result<BootstrapReport>
where
    I: IntoIterator<Item = (String, ServiceSpec)>,
{
    let mut report = BootstrapReport::default();

    for (name, spec) in entries {
        match start_entry(registry, spec, id_length).await {
            Ok((id, pid)) => {
                info!("Autostarted {} as service {} (PID {})", name, id, pid);
                report.started.push(StartedService { name, id, pid });
            }
            Err(e) if policy == BootstrapPolicy::Strict => {
                return Err(Error::AutostartFailure {
                    name,
                    reason: e.to_string(),
                });
            }
            Err(e) => {
                warn!("Autostart of {} failed: {}", name, e);
                report.failures.push(BootstrapFailure {
                    name,
                    reason: e.to_string(),
                });
            }
        }
    }

    info!(
        "Bootstrap finished: {} started, {} failed",
        report.started.len(),
        report.failures.len()
    );
    Ok(report)
}

async fn start_entry(registry: &Registry, spec: ServiceSpec, id_length: usize) -> Result<(String, u32)> {
    let id = registry.add_generated(id_length, spec).await?;
    let pid = registry.start(&id).await?;
    Ok((id, pid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ServiceRef, StatusReport};
    use command_executor::SignalKind;

    fn entries() -> Vec<(String, ServiceSpec)> {
        vec![
            ("first".to_string(), ServiceSpec::new("sleep").with_args(["30"])),
            ("broken".to_string(), ServiceSpec::new("/nonexistent/opsctl-autostart")),
            ("last".to_string(), ServiceSpec::new("sleep").with_args(["30"])),
        ]
    }

    #[smol_potat::test]
    async fn best_effort_continues_past_failures() {
        let registry = Registry::new();
        let report = bootstrap(&registry, entries(), 8, BootstrapPolicy::BestEffort)
            .await
            .unwrap();

        let names: Vec<_> = report.started.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["first", "last"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].name, "broken");
        assert!(!report.is_complete());

        for started in &report.started {
            assert_eq!(started.id.len(), 8);
            let target = ServiceRef::Id(started.id.clone());
            assert_eq!(registry.status(&target).await, StatusReport::Running);
            registry.signal(&target, SignalKind::KILL).await.unwrap();
        }
    }

    #[smol_potat::test]
    async fn strict_aborts_on_first_failure() {
        let registry = Registry::new();
        let result = bootstrap(&registry, entries(), 8, BootstrapPolicy::Strict).await;

        assert!(matches!(
            result,
            Err(Error::AutostartFailure { ref name, .. }) if name == "broken"
        ));

        // "first" was already started before the abort, "last" never was
        let services = registry.list().await;
        assert_eq!(services.len(), 2);
        for service in services {
            if let Some(pid) = service.pid {
                let _ = registry.signal(&ServiceRef::Pid(pid), SignalKind::KILL).await;
            }
        }
    }

    #[test]
    fn policy_from_flag() {
        assert_eq!(BootstrapPolicy::from_strict(true), BootstrapPolicy::Strict);
        assert_eq!(BootstrapPolicy::from_strict(false), BootstrapPolicy::BestEffort);
        assert_eq!(BootstrapPolicy::default(), BootstrapPolicy::BestEffort);
    }
}
