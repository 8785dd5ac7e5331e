//! End-to-end lifecycle scenarios against real processes

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::sys::signal;
use nix::unistd::Pid;
use supervisor_core::{
    Error, Registry, ServiceRef, ServiceSpec, ServiceState, SignalKind, StatusReport,
};

fn by_id(id: &str) -> ServiceRef {
    ServiceRef::Id(id.to_string())
}

fn is_alive(pid: u32) -> bool {
    signal::kill(Pid::from_raw(pid as i32), None).is_ok()
}

fn sleeper(seconds: &str) -> ServiceSpec {
    ServiceSpec::new("sleep").with_args([seconds])
}

#[smol_potat::test]
async fn test_short_lived_service_reports_stopped_after_exit() {
    let registry = Registry::new();
    registry.add("napper", sleeper("2")).await.unwrap();

    let pid = registry.start("napper").await.unwrap();
    assert_eq!(registry.status(&by_id("napper")).await, StatusReport::Running);
    assert_eq!(registry.status(&ServiceRef::Pid(pid)).await, StatusReport::Running);

    smol::Timer::after(Duration::from_millis(2500)).await;

    assert_eq!(registry.status(&by_id("napper")).await, StatusReport::Stopped);
    let summary = registry.describe(&by_id("napper")).await.unwrap();
    assert_eq!(summary.state, ServiceState::Stopped);
}

#[smol_potat::test]
async fn test_signal_unknown_id_is_consistently_not_found() {
    let registry = Registry::new();
    for _ in 0..3 {
        let result = registry.signal(&by_id("ghost"), SignalKind::TERM).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }
    assert!(matches!(
        registry.signal(&ServiceRef::Pid(999_999), SignalKind::TERM).await,
        Err(Error::NotFound(_))
    ));
    assert_eq!(registry.status(&by_id("ghost")).await, StatusReport::Unknown);
}

#[smol_potat::test]
async fn test_concurrent_starts_of_distinct_services() {
    let registry = Arc::new(Registry::new());
    registry.add("left", sleeper("30")).await.unwrap();
    registry.add("right", sleeper("30")).await.unwrap();

    let a = {
        let registry = registry.clone();
        smol::spawn(async move { registry.start("left").await })
    };
    let b = {
        let registry = registry.clone();
        smol::spawn(async move { registry.start("right").await })
    };
    let left = a.await.unwrap();
    let right = b.await.unwrap();

    assert_ne!(left, right);
    assert_eq!(registry.pid_of("left").await, Some(left));
    assert_eq!(registry.pid_of("right").await, Some(right));
    assert_eq!(registry.id_of(right).await.as_deref(), Some("right"));

    for id in ["left", "right"] {
        registry.signal(&by_id(id), SignalKind::KILL).await.unwrap();
    }
}

#[smol_potat::test]
async fn test_sigterm_reports_stopped_only_after_exit() {
    let registry = Registry::new();
    registry.add("web", sleeper("30")).await.unwrap();
    let pid = registry.start("web").await.unwrap();

    let id = registry.signal(&ServiceRef::Pid(pid), SignalKind::TERM).await.unwrap();
    assert_eq!(id, "web");
    assert!(!is_alive(pid));
    assert_eq!(registry.status(&by_id("web")).await, StatusReport::Stopped);

    let summary = registry.describe(&by_id("web")).await.unwrap();
    assert_eq!(summary.state, ServiceState::Stopped);
}

#[smol_potat::test]
async fn test_kill_after_natural_exit_fails() {
    let registry = Registry::new();
    registry.add("oneshot", ServiceSpec::new("true")).await.unwrap();
    registry.start("oneshot").await.unwrap();

    smol::Timer::after(Duration::from_millis(300)).await;

    let result = registry.signal(&by_id("oneshot"), SignalKind::KILL).await;
    assert!(matches!(result, Err(Error::SignalFailure { .. })));
    // The stop did not happen, so the record is not reported as stopped
    let summary = registry.describe(&by_id("oneshot")).await.unwrap();
    assert_eq!(summary.state, ServiceState::Error);
    assert!(summary.details[0].starts_with("failed to stop"));
    assert_eq!(registry.status(&by_id("oneshot")).await, StatusReport::Stopped);

    // A later start recovers from Error
    registry.start("oneshot").await.unwrap();
}

#[smol_potat::test]
async fn test_non_stop_signal_leaves_state() {
    let registry = Registry::new();
    registry
        .add(
            "hup",
            ServiceSpec::new("sh").with_args(["-c", "trap 'echo reloaded' HUP; while true; do sleep 0.05; done"]),
        )
        .await
        .unwrap();
    registry.start("hup").await.unwrap();
    smol::Timer::after(Duration::from_millis(200)).await;

    let hup: SignalKind = "SIGHUP".parse().unwrap();
    registry.signal(&by_id("hup"), hup).await.unwrap();
    assert_eq!(registry.status(&by_id("hup")).await, StatusReport::Running);

    let mut output = String::new();
    for _ in 0..50 {
        output = registry.output(&by_id("hup")).await.unwrap();
        if output.contains("reloaded") {
            break;
        }
        smol::Timer::after(Duration::from_millis(20)).await;
    }
    assert!(output.contains("reloaded"));

    registry.signal(&by_id("hup"), SignalKind::KILL).await.unwrap();
}

#[smol_potat::test]
async fn test_restart_after_stop() {
    let registry = Registry::new();
    registry.add("svc", sleeper("30")).await.unwrap();

    let first = registry.start("svc").await.unwrap();
    assert!(matches!(
        registry.start("svc").await,
        Err(Error::AlreadyRunning(_))
    ));

    registry.signal(&by_id("svc"), SignalKind::TERM).await.unwrap();
    let second = registry.start("svc").await.unwrap();
    assert_ne!(first, second);
    assert_eq!(registry.pid_of("svc").await, Some(second));
    assert_eq!(registry.id_of(first).await, None);

    registry.signal(&by_id("svc"), SignalKind::KILL).await.unwrap();
}

#[smol_potat::test]
async fn test_overwriting_add_leaves_old_process_running() {
    let registry = Registry::new();
    registry.add("svc", sleeper("30")).await.unwrap();
    let old_pid = registry.start("svc").await.unwrap();

    registry.add("svc", sleeper("30")).await.unwrap();

    assert!(is_alive(old_pid));
    assert_eq!(registry.status(&by_id("svc")).await, StatusReport::Stopped);
    assert_eq!(registry.status(&ServiceRef::Pid(old_pid)).await, StatusReport::Unknown);
    assert!(matches!(
        registry.signal(&ServiceRef::Pid(old_pid), SignalKind::KILL).await,
        Err(Error::NotFound(_))
    ));

    signal::kill(Pid::from_raw(old_pid as i32), signal::Signal::SIGKILL).unwrap();
}

#[smol_potat::test]
async fn test_concurrent_generated_ids_are_unique() {
    let registry = Arc::new(Registry::new());
    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let registry = registry.clone();
            smol::spawn(async move { registry.add_generated(3, ServiceSpec::new("true")).await })
        })
        .collect();

    let mut ids = HashSet::new();
    for task in tasks {
        let id = task.await.unwrap();
        assert_eq!(id.len(), 3);
        assert!(ids.insert(id));
    }
    assert_eq!(registry.len().await, 32);
}

#[smol_potat::test]
async fn test_slow_stop_does_not_block_other_services() {
    let registry = Arc::new(Registry::new());
    // Ignores SIGTERM for a while, so stopping it takes time
    registry
        .add(
            "stubborn",
            ServiceSpec::new("sh").with_args(["-c", "trap '' TERM; sleep 2"]),
        )
        .await
        .unwrap();
    registry.add("other", sleeper("30")).await.unwrap();
    registry.start("stubborn").await.unwrap();
    registry.start("other").await.unwrap();
    smol::Timer::after(Duration::from_millis(200)).await;

    let stopping = {
        let registry = registry.clone();
        smol::spawn(async move { registry.signal(&by_id("stubborn"), SignalKind::TERM).await })
    };
    smol::Timer::after(Duration::from_millis(100)).await;

    let began = Instant::now();
    assert_eq!(registry.status(&by_id("other")).await, StatusReport::Running);
    registry.signal(&by_id("other"), SignalKind::KILL).await.unwrap();
    assert_eq!(registry.len().await, 2);
    assert!(began.elapsed() < Duration::from_secs(1));

    stopping.await.unwrap();
    assert_eq!(registry.status(&by_id("stubborn")).await, StatusReport::Stopped);
}
