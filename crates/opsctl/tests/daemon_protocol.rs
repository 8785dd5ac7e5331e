//! End-to-end tests over a real control socket

use async_net::unix::UnixStream;
use futures::io::AsyncWriteExt;
use opsctl::protocol::{self, Request, Response, ResponseStatus};
use opsctl::send_request;
use std::path::{Path, PathBuf};
use std::time::Duration;
use supervisor_config::Config;

struct TestDaemon {
    socket: PathBuf,
    shutdown: async_channel::Sender<()>,
    task: smol::Task<anyhow::Result<()>>,
    _dir: tempfile::TempDir,
}

impl TestDaemon {
    async fn spawn(mut config: Config) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("opsctl.sock");
        config.settings.socket_path = socket.clone();

        let (shutdown, rx) = async_channel::bounded(1);
        let path = socket.clone();
        let task = smol::spawn(async move { opsctl::daemon::run(config, &path, rx).await });

        for _ in 0..100 {
            if socket.exists() {
                break;
            }
            smol::Timer::after(Duration::from_millis(20)).await;
        }
        assert!(socket.exists(), "daemon never bound its socket");

        Self {
            socket,
            shutdown,
            task,
            _dir: dir,
        }
    }

    async fn send(&self, request: Request) -> Response {
        send_request(&self.socket, &request).await.unwrap()
    }

    async fn stop(self) -> PathBuf {
        self.shutdown.send(()).await.unwrap();
        self.task.await.unwrap();
        self.socket
    }
}

fn start(id: &str, binary: &str, args: &[&str]) -> Request {
    Request::Start {
        id: Some(id.to_string()),
        binary: Some(binary.to_string()),
        alias: None,
        env: Vec::new(),
        program_argument: args.iter().map(|a| a.to_string()).collect(),
        working_dir: "/".to_string(),
    }
}

fn signal(id: &str, name: &str) -> Request {
    Request::Signal {
        id: Some(id.to_string()),
        pid: None,
        signal_type: name.to_string(),
    }
}

fn status(id: &str) -> Request {
    Request::Status {
        id: Some(id.to_string()),
        pid: None,
    }
}

async fn raw_exchange(socket: &Path, bytes: &[u8]) -> Response {
    let mut stream = UnixStream::connect(socket).await.unwrap();
    stream.write_all(bytes).await.unwrap();
    stream.flush().await.unwrap();
    protocol::read_response(&mut stream).await.unwrap()
}

#[smol_potat::test]
async fn test_start_status_stop() {
    let daemon = TestDaemon::spawn(Config::default()).await;

    let response = daemon.send(start("web", "sleep", &["30"])).await;
    assert!(response.is_success(), "{}", response.message);
    assert!(response.message.starts_with("Service web started with pid: "));
    let pid: u32 = response.message.rsplit(' ').next().unwrap().parse().unwrap();

    assert_eq!(daemon.send(status("web")).await.message, "running");
    let by_pid = Request::Status { id: None, pid: Some(pid) };
    assert_eq!(daemon.send(by_pid).await.message, "running");

    let response = daemon.send(signal("web", "SIGTERM")).await;
    assert!(response.is_success());
    assert_eq!(response.message, "Service web stopped");
    assert_eq!(daemon.send(status("web")).await.message, "stopped");

    daemon.stop().await;
}

#[smol_potat::test]
async fn test_errors_do_not_stop_the_daemon() {
    let daemon = TestDaemon::spawn(Config::default()).await;

    let response = raw_exchange(&daemon.socket, b"this is not json\n").await;
    assert_eq!(response.status, ResponseStatus::Error);

    let response = raw_exchange(&daemon.socket, br#"{"action": "reboot"}"#).await;
    assert_eq!(response.status, ResponseStatus::Error);

    // A client that hangs up without sending anything
    drop(UnixStream::connect(&daemon.socket).await.unwrap());

    for _ in 0..2 {
        let response = daemon.send(signal("ghost", "SIGTERM")).await;
        assert_eq!(response.status, ResponseStatus::Error);
    }

    let response = daemon.send(signal("ghost", "SIGBOGUS")).await;
    assert_eq!(response.status, ResponseStatus::Error);

    assert_eq!(daemon.send(status("ghost")).await.message, "unknown");
    assert_eq!(daemon.send(Request::List).await.message, "no services");

    daemon.stop().await;
}

#[smol_potat::test]
async fn test_output_and_env() {
    let daemon = TestDaemon::spawn(Config::default()).await;

    let request = Request::Start {
        id: Some("greeter".to_string()),
        binary: Some("sh".to_string()),
        alias: None,
        env: vec!["GREETING=hello".to_string()],
        program_argument: vec!["-c".to_string(), "echo $GREETING from $(pwd)".to_string()],
        working_dir: "/tmp".to_string(),
    };
    assert!(daemon.send(request).await.is_success());

    let output_request = Request::Output {
        id: Some("greeter".to_string()),
        pid: None,
    };
    let mut output = String::new();
    for _ in 0..50 {
        output = daemon.send(output_request.clone()).await.message;
        if output.contains("hello") {
            break;
        }
        smol::Timer::after(Duration::from_millis(20)).await;
    }
    assert!(output.contains("hello from /tmp"), "unexpected output: {output}");

    daemon.stop().await;
}

#[smol_potat::test]
async fn test_autostart_and_alias() {
    let mut config = Config::default();
    config.aliases.insert("nap".to_string(), "sleep".to_string());
    config.autostart.insert("idle".to_string(), "nap 30".to_string());
    config.settings.id_length = 5;

    let daemon = TestDaemon::spawn(config).await;

    let listing = daemon.send(Request::List).await.message;
    let fields: Vec<&str> = listing.split('\t').collect();
    assert_eq!(fields.len(), 4, "unexpected listing: {listing}");
    assert_eq!(fields[0].len(), 5);
    assert_eq!(fields[1], "running");
    assert_eq!(fields[3], "sleep");
    let autostarted = fields[0].to_string();

    let request = Request::Start {
        id: None,
        binary: None,
        alias: Some("nap".to_string()),
        env: Vec::new(),
        program_argument: vec!["30".to_string()],
        working_dir: "/".to_string(),
    };
    let response = daemon.send(request).await;
    assert!(response.is_success(), "{}", response.message);

    let listing = daemon.send(Request::List).await.message;
    assert_eq!(listing.lines().count(), 2);

    for line in listing.lines() {
        let id = line.split('\t').next().unwrap();
        assert!(daemon.send(signal(id, "SIGKILL")).await.is_success());
    }
    assert_eq!(daemon.send(status(&autostarted)).await.message, "stopped");

    daemon.stop().await;
}

#[smol_potat::test]
async fn test_shutdown_removes_socket() {
    let daemon = TestDaemon::spawn(Config::default()).await;
    let socket = daemon.stop().await;
    assert!(!socket.exists());
}

#[smol_potat::test]
async fn test_strict_autostart_failure_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("opsctl.sock");

    let mut config = Config::default();
    config
        .autostart
        .insert("broken".to_string(), "/nonexistent/opsctl-autostart".to_string());
    config.settings.strict_autostart = true;

    let (_shutdown, rx) = async_channel::bounded::<()>(1);
    let result = opsctl::daemon::run(config, &socket, rx).await;
    assert!(result.is_err());
    assert!(!socket.exists());
}
