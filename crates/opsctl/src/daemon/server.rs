//! Unix socket server for the control daemon

use crate::daemon::handlers;
use crate::protocol::{self, ProtocolError, Response};
use anyhow::{Context, Result, bail};
use async_net::unix::{UnixListener, UnixStream};
use std::fs;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use supervisor_config::{Config, autostart_specs};
use supervisor_core::{BootstrapPolicy, Registry, RegistryConfig};
use tracing::{debug, error, info, warn};

/// Daemon state shared between connections
///
/// The registry synchronizes internally, so connections share it without an
/// outer lock.
pub struct DaemonState {
    /// Supervised services
    pub registry: Registry,
    /// Aliases, autostart entries and settings
    pub config: Config,
}

impl DaemonState {
    /// Create state with an empty registry sized by `config`
    pub fn new(config: Config) -> Self {
        let registry = Registry::with_config(RegistryConfig {
            output_limit: config.settings.output_limit_bytes,
            ..RegistryConfig::default()
        });
        Self { registry, config }
    }

    /// Add and start every autostart entry
    pub async fn bootstrap(&self) -> Result<()> {
        let entries = autostart_specs(&self.config).context("Failed to resolve autostart entries")?;
        if entries.is_empty() {
            return Ok(());
        }

        let policy = BootstrapPolicy::from_strict(self.config.settings.strict_autostart);
        let report = supervisor_core::bootstrap(
            &self.registry,
            entries,
            self.config.settings.id_length,
            policy,
        )
        .await
        .context("Autostart failed")?;

        for failure in &report.failures {
            warn!("Autostart entry {} is not running: {}", failure.name, failure.reason);
        }
        Ok(())
    }
}

/// Bind the control socket, replacing a stale socket file
pub fn bind(path: &Path) -> Result<UnixListener> {
    if let Ok(metadata) = fs::symlink_metadata(path) {
        if !metadata.file_type().is_socket() {
            bail!("{} exists and is not a socket", path.display());
        }
        info!("Removing stale socket {}", path.display());
        fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))?;
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let listener = UnixListener::bind(path)
        .with_context(|| format!("Failed to bind to {}", path.display()))?;
    info!("Control daemon listening on {}", path.display());
    Ok(listener)
}

/// Remove the socket file, logging instead of failing
pub fn remove_socket(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed socket {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove socket {}: {}", path.display(), e),
    }
}

/// Accept connections until `shutdown` fires or its sender goes away
pub async fn serve(
    listener: UnixListener,
    state: Arc<DaemonState>,
    shutdown: async_channel::Receiver<()>,
) -> Result<()> {
    loop {
        let accepted = smol::future::or(async { Some(listener.accept().await) }, async {
            let _ = shutdown.recv().await;
            None
        })
        .await;

        match accepted {
            None => {
                info!("Shutting down control daemon");
                return Ok(());
            }
            Some(Ok((stream, _))) => {
                debug!("New connection");
                let state = state.clone();
                smol::spawn(handle_connection(stream, state)).detach();
            }
            Some(Err(e)) => {
                error!("Failed to accept connection: {}", e);
                smol::Timer::after(Duration::from_millis(100)).await;
            }
        }
    }
}

/// Answer the single request carried by one connection
async fn handle_connection(mut stream: UnixStream, state: Arc<DaemonState>) {
    let response = match protocol::read_request(&mut stream).await {
        Ok(request) => handlers::handle_request(request, &state).await,
        Err(ProtocolError::ConnectionClosed) => {
            debug!("Client disconnected without sending a request");
            return;
        }
        Err(ProtocolError::Io(e)) => {
            warn!("Failed to read request: {}", e);
            return;
        }
        Err(e) => {
            warn!("Rejected request: {}", e);
            Response::error(e.to_string())
        }
    };

    if let Err(e) = protocol::write_message(&mut stream, &response).await {
        debug!("Failed to send response: {}", e);
    }
}
