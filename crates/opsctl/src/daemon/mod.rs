//! Control daemon implementation

pub mod handlers;
pub mod server;

pub use server::DaemonState;

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use supervisor_config::Config;

/// Run autostart, then serve `socket_path` until `shutdown` fires
///
/// The socket file is removed again on the way out.
pub async fn run(
    config: Config,
    socket_path: &Path,
    shutdown: async_channel::Receiver<()>,
) -> Result<()> {
    let state = Arc::new(DaemonState::new(config));
    state.bootstrap().await?;

    let listener = server::bind(socket_path)?;
    let result = server::serve(listener, state, shutdown).await;
    server::remove_socket(socket_path);
    result
}
