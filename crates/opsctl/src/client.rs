//! Unix socket client for communicating with the daemon

use async_net::unix::UnixStream;
use std::path::Path;
use tracing::debug;

use crate::protocol::{self, Request, Response, Result};

/// Send one request and wait for the daemon's answer
pub async fn send_request(socket_path: impl AsRef<Path>, request: &Request) -> Result<Response> {
    let socket_path = socket_path.as_ref();
    let mut stream = UnixStream::connect(socket_path).await?;
    debug!("Connected to daemon at {}", socket_path.display());

    protocol::write_message(&mut stream, request).await?;
    let response = protocol::read_response(&mut stream).await?;
    debug!("Daemon answered: {:?}", response);
    Ok(response)
}
