//! Protocol types for daemon communication
//!
//! Every connection carries exactly one JSON request followed by one JSON
//! response. Messages are not length prefixed; the reader consumes bytes until
//! they form one complete JSON value.

use command_executor::SignalKind;
use futures::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use supervisor_core::ServiceRef;
use supervisor_core::service::DEFAULT_WORKING_DIR;
use thiserror::Error;

/// Largest message accepted from a peer
pub const MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// Failures to read, decode or validate a message
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Bytes that are not a JSON value
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// Well-formed JSON that is not an acceptable request
    #[error("Invalid request: {0}")]
    Invalid(String),

    /// Peer closed the connection before sending anything
    #[error("Connection closed before a message was received")]
    ConnectionClosed,

    /// Socket failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

fn default_working_dir() -> String {
    DEFAULT_WORKING_DIR.to_string()
}

/// Request messages from client to daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Request {
    /// Add a service and start it
    Start {
        /// Identifier to register under, generated when absent or empty
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        /// Program to execute
        #[serde(default, skip_serializing_if = "Option::is_none")]
        binary: Option<String>,
        /// Alias to resolve through the daemon's alias table
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
        /// `KEY=VALUE` entries
        #[serde(default)]
        env: Vec<String>,
        /// Positional arguments
        #[serde(default)]
        program_argument: Vec<String>,
        /// Working directory
        #[serde(default = "default_working_dir")]
        working_dir: String,
    },

    /// Deliver a signal
    Signal {
        /// Target identifier, preferred over `pid`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        /// Target process id
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pid: Option<u32>,
        /// Canonical signal name such as `SIGTERM`
        #[serde(rename = "signalType")]
        signal_type: String,
    },

    /// Report `running`, `stopped` or `unknown`
    Status {
        /// Target identifier, preferred over `pid`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        /// Target process id
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pid: Option<u32>,
    },

    /// Return captured output
    Output {
        /// Target identifier, preferred over `pid`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        /// Target process id
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pid: Option<u32>,
    },

    /// Summarize every service
    List,
}

/// What a start request runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Program {
    /// A program path or name
    Binary(String),
    /// An entry of the alias table
    Alias(String),
}

/// A validated start request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartAction {
    /// Identifier to register under
    pub id: Option<String>,
    /// What to run
    pub program: Program,
    /// `KEY=VALUE` entries
    pub env: Vec<String>,
    /// Positional arguments
    pub args: Vec<String>,
    /// Working directory
    pub working_dir: PathBuf,
}

/// A validated request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Add and start a service
    Start(StartAction),
    /// Deliver a signal
    Signal {
        /// Addressed service
        target: ServiceRef,
        /// Signal to deliver
        signal: SignalKind,
    },
    /// Query liveness
    Status(ServiceRef),
    /// Fetch captured output
    Output(ServiceRef),
    /// Summarize every service
    List,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn target(id: Option<String>, pid: Option<u32>) -> Result<ServiceRef> {
    match (non_empty(id), pid) {
        (Some(id), _) => Ok(ServiceRef::Id(id)),
        (None, Some(pid)) => Ok(ServiceRef::Pid(pid)),
        (None, None) => Err(ProtocolError::Invalid(
            "request names neither an id nor a pid".to_string(),
        )),
    }
}

impl Request {
    /// Check field combinations and parse the signal name
    pub fn validate(self) -> Result<Action> {
        match self {
            Request::Start {
                id,
                binary,
                alias,
                env,
                program_argument,
                working_dir,
            } => {
                let program = match (non_empty(binary), non_empty(alias)) {
                    (Some(binary), None) => Program::Binary(binary),
                    (None, Some(alias)) => Program::Alias(alias),
                    (Some(_), Some(_)) => {
                        return Err(ProtocolError::Invalid(
                            "binary and alias are mutually exclusive".to_string(),
                        ));
                    }
                    (None, None) => {
                        return Err(ProtocolError::Invalid(
                            "program binary undefined".to_string(),
                        ));
                    }
                };
                Ok(Action::Start(StartAction {
                    id: non_empty(id),
                    program,
                    env,
                    args: program_argument,
                    working_dir: PathBuf::from(working_dir),
                }))
            }
            Request::Signal {
                id,
                pid,
                signal_type,
            } => {
                let signal = signal_type
                    .parse::<SignalKind>()
                    .map_err(|e| ProtocolError::Invalid(e.to_string()))?;
                Ok(Action::Signal {
                    target: target(id, pid)?,
                    signal,
                })
            }
            Request::Status { id, pid } => Ok(Action::Status(target(id, pid)?)),
            Request::Output { id, pid } => Ok(Action::Output(target(id, pid)?)),
            Request::List => Ok(Action::List),
        }
    }
}

/// Outcome carried by a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    /// The request was carried out
    Success,
    /// The request failed
    Error,
}

/// Response message from daemon to client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Outcome
    pub status: ResponseStatus,
    /// Human readable result, also the carrier of status query answers
    pub message: String,
}

impl Response {
    /// A successful response
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: message.into(),
        }
    }

    /// A failed response
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: message.into(),
        }
    }

    /// Whether the request was carried out
    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

/// Read bytes until they form one complete JSON value
pub async fn read_value<R>(reader: &mut R) -> Result<serde_json::Value>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            if buf.iter().all(u8::is_ascii_whitespace) {
                return Err(ProtocolError::ConnectionClosed);
            }
            return Err(ProtocolError::Malformed(
                "connection closed in the middle of a message".to_string(),
            ));
        }
        buf.extend_from_slice(&chunk[..n]);

        let mut values = serde_json::Deserializer::from_slice(&buf).into_iter::<serde_json::Value>();
        match values.next() {
            Some(Ok(value)) => return Ok(value),
            Some(Err(e)) if e.is_eof() => {}
            Some(Err(e)) => return Err(ProtocolError::Malformed(e.to_string())),
            None => {}
        }

        if buf.len() > MAX_MESSAGE_BYTES {
            return Err(ProtocolError::Malformed(format!(
                "message exceeds {} bytes",
                MAX_MESSAGE_BYTES
            )));
        }
    }
}

async fn read_message<T, R>(reader: &mut R) -> Result<T>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let value = read_value(reader).await?;
    serde_json::from_value(value).map_err(|e| ProtocolError::Invalid(e.to_string()))
}

/// Read one request
pub async fn read_request<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Request> {
    read_message(reader).await
}

/// Read one response
pub async fn read_response<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Response> {
    read_message(reader).await
}

/// Write one message followed by a newline
pub async fn write_message<T, W>(writer: &mut W, message: &T) -> Result<()>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let mut bytes =
        serde_json::to_vec(message).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    bytes.push(b'\n');
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}
