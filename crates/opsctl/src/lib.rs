//! Control plane for the ops-ctrl supervisor
//!
//! `opsctld` owns a [`supervisor_core::Registry`] and answers one JSON request
//! per connection on a Unix socket. `opsctl` is the matching command line
//! client.

pub mod client;
pub mod daemon;
pub mod logging;
pub mod protocol;

pub use client::send_request;
pub use protocol::{ProtocolError, Request, Response, ResponseStatus};
