//! # Supervisor core
//!
//! The concurrent registry of supervised processes and the per-service
//! lifecycle state machine.
//!
//! ```text
//! Initialized ─┐
//! Stopped ─────┼─ start ok ──▶ Running ── SIGTERM/SIGKILL, exit observed ──▶ Stopped
//! Error ───────┘      │                └─ stop-class delivery fails ──────▶ Error
//!                     └─ spawn fails ─▶ Error
//! ```
//!
//! A process that exits on its own is recorded as `Stopped` the next time its
//! service is inspected.

#![warn(missing_docs)]

pub mod bootstrap;
pub mod error;
pub mod id;
pub mod registry;
pub mod service;

pub use bootstrap::{BootstrapFailure, BootstrapPolicy, BootstrapReport, StartedService, bootstrap};
pub use error::{Error, Result};
pub use id::{DEFAULT_ID_LENGTH, DEFAULT_MAX_ATTEMPTS};
pub use registry::{Registry, RegistryConfig, ServiceRef, ServiceSummary, StatusReport};
pub use service::{ServiceSpec, ServiceState, ServiceStatus, SupervisedService};

pub use command_executor::{DEFAULT_OUTPUT_LIMIT, SignalKind};
