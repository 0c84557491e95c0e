//! # failcheck core
//!
//! Data-loss detection across a database failover.
//!
//! This crate provides:
//! - An append-only local log that records every value sent remotely
//! - A resilient generate loop that keeps writing through connection loss
//! - A reconciler that lists what the remote store failed to keep
//! - A remote store abstraction with an in-memory implementation
//!
//! ## Architecture
//!
//! ```text
//! Generator ──always──▶ LocalLog
//!     └──best effort──▶ RemoteStore (ground-truth table)
//!
//! Reconciler: LocalLog ──bulk load──▶ RemoteStore (comparison table)
//!                                    ──anti-join──▶ missing records
//! ```
//!
//! ## Key Invariants
//!
//! - Local durability precedes every remote attempt
//! - Identifiers increase by one per cycle, with no reuse
//! - Remote failures are transient; only local log failures are fatal
//! - Cancellation is a clean stop, never an error

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod generator;
mod log;
mod payload;
mod reconcile;
mod record;
mod remote;

pub use config::{parse_duration, GeneratorConfig, ReconcileConfig, DEFAULT_LOG_PATH};
pub use error::{
    ConfigError, ConfigResult, GeneratorError, GeneratorResult, LogError, LogResult,
    ReconcileError, ReconcileResult, RemoteError, RemoteResult,
};
pub use generator::{Generator, RunStats};
pub use log::{LocalLog, LogReader};
pub use payload::random_payload;
pub use reconcile::{Reconciler, Reconciliation};
pub use record::{Record, RecordId};
pub use remote::{
    close_quietly, init_schema, with_deadline, MemoryRemote, MemorySession, RemoteSession,
    RemoteStore,
};
