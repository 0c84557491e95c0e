//! Remote store abstraction.
//!
//! The generator and the reconciler only see these traits. A concrete store
//! (PostgreSQL, or [`MemoryRemote`] for tests) provides the wire protocol.
//!
//! ## Tables
//!
//! - **ground truth**: durable, keyed by `id`, receives one insert per cycle
//! - **comparison**: unlogged scratch table of the same shape, reloaded from
//!   the local log for each reconciliation
//!
//! ## Transactions
//!
//! Every [`RemoteSession`] method is one unit of work: it begins its own
//! transaction, commits it on success and rolls it back on failure. No
//! transaction is left open when a method returns.

mod memory;

pub use memory::{MemoryRemote, MemorySession};

use crate::error::{RemoteError, RemoteResult};
use crate::record::{Record, RecordId};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A remote database able to open sessions.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Session type produced by [`RemoteStore::connect`].
    type Session: RemoteSession;

    /// Opens a new session.
    async fn connect(&self) -> RemoteResult<Self::Session>;
}

/// An open connection to the remote store.
#[async_trait]
pub trait RemoteSession: Send {
    /// Returns true once the connection is known to be unusable.
    fn is_closed(&self) -> bool;

    /// Creates the schema, tables included, if missing.
    async fn create_schema(&mut self) -> RemoteResult<()>;

    /// Empties both the ground-truth and the comparison tables.
    async fn truncate_tables(&mut self) -> RemoteResult<()>;

    /// Returns `max(id) + 1` over the ground-truth table, or 1 when empty.
    async fn next_id(&mut self) -> RemoteResult<RecordId>;

    /// Inserts one record into the ground-truth table.
    async fn insert(&mut self, record: &Record) -> RemoteResult<()>;

    /// Replaces the comparison table content with `records`.
    ///
    /// Returns the number of rows loaded.
    async fn bulk_load(&mut self, records: &[Record]) -> RemoteResult<u64>;

    /// Returns the comparison rows whose id is absent from the ground truth.
    ///
    /// Rows come back in whatever order the store yields them.
    async fn missing_records(&mut self) -> RemoteResult<Vec<Record>>;

    /// Closes the session. Calling it on a closed session does nothing.
    async fn close(&mut self) -> RemoteResult<()>;
}

/// Runs a remote operation bounded by `timeout` and by `cancel`.
///
/// Cancellation wins over a timeout expiring at the same time, and is
/// reported as [`RemoteError::Cancelled`] so callers can tell a stop request
/// from a slow or dead server.
pub async fn with_deadline<T, F>(
    cancel: &CancellationToken,
    timeout: Duration,
    operation: F,
) -> RemoteResult<T>
where
    F: Future<Output = RemoteResult<T>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(RemoteError::Cancelled),
        result = tokio::time::timeout(timeout, operation) => {
            result.unwrap_or_else(|_| Err(RemoteError::Timeout))
        }
    }
}

/// Closes `session` within `timeout`, logging any failure.
///
/// Skips the call when the session already reports itself closed.
pub async fn close_quietly<C: RemoteSession>(session: &mut C, timeout: Duration) {
    if session.is_closed() {
        return;
    }
    match tokio::time::timeout(timeout, session.close()).await {
        Ok(Ok(())) => tracing::debug!("remote session closed"),
        Ok(Err(e)) => tracing::warn!(error = %e, "could not close remote session"),
        Err(_) => tracing::warn!("timed out closing remote session"),
    }
}

/// Creates the remote schema.
///
/// # Errors
///
/// Returns an error if the connection or the DDL fails.
pub async fn init_schema<S: RemoteStore>(store: &S, timeout: Duration) -> RemoteResult<()> {
    let cancel = CancellationToken::new();
    let mut session = with_deadline(&cancel, timeout, store.connect()).await?;
    let result = with_deadline(&cancel, timeout, session.create_schema()).await;
    close_quietly(&mut session, timeout).await;
    result?;

    tracing::info!("remote schema initialized");
    Ok(())
}
