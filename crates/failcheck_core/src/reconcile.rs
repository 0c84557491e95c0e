//! Reconciliation: what the local log holds that the remote store lost.

use crate::config::ReconcileConfig;
use crate::error::{LogResult, ReconcileResult};
use crate::log::LogReader;
use crate::record::Record;
use crate::remote::{close_quietly, with_deadline, RemoteSession, RemoteStore};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Outcome of a reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Records present locally but absent from the ground truth, in the
    /// order the remote store returned them.
    pub missing: Vec<Record>,
    /// Rows bulk loaded into the comparison table, `None` when loading was
    /// skipped.
    pub loaded: Option<u64>,
}

impl Reconciliation {
    /// Returns the number of missing records.
    pub fn count(&self) -> usize {
        self.missing.len()
    }

    /// Returns true when nothing was lost.
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty()
    }
}

/// One-shot comparison of the local log against the remote ground truth.
///
/// Any failure aborts the run; there is no partial result.
pub struct Reconciler<S: RemoteStore> {
    config: ReconcileConfig,
    store: S,
    cancel: CancellationToken,
}

impl<S: RemoteStore> Reconciler<S> {
    /// Creates a reconciler.
    pub fn new(config: ReconcileConfig, store: S) -> Self {
        Self {
            config,
            store,
            cancel: CancellationToken::new(),
        }
    }

    /// Aborts in-flight remote calls when `cancel` fires.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Runs the reconciliation.
    ///
    /// The local log is read in full before the remote store is touched, so
    /// a corrupt log leaves the comparison table as it was.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be replayed or any remote step
    /// fails.
    pub async fn run(&self) -> ReconcileResult<Reconciliation> {
        self.config.validate()?;

        let records = if self.config.no_load {
            None
        } else {
            Some(read_log(&self.config.log_path)?)
        };

        info!("connecting to remote store");
        let mut session =
            with_deadline(&self.cancel, self.config.timeout, self.store.connect()).await?;

        let result = self.compare(&mut session, records).await;
        close_quietly(&mut session, self.config.timeout).await;
        let reconciliation = result?;

        info!(differences = reconciliation.count(), "reconciliation done");
        Ok(reconciliation)
    }

    async fn compare(
        &self,
        session: &mut S::Session,
        records: Option<Vec<Record>>,
    ) -> ReconcileResult<Reconciliation> {
        let timeout = self.config.timeout;

        let loaded = match records {
            Some(records) => {
                info!(records = records.len(), "copying local log to remote store");
                let rows = with_deadline(&self.cancel, timeout, session.bulk_load(&records)).await?;
                info!(rows, "copied rows");
                Some(rows)
            }
            None => None,
        };

        let missing = with_deadline(&self.cancel, timeout, session.missing_records()).await?;
        Ok(Reconciliation { missing, loaded })
    }
}

/// Reads every record of the log at `path`.
fn read_log(path: &Path) -> LogResult<Vec<Record>> {
    LogReader::open(path)?.collect()
}
