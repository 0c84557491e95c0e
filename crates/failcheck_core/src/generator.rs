//! The resilient generate-and-send loop.
//!
//! Each cycle produces a record, appends it to the local log, then tries to
//! insert it remotely. Remote failures are logged and retried on the next
//! cycle; only a local log failure stops the loop with an error.
//!
//! ## Stages
//!
//! ```text
//!  Disconnected ──connect──▶ Connected ──resolve id──▶ Ready ──▶ write ──┐
//!       ▲                        │                       ▲              │
//!       └────── connection lost ─┴───────────────────────┴──────────────┘
//! ```
//!
//! The next identifier is resolved once per run, on the first successful
//! connection. Later reconnections go straight to `Ready`. With `reset`, the
//! tables are truncated instead and numbering restarts at 1 even when the
//! truncation fails; a failed truncation still ends the cycle, so nothing is
//! written before the pause and, if needed, a reconnect.
//!
//! ## Invariants
//!
//! - A record is durable in the local log before its remote insert starts
//! - Identifiers advance by exactly one per written record, whether the
//!   remote insert succeeded or not
//! - Cancellation is a clean stop and never leaves a session open

use crate::config::GeneratorConfig;
use crate::error::{GeneratorResult, RemoteError};
use crate::log::LocalLog;
use crate::payload::random_payload;
use crate::record::{Record, RecordId};
use crate::remote::{close_quietly, with_deadline, RemoteSession, RemoteStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where the loop stands with respect to the remote store.
enum Stage<C> {
    /// No usable session.
    Disconnected,
    /// Session open, next identifier not resolved yet.
    Connected(C),
    /// Session open, writing records.
    Ready(C),
}

impl<C> Stage<C> {
    fn name(&self) -> &'static str {
        match self {
            Stage::Disconnected => "disconnected",
            Stage::Connected(_) => "connected",
            Stage::Ready(_) => "ready",
        }
    }

    /// Moves a `Connected` session to `Ready`.
    fn promote(&mut self) {
        if let Stage::Connected(_) = self {
            if let Some(session) = self.take_session() {
                *self = Stage::Ready(session);
            }
        }
    }

    fn take_session(&mut self) -> Option<C> {
        match std::mem::replace(self, Stage::Disconnected) {
            Stage::Disconnected => None,
            Stage::Connected(session) | Stage::Ready(session) => Some(session),
        }
    }
}

/// What to do after a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    /// Pause, then run the next cycle.
    Continue,
    /// Stop the loop cleanly.
    Stop,
}

/// Counters reported when the loop ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Cycles started.
    pub cycles: u64,
    /// Records written to the local log.
    pub generated: u64,
    /// Records the remote store accepted.
    pub remote_inserted: u64,
    /// Records the remote store did not accept.
    pub remote_failed: u64,
    /// Successful connections.
    pub connects: u64,
    /// Failed connection attempts.
    pub connect_failures: u64,
    /// Last identifier written, if any.
    pub last_id: Option<RecordId>,
}

/// Mutable state carried across cycles.
struct RunState<C> {
    stage: Stage<C>,
    next_id: RecordId,
    log: LocalLog,
    payload: String,
    stats: RunStats,
}

/// Generates records until cancelled.
///
/// # Example
///
/// ```no_run
/// use failcheck_core::{Generator, GeneratorConfig, MemoryRemote};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn run() -> failcheck_core::GeneratorResult<()> {
/// let cancel = CancellationToken::new();
/// let generator = Generator::new(
///     GeneratorConfig::new("/tmp/stamps.log"),
///     MemoryRemote::new(),
///     cancel.clone(),
/// );
/// let stats = generator.run().await?;
/// println!("wrote {} records", stats.generated);
/// # Ok(())
/// # }
/// ```
pub struct Generator<S: RemoteStore> {
    config: GeneratorConfig,
    store: S,
    cancel: CancellationToken,
}

impl<S: RemoteStore> Generator<S> {
    /// Creates a generator. Nothing runs until [`Generator::run`].
    pub fn new(config: GeneratorConfig, store: S, cancel: CancellationToken) -> Self {
        Self {
            config,
            store,
            cancel,
        }
    }

    /// Runs the loop until `cancel` fires or the local log fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the local log
    /// cannot be opened or appended to. Remote failures never end the loop.
    pub async fn run(self) -> GeneratorResult<RunStats> {
        self.config.validate()?;

        let log = LocalLog::open(&self.config.log_path, self.config.reset)?
            .with_sync_on_write(self.config.sync_on_write);

        let size = self.config.payload_len()?;
        info!(size, "generating random payload");
        let payload = random_payload(&mut rand::thread_rng(), size);

        let mut run = RunState {
            stage: Stage::Disconnected,
            next_id: 0,
            log,
            payload,
            stats: RunStats::default(),
        };

        let outcome = self.drive(&mut run).await;

        if let Some(mut session) = run.stage.take_session() {
            close_quietly(&mut session, self.config.timeout).await;
        }
        if let Err(e) = run.log.close() {
            warn!(error = %e, "could not close local log");
        }

        outcome?;
        info!(
            generated = run.stats.generated,
            inserted = run.stats.remote_inserted,
            failed = run.stats.remote_failed,
            "generator stopped"
        );
        Ok(run.stats)
    }

    async fn drive(&self, run: &mut RunState<S::Session>) -> GeneratorResult<()> {
        loop {
            if self.cancel.is_cancelled() {
                info!("stop requested, exiting");
                return Ok(());
            }

            run.stats.cycles += 1;
            if self.cycle(run).await? == Flow::Stop {
                info!("stop requested during remote operation, exiting");
                return Ok(());
            }

            self.pace().await;
        }
    }

    /// Runs one cycle, advancing through as many stages as it can.
    async fn cycle(&self, run: &mut RunState<S::Session>) -> GeneratorResult<Flow> {
        if matches!(run.stage, Stage::Disconnected) {
            info!("connecting to remote store");
            match with_deadline(&self.cancel, self.config.timeout, self.store.connect()).await {
                Ok(session) => {
                    run.stats.connects += 1;
                    run.stage = if run.next_id == 0 {
                        Stage::Connected(session)
                    } else {
                        Stage::Ready(session)
                    };
                }
                Err(RemoteError::Cancelled) => return Ok(Flow::Stop),
                Err(e) => {
                    run.stats.connect_failures += 1;
                    warn!(error = %e, "could not connect");
                    return Ok(Flow::Continue);
                }
            }
        }

        if let Stage::Connected(session) = &mut run.stage {
            if self.config.reset {
                info!("truncating tables");
                let truncated =
                    with_deadline(&self.cancel, self.config.timeout, session.truncate_tables())
                        .await;
                // Numbering restarts at 1 whether or not the truncation went through.
                run.next_id = 1;
                run.stage.promote();
                match truncated {
                    Ok(()) => info!(next_id = run.next_id, "tables truncated"),
                    Err(RemoteError::Cancelled) => return Ok(Flow::Stop),
                    Err(e) => {
                        warn!(error = %e, "could not truncate tables");
                        self.drop_if_lost(run, &e).await;
                        return Ok(Flow::Continue);
                    }
                }
            } else {
                info!("getting next id");
                match with_deadline(&self.cancel, self.config.timeout, session.next_id()).await {
                    Ok(next_id) => {
                        info!(next_id, "next id resolved");
                        run.next_id = next_id;
                        run.stage.promote();
                    }
                    Err(RemoteError::Cancelled) => return Ok(Flow::Stop),
                    Err(e) => {
                        warn!(error = %e, "could not get next id");
                        self.drop_if_lost(run, &e).await;
                        return Ok(Flow::Continue);
                    }
                }
            }
        }

        let Stage::Ready(session) = &mut run.stage else {
            return Ok(Flow::Continue);
        };

        let record = Record::now(run.next_id, run.payload.as_str());
        run.log.append(&record)?;
        run.stats.generated += 1;

        debug!(id = record.id, "insert data");
        let inserted =
            with_deadline(&self.cancel, self.config.timeout, session.insert(&record)).await;
        let closed = session.is_closed();

        run.next_id += 1;
        run.stats.last_id = Some(record.id);

        match inserted {
            Ok(()) => {
                run.stats.remote_inserted += 1;
                if closed {
                    self.disconnect(run).await;
                }
                Ok(Flow::Continue)
            }
            Err(e) => {
                run.stats.remote_failed += 1;
                warn!(id = record.id, ts = %record.ts, error = %e, "could not insert");
                if closed || e.is_connection_lost() {
                    self.disconnect(run).await;
                }
                if matches!(e, RemoteError::Cancelled) {
                    Ok(Flow::Stop)
                } else {
                    Ok(Flow::Continue)
                }
            }
        }
    }

    async fn drop_if_lost(&self, run: &mut RunState<S::Session>, error: &RemoteError) {
        let closed = match &run.stage {
            Stage::Connected(session) | Stage::Ready(session) => session.is_closed(),
            Stage::Disconnected => return,
        };
        if closed || error.is_connection_lost() {
            self.disconnect(run).await;
        }
    }

    async fn disconnect(&self, run: &mut RunState<S::Session>) {
        debug!(stage = run.stage.name(), "dropping remote session");
        if let Some(mut session) = run.stage.take_session() {
            close_quietly(&mut session, self.config.timeout).await;
        }
    }

    async fn pace(&self) {
        tokio::select! {
            () = tokio::time::sleep(self.config.pause) => {}
            () = self.cancel.cancelled() => {}
        }
    }
}
