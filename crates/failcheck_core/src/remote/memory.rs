//! In-memory remote store with fault injection.

use crate::error::{RemoteError, RemoteResult};
use crate::record::{Record, RecordId};
use crate::remote::{RemoteSession, RemoteStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// How an injected insert failure behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InsertFault {
    /// The statement fails, the connection survives.
    Reject,
    /// The server goes away mid-insert.
    DropConnection,
    /// The insert never answers.
    Stall,
}

#[derive(Debug, Default)]
struct MemoryState {
    schema: bool,
    stamps: BTreeMap<RecordId, Record>,
    replay: Vec<Record>,
    refuse_connects: u32,
    stall_connects: bool,
    fail_next_id: u32,
    fail_truncate: bool,
    drop_on_truncate: bool,
    insert_faults: HashMap<RecordId, InsertFault>,
    cancel_after_inserts: Option<(u64, CancellationToken)>,
    insert_attempts: u64,
    connects: u64,
    open_sessions: u64,
    sessions_lost: u64,
}

impl MemoryState {
    fn require_schema(&self, context: &str) -> RemoteResult<()> {
        if self.schema {
            Ok(())
        } else {
            Err(RemoteError::query(context, "schema does not exist"))
        }
    }
}

/// A remote store kept in memory.
///
/// Clones share the same tables, so a test can keep a handle for
/// assertions while the generator or the reconciler owns another.
///
/// # Example
///
/// ```
/// use failcheck_core::MemoryRemote;
///
/// let remote = MemoryRemote::new();
/// remote.seed_stamps([1, 2, 4]);
/// remote.fail_insert(5);
/// assert_eq!(remote.stamp_ids(), vec![1, 2, 4]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryRemote {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRemote {
    /// Creates a store whose schema already exists.
    pub fn new() -> Self {
        let remote = Self::default();
        remote.state.lock().schema = true;
        remote
    }

    /// Creates a store with no schema; every table operation fails until
    /// [`RemoteSession::create_schema`] runs.
    pub fn without_schema() -> Self {
        Self::default()
    }

    /// Returns true once the schema exists.
    pub fn has_schema(&self) -> bool {
        self.state.lock().schema
    }

    /// Adds ground-truth rows with the given ids.
    pub fn seed_stamps(&self, ids: impl IntoIterator<Item = RecordId>) {
        let mut state = self.state.lock();
        for id in ids {
            state.stamps.insert(id, Record::now(id, ""));
        }
    }

    /// Removes ground-truth rows, as a failover losing them would.
    pub fn lose_stamps(&self, ids: impl IntoIterator<Item = RecordId>) {
        let mut state = self.state.lock();
        for id in ids {
            state.stamps.remove(&id);
        }
    }

    /// Refuses the next `count` connection attempts.
    pub fn refuse_connects(&self, count: u32) {
        self.state.lock().refuse_connects = count;
    }

    /// Makes connection attempts hang until dropped.
    pub fn stall_connects(&self, stall: bool) {
        self.state.lock().stall_connects = stall;
    }

    /// Fails the next `count` `next_id` queries, dropping the connection.
    pub fn fail_next_id(&self, count: u32) {
        self.state.lock().fail_next_id = count;
    }

    /// Makes `truncate_tables` fail.
    pub fn fail_truncate(&self, fail: bool) {
        self.state.lock().fail_truncate = fail;
    }

    /// Drops the connection during the next `truncate_tables`.
    pub fn drop_connection_on_truncate(&self) {
        self.state.lock().drop_on_truncate = true;
    }

    /// Rejects the insert of `id`; the connection stays usable.
    pub fn fail_insert(&self, id: RecordId) {
        self.state.lock().insert_faults.insert(id, InsertFault::Reject);
    }

    /// Drops the connection while inserting `id`.
    pub fn drop_connection_on_insert(&self, id: RecordId) {
        self.state
            .lock()
            .insert_faults
            .insert(id, InsertFault::DropConnection);
    }

    /// Never answers the insert of `id`.
    pub fn stall_insert(&self, id: RecordId) {
        self.state.lock().insert_faults.insert(id, InsertFault::Stall);
    }

    /// Cancels `token` once `count` more inserts have been attempted.
    pub fn cancel_after_inserts(&self, count: u64, token: CancellationToken) {
        let mut state = self.state.lock();
        let target = state.insert_attempts + count;
        state.cancel_after_inserts = Some((target, token));
    }

    /// Returns the ground-truth ids in ascending order.
    pub fn stamp_ids(&self) -> Vec<RecordId> {
        self.state.lock().stamps.keys().copied().collect()
    }

    /// Returns a ground-truth row.
    pub fn stamp(&self, id: RecordId) -> Option<Record> {
        self.state.lock().stamps.get(&id).cloned()
    }

    /// Returns the comparison table ids in load order.
    pub fn replay_ids(&self) -> Vec<RecordId> {
        self.state.lock().replay.iter().map(|r| r.id).collect()
    }

    /// Returns the number of attempted inserts.
    pub fn insert_attempts(&self) -> u64 {
        self.state.lock().insert_attempts
    }

    /// Returns the number of successful connections.
    pub fn connects(&self) -> u64 {
        self.state.lock().connects
    }

    /// Returns the number of sessions neither closed nor lost.
    pub fn open_sessions(&self) -> u64 {
        self.state.lock().open_sessions
    }

    /// Returns the number of sessions dropped by the server side.
    pub fn sessions_lost(&self) -> u64 {
        self.state.lock().sessions_lost
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    type Session = MemorySession;

    async fn connect(&self) -> RemoteResult<MemorySession> {
        let stall = {
            let mut state = self.state.lock();
            if state.refuse_connects > 0 {
                state.refuse_connects -= 1;
                return Err(RemoteError::Connect("connection refused".into()));
            }
            state.stall_connects
        };
        if stall {
            std::future::pending::<()>().await;
        }

        let mut state = self.state.lock();
        state.connects += 1;
        state.open_sessions += 1;
        Ok(MemorySession {
            state: Arc::clone(&self.state),
            closed: false,
        })
    }
}

/// A session on a [`MemoryRemote`].
#[derive(Debug)]
pub struct MemorySession {
    state: Arc<Mutex<MemoryState>>,
    closed: bool,
}

impl MemorySession {
    fn ensure_open(&self) -> RemoteResult<()> {
        if self.closed {
            Err(RemoteError::Closed)
        } else {
            Ok(())
        }
    }

    fn lose_connection(&mut self, state: &mut MemoryState) {
        if !self.closed {
            self.closed = true;
            state.open_sessions -= 1;
            state.sessions_lost += 1;
        }
    }
}

#[async_trait]
impl RemoteSession for MemorySession {
    fn is_closed(&self) -> bool {
        self.closed
    }

    async fn create_schema(&mut self) -> RemoteResult<()> {
        self.ensure_open()?;
        self.state.lock().schema = true;
        Ok(())
    }

    async fn truncate_tables(&mut self) -> RemoteResult<()> {
        self.ensure_open()?;
        let state = Arc::clone(&self.state);
        let mut state = state.lock();
        state.require_schema("could not truncate tables")?;
        if state.drop_on_truncate {
            state.drop_on_truncate = false;
            self.lose_connection(&mut state);
            return Err(RemoteError::connection_lost(
                "could not truncate tables",
                "server closed the connection unexpectedly",
            ));
        }
        if state.fail_truncate {
            return Err(RemoteError::query(
                "could not truncate tables",
                "lock timeout",
            ));
        }
        state.stamps.clear();
        state.replay.clear();
        Ok(())
    }

    async fn next_id(&mut self) -> RemoteResult<RecordId> {
        self.ensure_open()?;
        let state = Arc::clone(&self.state);
        let mut state = state.lock();
        state.require_schema("could not get next id")?;
        if state.fail_next_id > 0 {
            state.fail_next_id -= 1;
            self.lose_connection(&mut state);
            return Err(RemoteError::connection_lost(
                "could not get next id",
                "server closed the connection unexpectedly",
            ));
        }
        Ok(state.stamps.keys().next_back().map_or(1, |max| max + 1))
    }

    async fn insert(&mut self, record: &Record) -> RemoteResult<()> {
        self.ensure_open()?;
        let fault = {
            let state = Arc::clone(&self.state);
            let mut state = state.lock();
            state.insert_attempts += 1;
            if let Some((after, token)) = &state.cancel_after_inserts {
                if state.insert_attempts >= *after {
                    token.cancel();
                }
            }
            state.require_schema("could not insert")?;

            match state.insert_faults.get(&record.id).copied() {
                Some(InsertFault::Reject) => {
                    return Err(RemoteError::query(
                        "could not insert",
                        "cannot execute INSERT in a read-only transaction",
                    ));
                }
                Some(InsertFault::DropConnection) => {
                    self.lose_connection(&mut state);
                    return Err(RemoteError::connection_lost(
                        "could not insert",
                        "server closed the connection unexpectedly",
                    ));
                }
                Some(InsertFault::Stall) => true,
                None => {
                    if state.stamps.contains_key(&record.id) {
                        return Err(RemoteError::query(
                            "could not insert",
                            format!("duplicate key value (id)=({})", record.id),
                        ));
                    }
                    state.stamps.insert(record.id, record.clone());
                    false
                }
            }
        };

        if fault {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn bulk_load(&mut self, records: &[Record]) -> RemoteResult<u64> {
        self.ensure_open()?;
        let mut state = self.state.lock();
        state.require_schema("could not load local log")?;

        let mut seen = HashSet::with_capacity(records.len());
        if let Some(dup) = records.iter().find(|r| !seen.insert(r.id)) {
            return Err(RemoteError::query(
                "could not load local log",
                format!("duplicate key value (id)=({})", dup.id),
            ));
        }
        state.replay = records.to_vec();
        Ok(records.len() as u64)
    }

    async fn missing_records(&mut self) -> RemoteResult<Vec<Record>> {
        self.ensure_open()?;
        let state = self.state.lock();
        state.require_schema("could not compare")?;
        Ok(state
            .replay
            .iter()
            .rev()
            .filter(|r| !state.stamps.contains_key(&r.id))
            .cloned()
            .collect())
    }

    async fn close(&mut self) -> RemoteResult<()> {
        if !self.closed {
            self.closed = true;
            self.state.lock().open_sessions -= 1;
        }
        Ok(())
    }
}
