//! PostgreSQL sessions over a single `PgConnection`.

use crate::copy::{encode_row, CHUNK_SIZE};
use crate::schema;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use failcheck_core::{Record, RecordId, RemoteError, RemoteResult, RemoteSession, RemoteStore};
use sqlx::{Connection, PgConnection, Postgres, Transaction};

/// A PostgreSQL server reachable through a connection URL.
#[derive(Clone)]
pub struct PgRemote {
    url: String,
}

impl PgRemote {
    /// Creates a remote for `url` without connecting.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

// The URL can carry a password.
impl std::fmt::Debug for PgRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgRemote").finish_non_exhaustive()
    }
}

#[async_trait]
impl RemoteStore for PgRemote {
    type Session = PgSession;

    async fn connect(&self) -> RemoteResult<PgSession> {
        let conn = PgConnection::connect(&self.url)
            .await
            .map_err(|e| RemoteError::Connect(e.to_string()))?;
        tracing::debug!("connected to postgres");
        Ok(PgSession { conn: Some(conn) })
    }
}

/// One open connection. Dropped as soon as the server is known to be gone.
pub struct PgSession {
    conn: Option<PgConnection>,
}

impl PgSession {
    fn conn(&mut self) -> RemoteResult<&mut PgConnection> {
        self.conn.as_mut().ok_or(RemoteError::Closed)
    }

    /// Maps a driver error, forgetting the connection if it is unusable.
    fn fail(&mut self, context: &str, err: sqlx::Error) -> RemoteError {
        if is_connection_error(&err) {
            tracing::warn!(context, error = %err, "postgres connection lost");
            self.conn = None;
            RemoteError::connection_lost(context, err.to_string())
        } else {
            RemoteError::query(context, err.to_string())
        }
    }
}

#[async_trait]
impl RemoteSession for PgSession {
    fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    async fn create_schema(&mut self) -> RemoteResult<()> {
        let result = execute_all(self.conn()?, schema::CREATE_SCHEMA).await;
        result.map_err(|e| self.fail("create schema", e))
    }

    async fn truncate_tables(&mut self) -> RemoteResult<()> {
        let result = execute_all(self.conn()?, schema::TRUNCATE_TABLES).await;
        result.map_err(|e| self.fail("truncate", e))
    }

    async fn next_id(&mut self) -> RemoteResult<RecordId> {
        let result = sqlx::query_scalar::<_, i64>(schema::NEXT_ID)
            .fetch_one(self.conn()?)
            .await;
        result.map_err(|e| self.fail("next id", e))
    }

    async fn insert(&mut self, record: &Record) -> RemoteResult<()> {
        let result = insert_stamp(self.conn()?, record).await;
        result.map_err(|e| self.fail("insert", e))
    }

    async fn bulk_load(&mut self, records: &[Record]) -> RemoteResult<u64> {
        let result = load_replay(self.conn()?, records).await;
        result.map_err(|e| self.fail("bulk load", e))
    }

    async fn missing_records(&mut self) -> RemoteResult<Vec<Record>> {
        let result = sqlx::query_as::<_, (i64, DateTime<Utc>, Option<String>)>(schema::MISSING)
            .fetch_all(self.conn()?)
            .await;
        let rows = result.map_err(|e| self.fail("compare", e))?;
        Ok(rows
            .into_iter()
            .map(|(id, ts, payload)| Record::new(id, ts.fixed_offset(), payload.unwrap_or_default()))
            .collect())
    }

    async fn close(&mut self) -> RemoteResult<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        conn.close()
            .await
            .map_err(|e| RemoteError::query("close", e.to_string()))
    }
}

/// Returns true when `err` means the connection can no longer be used.
///
/// SQLSTATE class 08 is a connection exception; 57P covers admin shutdown,
/// crash shutdown and "cannot connect now" during recovery.
pub(crate) fn is_connection_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::PoolClosed
        | sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => db
            .code()
            .is_some_and(|code| code.starts_with("08") || code.starts_with("57P")),
        _ => false,
    }
}

async fn rollback(tx: Transaction<'_, Postgres>) {
    if let Err(e) = tx.rollback().await {
        tracing::warn!(error = %e, "rollback failed");
    }
}

async fn execute_all(conn: &mut PgConnection, statements: &[&str]) -> Result<(), sqlx::Error> {
    let mut tx = conn.begin().await?;
    for sql in statements {
        if let Err(e) = sqlx::query(sql).execute(&mut *tx).await {
            rollback(tx).await;
            return Err(e);
        }
    }
    tx.commit().await
}

async fn insert_stamp(conn: &mut PgConnection, record: &Record) -> Result<(), sqlx::Error> {
    let mut tx = conn.begin().await?;
    let result = sqlx::query(schema::INSERT_STAMP)
        .bind(record.id)
        .bind(record.ts)
        .bind(record.payload.as_str())
        .execute(&mut *tx)
        .await;
    match result {
        Ok(_) => tx.commit().await,
        Err(e) => {
            rollback(tx).await;
            Err(e)
        }
    }
}

async fn load_replay(conn: &mut PgConnection, records: &[Record]) -> Result<u64, sqlx::Error> {
    let mut tx = conn.begin().await?;
    match copy_records(&mut tx, records).await {
        Ok(rows) => {
            tx.commit().await?;
            tracing::debug!(rows, "comparison table loaded");
            Ok(rows)
        }
        Err(e) => {
            rollback(tx).await;
            Err(e)
        }
    }
}

async fn copy_records(conn: &mut PgConnection, records: &[Record]) -> Result<u64, sqlx::Error> {
    sqlx::query(schema::TRUNCATE_REPLAY)
        .execute(&mut *conn)
        .await?;

    let mut copy = conn.copy_in_raw(schema::COPY_REPLAY).await?;
    let mut buf = String::with_capacity(CHUNK_SIZE + 256);
    for record in records {
        encode_row(&mut buf, record);
        if buf.len() >= CHUNK_SIZE {
            copy.send(buf.as_bytes()).await?;
            buf.clear();
        }
    }
    if !buf.is_empty() {
        copy.send(buf.as_bytes()).await?;
    }
    copy.finish().await
}
