//! User-facing storage facades.
//!
//! - `LogWriter`: batch writes through the writer actor
//! - `LogReader`: time-range queries and counts on the shared pool
//! - `StorageAdmin`: deletion, retention and shutdown

use tokio::sync::{mpsc, oneshot};

use crate::model::{LogBatch, LogRecord, StoredLog};
use crate::storage::StorageError;
use crate::storage::actor::{Command, Reply};
use crate::storage::cursor::CursorPosition;
use crate::storage::db::SqlitePool;
use crate::storage::query::{
    LogPage, LogQuery, QueryError, QueryPlan, MESSAGE_SCAN_CHUNK, build_select, row_to_log,
};
use crate::storage::retention::retention_cutoff;

/// Send a command built around a fresh reply channel and await the answer.
async fn request<T>(
    tx: &mpsc::Sender<Command>,
    build: impl FnOnce(Reply<T>) -> Command,
) -> Result<T, StorageError> {
    let (reply, rx) = oneshot::channel();
    tx.send(build(reply))
        .await
        .map_err(|_| StorageError::ChannelSend)?;
    rx.await.map_err(|_| StorageError::ReplyDropped)?
}

// =============================================================================
// Writer
// =============================================================================

/// Storage writer.
///
/// Writes are awaited: the returned count is what the database committed,
/// and database failures propagate to the caller.
#[derive(Clone)]
pub struct LogWriter {
    tx: mpsc::Sender<Command>,
}

impl std::fmt::Debug for LogWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogWriter").finish_non_exhaustive()
    }
}

impl LogWriter {
    pub(crate) fn new(tx: mpsc::Sender<Command>) -> Self {
        Self { tx }
    }

    /// Append every record of the batch. No dedup, no upsert.
    pub async fn write_batch(&self, batch: LogBatch) -> Result<u64, StorageError> {
        self.write_records(batch.logs).await
    }

    pub async fn write_records(&self, records: Vec<LogRecord>) -> Result<u64, StorageError> {
        request(&self.tx, |reply| Command::WriteBatch { records, reply }).await
    }
}

// =============================================================================
// Reader
// =============================================================================

/// Log reader over the shared connection pool.
#[derive(Clone)]
pub struct LogReader {
    pool: SqlitePool,
}

impl std::fmt::Debug for LogReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogReader").finish_non_exhaustive()
    }
}

impl LogReader {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Run a time-range query and return one page, newest first.
    pub async fn query(&self, q: &LogQuery) -> Result<LogPage, QueryError> {
        let plan = q.plan()?;
        let limit = plan.limit as usize;

        let rows = match &plan.matcher {
            None => self.fetch(q, plan.after, plan.limit + 1).await?,
            Some(_) => self.scan_messages(q, &plan).await?,
        };

        Ok(LogPage::from_rows(rows, limit))
    }

    /// Count stored records, optionally for one application.
    pub async fn count(&self, application_id: Option<&str>) -> Result<u64, StorageError> {
        let row: (i64,) = match application_id {
            Some(app) => {
                sqlx::query_as("SELECT COUNT(*) FROM logs WHERE application_id = ?")
                    .bind(app)
                    .fetch_one(self.pool.inner())
                    .await?
            }
            None => {
                sqlx::query_as("SELECT COUNT(*) FROM logs")
                    .fetch_one(self.pool.inner())
                    .await?
            }
        };
        Ok(u64::try_from(row.0).unwrap_or_default())
    }

    /// Round-trip a trivial statement; used by readiness probes.
    pub async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1").execute(self.pool.inner()).await?;
        Ok(())
    }

    async fn fetch(
        &self,
        q: &LogQuery,
        after: Option<CursorPosition>,
        fetch: u32,
    ) -> Result<Vec<StoredLog>, StorageError> {
        let rows = build_select(q, after, fetch)
            .build()
            .fetch_all(self.pool.inner())
            .await?;
        rows.iter().map(row_to_log).collect()
    }

    /// Walk the SQL-filtered rows in result order, keeping message matches,
    /// until `limit + 1` matches are collected or the window is exhausted.
    async fn scan_messages(
        &self,
        q: &LogQuery,
        plan: &QueryPlan,
    ) -> Result<Vec<StoredLog>, StorageError> {
        let Some(matcher) = &plan.matcher else {
            return Ok(Vec::new());
        };
        let wanted = plan.limit as usize + 1;
        let mut matches = Vec::with_capacity(wanted);
        let mut position = plan.after;

        loop {
            let chunk = self.fetch(q, position, MESSAGE_SCAN_CHUNK).await?;
            let exhausted = chunk.len() < MESSAGE_SCAN_CHUNK as usize;

            for log in chunk {
                position = Some(CursorPosition::new(log.record.ts, log.id));
                if matcher.is_match(&log.record.message) {
                    matches.push(log);
                    if matches.len() >= wanted {
                        return Ok(matches);
                    }
                }
            }

            if exhausted {
                return Ok(matches);
            }
        }
    }
}

// =============================================================================
// Admin
// =============================================================================

/// Storage administration.
#[derive(Clone)]
pub struct StorageAdmin {
    tx: mpsc::Sender<Command>,
}

impl std::fmt::Debug for StorageAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageAdmin").finish_non_exhaustive()
    }
}

impl StorageAdmin {
    pub(crate) fn new(tx: mpsc::Sender<Command>) -> Self {
        Self { tx }
    }

    /// Hard-delete one application's records, optionally only those whose
    /// `context.environment` equals `environment`.
    pub async fn delete_by_application(
        &self,
        application_id: &str,
        environment: Option<&str>,
    ) -> Result<u64, StorageError> {
        let application_id = application_id.to_string();
        let environment = environment.map(str::to_string);
        request(&self.tx, |reply| Command::DeleteByApplication {
            application_id,
            environment,
            reply,
        })
        .await
    }

    /// Delete records with `ts < cutoff`.
    pub async fn delete_older_than(&self, cutoff: f64) -> Result<u64, StorageError> {
        request(&self.tx, |reply| Command::DeleteOlderThan { cutoff, reply }).await
    }

    /// Delete records older than `retention_days` days from now.
    pub async fn apply_retention(&self, retention_days: u32) -> Result<u64, StorageError> {
        let cutoff = retention_cutoff(retention_days);
        let deleted = self.delete_older_than(cutoff).await?;
        tracing::debug!(deleted, retention_days, cutoff, "Retention applied");
        Ok(deleted)
    }

    pub async fn shutdown(&self) -> Result<(), StorageError> {
        self.tx
            .send(Command::Shutdown)
            .await
            .map_err(|_| StorageError::ChannelSend)
    }
}
