//! Writer actor with an MPSC command channel.
//!
//! Single-writer pattern: one tokio task performs every mutation of the
//! `logs` table, in the order commands arrive. Each command carries a
//! oneshot reply so callers observe the outcome of their own write.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::model::LogRecord;
use crate::storage::StorageError;
use crate::storage::db::SqlitePool;

// =============================================================================
// Commands
// =============================================================================

pub(crate) type Reply<T> = oneshot::Sender<Result<T, StorageError>>;

/// Commands sent to the writer actor.
#[derive(Debug)]
pub enum Command {
    /// Insert every record in one transaction; replies with the row count.
    WriteBatch {
        records: Vec<LogRecord>,
        reply: Reply<u64>,
    },
    /// Delete one application's records, optionally scoped to an environment.
    DeleteByApplication {
        application_id: String,
        environment: Option<String>,
        reply: Reply<u64>,
    },
    /// Delete records with `ts` strictly below the cutoff.
    DeleteOlderThan { cutoff: f64, reply: Reply<u64> },
    /// Graceful shutdown.
    Shutdown,
}

// =============================================================================
// Actor
// =============================================================================

/// Database writer actor.
pub struct DbActor {
    pool: SqlitePool,
    rx: mpsc::Receiver<Command>,
}

impl DbActor {
    /// Spawn the writer task.
    ///
    /// Returns the task handle and the command sender.
    pub fn spawn(
        pool: SqlitePool,
        channel_capacity: usize,
    ) -> (JoinHandle<()>, mpsc::Sender<Command>) {
        let (tx, rx) = mpsc::channel(channel_capacity.max(1));
        let actor = DbActor { pool, rx };
        let handle = tokio::spawn(actor.run());
        (handle, tx)
    }

    async fn run(mut self) {
        tracing::info!("DbActor started");

        while let Some(cmd) = self.rx.recv().await {
            if self.handle_command(cmd).await {
                break;
            }
        }

        tracing::info!("DbActor stopped");
    }

    async fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::WriteBatch { records, reply } => {
                let result = self.insert_batch(&records).await;
                if let Err(e) = &result {
                    tracing::error!(error = %e, count = records.len(), "Batch insert failed");
                }
                let _ = reply.send(result);
            }
            Command::DeleteByApplication {
                application_id,
                environment,
                reply,
            } => {
                let result = self
                    .delete_by_application(&application_id, environment.as_deref())
                    .await;
                if let Err(e) = &result {
                    tracing::error!(error = %e, %application_id, "Delete by application failed");
                }
                let _ = reply.send(result);
            }
            Command::DeleteOlderThan { cutoff, reply } => {
                let result = self.delete_older_than(cutoff).await;
                if let Err(e) = &result {
                    tracing::error!(error = %e, cutoff, "Retention delete failed");
                }
                let _ = reply.send(result);
            }
            Command::Shutdown => {
                tracing::info!("DbActor shutting down");
                return true;
            }
        }
        false
    }

    // =========================================================================
    // Insert Operations
    // =========================================================================

    async fn insert_batch(&self, records: &[LogRecord]) -> Result<u64, StorageError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.inner().begin().await?;
        let mut inserted = 0u64;

        for r in records {
            let context_json = serde_json::to_string(&r.context)?;
            let result = sqlx::query(
                "INSERT INTO logs (ts, level, level_rank, message, application_id, service_name,
                                   module_name, file_path, line_no, exception_type, stacktrace, context)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(r.ts)
            .bind(r.level.to_string())
            .bind(r.level.rank())
            .bind(&r.message)
            .bind(&r.application_id)
            .bind(r.service_name.as_deref())
            .bind(&r.module_name)
            .bind(r.file_path.as_deref())
            .bind(r.line_no)
            .bind(r.exception_type.as_deref())
            .bind(r.stacktrace.as_deref())
            .bind(context_json)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        tracing::debug!(count = inserted, "Log batch inserted");
        Ok(inserted)
    }

    // =========================================================================
    // Delete Operations
    // =========================================================================

    async fn delete_by_application(
        &self,
        application_id: &str,
        environment: Option<&str>,
    ) -> Result<u64, StorageError> {
        let result = match environment {
            Some(env) => {
                sqlx::query(
                    "DELETE FROM logs WHERE application_id = ?
                     AND json_extract(context, '$.environment') = ?",
                )
                .bind(application_id)
                .bind(env)
                .execute(self.pool.inner())
                .await?
            }
            None => {
                sqlx::query("DELETE FROM logs WHERE application_id = ?")
                    .bind(application_id)
                    .execute(self.pool.inner())
                    .await?
            }
        };

        let deleted = result.rows_affected();
        tracing::info!(deleted, application_id, environment, "Application logs deleted");
        Ok(deleted)
    }

    async fn delete_older_than(&self, cutoff: f64) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM logs WHERE ts < ?")
            .bind(cutoff)
            .execute(self.pool.inner())
            .await?;
        let deleted = result.rows_affected();
        tracing::info!(deleted, cutoff, "Expired logs deleted");
        Ok(deleted)
    }
}
