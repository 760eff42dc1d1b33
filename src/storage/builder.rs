//! Storage builder and handles.
//!
//! Provides a builder pattern for constructing the storage layer
//! and a handles struct for accessing all storage facades.

use std::path::Path;

use tokio::task::JoinHandle;

use crate::storage::StorageError;
use crate::storage::actor::DbActor;
use crate::storage::db::SqlitePool;
use crate::storage::schema::init_schema;
use crate::storage::{LogReader, LogWriter, StorageAdmin};

/// Default channel capacity for writer commands.
///
/// Each command is a whole batch, so this bounds in-flight batches rather
/// than records.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Builder for constructing the storage layer.
pub struct StorageBuilder {
    url: String,
    channel_capacity: usize,
}

impl StorageBuilder {
    /// Create a new storage builder.
    ///
    /// `url` is a sqlx SQLite URL (`sqlite:logs.db`, `sqlite::memory:`) or a
    /// plain file path.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Set the channel capacity for writer commands.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Build the storage layer and return handles.
    pub async fn build(self) -> Result<StorageHandles, StorageError> {
        ensure_parent_dir(&self.url)?;

        let pool = SqlitePool::connect(&self.url).await?;
        init_schema(&pool).await?;

        let (actor_handle, tx) = DbActor::spawn(pool.clone(), self.channel_capacity);
        tracing::info!(url = %self.url, "Storage ready");

        Ok(StorageHandles {
            writer: LogWriter::new(tx.clone()),
            reader: LogReader::new(pool.clone()),
            admin: StorageAdmin::new(tx),
            pool,
            actor_handle: Some(actor_handle),
        })
    }
}

/// Create the database file's parent directory when it is missing.
fn ensure_parent_dir(url: &str) -> Result<(), StorageError> {
    if crate::storage::db::is_memory_url(url) {
        return Ok(());
    }
    let path = url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or_default();

    if let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            StorageError::Internal(format!(
                "Failed to create database directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }
    Ok(())
}

/// Handles to all storage layer facades.
pub struct StorageHandles {
    /// Batch writer.
    pub writer: LogWriter,
    /// Query facade.
    pub reader: LogReader,
    /// Deletion, retention and shutdown.
    pub admin: StorageAdmin,
    pool: SqlitePool,
    /// Writer task; it also exits on its own once every sender is dropped.
    actor_handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for StorageHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageHandles").finish_non_exhaustive()
    }
}

impl StorageHandles {
    /// Gracefully shutdown the storage layer.
    ///
    /// Sends shutdown command to the writer actor, waits for it to drain
    /// everything queued before it, then closes the pool.
    pub async fn shutdown(mut self) -> Result<(), StorageError> {
        self.admin.shutdown().await?;

        if let Some(handle) = self.actor_handle.take() {
            handle
                .await
                .map_err(|e| StorageError::Internal(format!("Failed to join writer task: {e}")))?;
        }

        self.pool.close().await;
        Ok(())
    }
}
