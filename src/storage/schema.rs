//! Database schema definitions.

use crate::storage::StorageError;
use crate::storage::db::SqlitePool;

/// SQL statement for creating the logs table.
///
/// `id` is the insertion sequence and the pagination tie-break.
/// `level_rank` mirrors `level` as an integer so `min_level` is a range scan.
/// `context` holds the open metadata map as a JSON string; new keys never
/// need a migration.
pub const LOGS_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS logs (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    ts             REAL    NOT NULL,
    level          TEXT    NOT NULL,
    level_rank     INTEGER NOT NULL,
    message        TEXT    NOT NULL,
    application_id TEXT    NOT NULL,
    service_name   TEXT,
    module_name    TEXT    NOT NULL,
    file_path      TEXT,
    line_no        INTEGER,
    exception_type TEXT,
    stacktrace     TEXT,
    context        TEXT    NOT NULL DEFAULT '{}'
)
"#;

/// Index backing per-application time-window queries in result order.
pub const LOGS_APP_TS_INDEX_DDL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_logs_app_ts ON logs (application_id, ts DESC, id DESC)
"#;

/// Index backing cross-application queries and retention sweeps.
pub const LOGS_TS_INDEX_DDL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_logs_ts ON logs (ts)
"#;

/// Initialize the database schema.
///
/// Creates the logs table and its indexes if they don't exist.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), StorageError> {
    for ddl in [LOGS_TABLE_DDL, LOGS_APP_TS_INDEX_DDL, LOGS_TS_INDEX_DDL] {
        sqlx::query(ddl).execute(pool.inner()).await?;
    }
    tracing::debug!("Schema initialized");
    Ok(())
}
