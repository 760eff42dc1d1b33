//! Storage Layer
//!
//! SQLite storage with async read/write separation:
//! - **Writer**: one tokio task owns every mutation, fed by an mpsc channel
//! - **Reader**: connection pool for concurrent time-range queries
//!
//! # Components
//!
//! - [`LogWriter`]: batch appends through the writer task
//! - [`LogReader`]: filtered, cursor-paginated queries ([`LogQuery`] → [`LogPage`])
//! - [`StorageAdmin`]: scoped deletion and retention sweeps
//! - [`StorageBuilder`] / [`StorageHandles`]: initialization and lifecycle management

mod actor;
mod builder;
pub mod cursor;
pub mod db;
mod error;
mod facades;
pub mod query;
pub mod retention;
mod schema;

pub use builder::{DEFAULT_CHANNEL_CAPACITY, StorageBuilder, StorageHandles};
pub use cursor::{CursorError, CursorPosition};
pub use error::StorageError;
pub use facades::{LogReader, LogWriter, StorageAdmin};
pub use query::{
    DEFAULT_QUERY_LIMIT, LogPage, LogQuery, MAX_PATTERN_LEN, MAX_QUERY_LIMIT, QueryError,
};
pub use retention::{normalize_retention_days, retention_cutoff};
