//! Database connection layer.
//!
//! The log store runs on SQLite through sqlx. The wrapper keeps pool tuning
//! (WAL, synchronous mode, in-memory handling) in one place so the writer
//! actor and the readers always share an identically configured pool.
//!
//! # Example
//!
//! ```ignore
//! let pool = SqlitePool::connect("sqlite:data/loghound.db").await?;
//! let row = sqlx::query("SELECT 1").fetch_one(pool.inner()).await?;
//! ```

mod sqlite;

pub use sqlite::SqlitePool;
pub(crate) use sqlite::is_memory_url;
