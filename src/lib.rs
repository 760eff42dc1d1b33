//! Loghound - Structured Log Ingestion Library
//!
//! This crate provides both halves of the loghound pipeline. It can be used as
//! a library by instrumented Rust applications, or run as a standalone daemon
//! with the `loghound` executable.
//!
//! # Architecture
//!
//! - **Client**: a `tracing` layer that enriches events into [`LogRecord`]s and
//!   ships them in batches through a bounded, lossy background queue
//! - **Server**: HTTP ingestion and query endpoints (axum)
//! - **Storage**: SQLite persistence with a single writer task, filtered
//!   keyset-paginated queries and retention
//! - **Housekeeping**: scheduled retention sweeps
//!
//! # Example
//!
//! ```rust,ignore
//! use loghound::{StorageBuilder, model::{LogBatch, LogLevel, LogRecord}, storage::LogQuery};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let handles = StorageBuilder::new("sqlite::memory:").build().await?;
//!     let record = LogRecord::new(1767149043.0, LogLevel::Error, "boom", "app-1", "worker");
//!     handles.writer.write_batch(LogBatch::new("app-1", vec![record])).await?;
//!
//!     let page = handles.reader.query(&LogQuery::new(0.0, 2e9).with_application("app-1")).await?;
//!     assert_eq!(page.len(), 1);
//!     handles.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod housekeeping;
pub mod model;
pub mod server;
pub mod storage;
pub mod timeparse;

pub use model::{LogBatch, LogLevel, LogRecord, StoredLog};
pub use storage::{StorageBuilder, StorageHandles};
