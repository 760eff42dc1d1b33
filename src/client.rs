//! Producer client
//!
//! Ships an application's `tracing` events to a loghound daemon:
//!
//! ```text
//! tracing event → LogForwardLayer → ProducerQueue → HttpTransport → POST /logs/ingest
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use tracing_subscriber::prelude::*;
//!
//! let config = loghound::client::ClientConfig::from_env()?;
//! let forward = loghound::client::layer(config)?;
//! tracing_subscriber::registry()
//!     .with(tracing_subscriber::fmt::layer())
//!     .with(forward)
//!     .init();
//! ```
//!
//! Delivery is at-most-once: records are dropped when the buffer is full and
//! batches are discarded when the daemon cannot be reached.

pub mod config;
pub mod layer;
pub mod queue;
pub mod transport;

use std::sync::Arc;

use thiserror::Error;

pub use config::ClientConfig;
pub use layer::LogForwardLayer;
pub use queue::{ProducerQueue, QueueError};
pub use transport::{HttpTransport, Transport, TransportError};

/// Errors raised while setting up the producer client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid daemon url '{url}': {reason}")]
    InvalidDaemonUrl { url: String, reason: String },

    #[error("invalid value '{value}' for {name}: {reason}")]
    InvalidSetting {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Build the forwarding layer for `config`, with its queue already started.
///
/// Returns `Ok(None)` when the client is disabled, so callers can add the
/// result to a subscriber unconditionally (`Option<Layer>` is a layer).
pub fn layer(config: ClientConfig) -> Result<Option<LogForwardLayer>, ClientError> {
    if !config.enabled {
        tracing::debug!("Log forwarding disabled");
        return Ok(None);
    }

    let transport = HttpTransport::new(config.daemon_url.clone(), config.http_timeout);
    let queue = Arc::new(ProducerQueue::new(
        transport,
        config.application_id.clone(),
        config.queue_size,
        config.batch_size,
    ));
    queue.start()?;

    tracing::debug!(
        application_id = %config.application_id,
        daemon_url = %config.daemon_url,
        "Log forwarding enabled"
    );
    Ok(Some(LogForwardLayer::new(
        queue,
        config.application_id,
        config.service_name,
    )))
}
