//! Batch delivery to the ingestion endpoint.
//!
//! One POST per batch with a bounded timeout. No retries: the caller decides
//! what happens to a batch that failed to send.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::model::LogBatch;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("daemon at {url} answered {status}")]
    Status { status: u16, url: String },
}

/// Delivers one batch. Implementations must be callable from the queue's
/// background thread.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, batch: &LogBatch) -> Result<(), TransportError>;
}

impl<T: Transport> Transport for Arc<T> {
    fn send(&self, batch: &LogBatch) -> Result<(), TransportError> {
        (**self).send(batch)
    }
}

/// JSON-over-HTTP transport built on a blocking reqwest client.
///
/// The client is created on the first [`Transport::send`], which runs on the
/// queue's worker thread. A blocking client must not be built inside an
/// async runtime, and `new` is typically called from one.
#[derive(Clone)]
pub struct HttpTransport {
    client: OnceLock<reqwest::blocking::Client>,
    endpoint: Url,
    timeout: Duration,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint.as_str())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    pub fn new(endpoint: Url, timeout: Duration) -> Self {
        Self {
            client: OnceLock::new(),
            endpoint,
            timeout,
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn client(&self) -> Result<&reqwest::blocking::Client, TransportError> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .build()?;
        Ok(self.client.get_or_init(|| client))
    }
}

impl Transport for HttpTransport {
    fn send(&self, batch: &LogBatch) -> Result<(), TransportError> {
        if batch.is_empty() {
            return Ok(());
        }

        let response = self
            .client()?
            .post(self.endpoint.clone())
            .json(batch)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                url: self.endpoint.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LogLevel, LogRecord};
    use mockito::Matcher;
    use serde_json::json;

    fn batch() -> LogBatch {
        LogBatch::new(
            "app",
            vec![LogRecord::new(1.5, LogLevel::Warn, "hello", "app", "main")],
        )
    }

    #[test]
    fn test_send_posts_json_batch() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/logs/ingest")
            .match_header("content-type", "application/json")
            .match_body(Matcher::AllOf(vec![
                Matcher::PartialJson(json!({"application_id": "app"})),
                Matcher::Regex(r#""level":"WARN""#.to_string()),
                Matcher::Regex(r#""message":"hello""#.to_string()),
            ]))
            .with_status(202)
            .with_body(r#"{"accepted":1}"#)
            .create();

        let endpoint = Url::parse(&format!("{}/logs/ingest", server.url())).unwrap();
        let transport = HttpTransport::new(endpoint, Duration::from_secs(1));
        transport.send(&batch()).unwrap();

        mock.assert();
    }

    #[test]
    fn test_send_reports_error_status() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/logs/ingest")
            .with_status(500)
            .create();

        let endpoint = Url::parse(&format!("{}/logs/ingest", server.url())).unwrap();
        let transport = HttpTransport::new(endpoint, Duration::from_secs(1));
        let err = transport.send(&batch()).unwrap_err();
        assert!(matches!(err, TransportError::Status { status: 500, .. }));

        mock.assert();
    }

    #[test]
    fn test_send_reports_connection_failure() {
        let endpoint = Url::parse("http://127.0.0.1:1/logs/ingest").unwrap();
        let transport = HttpTransport::new(endpoint, Duration::from_millis(200));
        assert!(matches!(
            transport.send(&batch()),
            Err(TransportError::Request(_))
        ));
    }

    #[tokio::test]
    async fn test_new_inside_runtime_defers_client() {
        let endpoint = Url::parse("http://127.0.0.1:1/logs/ingest").unwrap();
        let transport = HttpTransport::new(endpoint, Duration::from_millis(200));
        assert!(transport.client.get().is_none());

        let sent = tokio::task::spawn_blocking(move || {
            let result = transport.send(&batch());
            (result.is_err(), transport.client.get().is_some())
        })
        .await
        .unwrap();
        assert_eq!(sent, (true, true));
    }

    #[test]
    fn test_empty_batch_is_not_sent() {
        let endpoint = Url::parse("http://127.0.0.1:1/logs/ingest").unwrap();
        let transport = HttpTransport::new(endpoint, Duration::from_millis(200));
        transport.send(&LogBatch::new("app", Vec::new())).unwrap();
    }
}
