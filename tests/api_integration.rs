//! API Integration Tests for Loghound
//!
//! Drives the HTTP surface over a real socket, and the producer client
//! end to end against a running daemon.

use std::sync::Arc;
use std::time::{Duration, Instant};

use loghound::client::{HttpTransport, LogForwardLayer, ProducerQueue};
use loghound::model::unix_now;
use loghound::server::{AppState, ServiceInfo, create_router};
use loghound::{LogBatch, LogLevel, LogRecord, StorageBuilder, StorageHandles};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tracing_subscriber::layer::SubscriberExt;

// =============================================================================
// Test Helpers
// =============================================================================

/// Create test app state with in-memory database.
async fn create_test_state() -> (AppState, StorageHandles) {
    let handles = StorageBuilder::new("sqlite::memory:")
        .channel_capacity(100)
        .build()
        .await
        .expect("Failed to build storage");

    let state = AppState::new(&handles, ServiceInfo::new("127.0.0.1", 0, 7));
    (state, handles)
}

/// Start test server and return base URL.
async fn start_test_server() -> (String, StorageHandles) {
    let (state, handles) = create_test_state().await;
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let addr = listener.local_addr().expect("Failed to get local addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    // Give server time to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("http://{}", addr), handles)
}

async fn ingest(client: &reqwest::Client, base_url: &str, batch: &LogBatch) -> Value {
    let resp = client
        .post(format!("{}/logs/ingest", base_url))
        .json(batch)
        .send()
        .await
        .expect("Failed to send ingest request");
    assert_eq!(resp.status(), 202);
    resp.json().await.expect("Failed to parse ingest response")
}

async fn query(client: &reqwest::Client, base_url: &str, params: &[(&str, String)]) -> (u16, Value) {
    let resp = client
        .get(format!("{}/logs/query", base_url))
        .query(params)
        .send()
        .await
        .expect("Failed to send query request");
    let status = resp.status().as_u16();
    let body = resp.json().await.unwrap_or(Value::Null);
    (status, body)
}

// =============================================================================
// Health Probe Tests
// =============================================================================

#[tokio::test]
async fn test_health_probes_and_status() {
    let (base_url, handles) = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/healthz", base_url))
        .send()
        .await
        .expect("Failed to send healthz request");
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.expect("Failed to parse healthz response");
    assert_eq!(body["status"], "ok");

    let resp = client
        .get(format!("{}/readyz", base_url))
        .send()
        .await
        .expect("Failed to send readyz request");
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.expect("Failed to parse readyz response");
    assert_eq!(body["db"], "ready");

    let resp = client
        .get(format!("{}/status", base_url))
        .send()
        .await
        .expect("Failed to send status request");
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.expect("Failed to parse status response");
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

    handles.shutdown().await.unwrap();
}

// =============================================================================
// Ingest + Query Tests
// =============================================================================

#[tokio::test]
async fn test_min_level_scenario() {
    let (base_url, handles) = start_test_server().await;
    let client = reqwest::Client::new();

    let t = unix_now().floor() - 120.0;
    let batch = LogBatch::new(
        "app-1",
        vec![
            LogRecord::new(t, LogLevel::Debug, "cache warm", "app-1", "cache"),
            LogRecord::new(t + 1.0, LogLevel::Warn, "slow query", "app-1", "db"),
            LogRecord::new(t + 2.0, LogLevel::Error, "connection reset", "app-1", "db")
                .with_exception("ConnectionResetError", "Traceback ...")
                .with_location("db/pool.rs", 88)
                .with_context("request_id", "r-42"),
        ],
    );
    assert_eq!(ingest(&client, &base_url, &batch).await["accepted"], 3);

    let (status, body) = query(
        &client,
        &base_url,
        &[
            ("start_ts", t.to_string()),
            ("end_ts", (t + 2.0).to_string()),
            ("application_id", "app-1".to_string()),
            ("min_level", "WARN".to_string()),
        ],
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["count"], 2);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results[0]["level"], "ERROR");
    assert_eq!(results[0]["exception_type"], "ConnectionResetError");
    assert_eq!(results[0]["line_no"], 88);
    assert_eq!(results[0]["context"]["request_id"], "r-42");
    assert_eq!(results[1]["level"], "WARN");

    // Zero-width window still returns the exact record.
    let (_, body) = query(
        &client,
        &base_url,
        &[
            ("start_ts", (t + 1.0).to_string()),
            ("end_ts", (t + 1.0).to_string()),
            ("application_id", "app-1".to_string()),
        ],
    )
    .await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["message"], "slow query");

    handles.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_warning_alias_is_normalized() {
    let (base_url, handles) = start_test_server().await;
    let client = reqwest::Client::new();

    let t = unix_now().floor() - 30.0;
    let resp = client
        .post(format!("{}/logs/ingest", base_url))
        .json(&json!({
            "application_id": "app-w",
            "logs": [{"ts": t, "level": "warning", "message": "disk 91%",
                      "application_id": "app-w", "module_name": "disk"}]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);

    let (_, body) = query(
        &client,
        &base_url,
        &[("since", "5m".to_string()), ("application_id", "app-w".to_string())],
    )
    .await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["level"], "WARN");

    handles.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_pagination_is_lossless_with_timestamp_ties() {
    let (base_url, handles) = start_test_server().await;
    let client = reqwest::Client::new();

    let t = unix_now().floor() - 600.0;
    // 23 records; every group of three shares a timestamp.
    let logs: Vec<LogRecord> = (0..23)
        .map(|i| {
            LogRecord::new(
                t + f64::from(i / 3),
                LogLevel::Info,
                format!("event {i}"),
                "app-p",
                "pager",
            )
        })
        .collect();
    ingest(&client, &base_url, &LogBatch::new("app-p", logs)).await;

    let window = [
        ("start_ts", t.to_string()),
        ("end_ts", (t + 100.0).to_string()),
        ("application_id", "app-p".to_string()),
    ];

    let (_, all) = query(
        &client,
        &base_url,
        &[&window[..], &[("limit", "1000".to_string())]].concat(),
    )
    .await;
    let expected: Vec<Value> = all["results"].as_array().unwrap().clone();
    assert_eq!(expected.len(), 23);

    let mut collected = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0;
    loop {
        let mut params = window.to_vec();
        params.push(("limit", "5".to_string()));
        if let Some(c) = &cursor {
            params.push(("cursor", c.clone()));
        }
        let (status, body) = query(&client, &base_url, &params).await;
        assert_eq!(status, 200);
        pages += 1;
        collected.extend(body["results"].as_array().unwrap().iter().cloned());
        if body["has_more"] == false {
            assert_eq!(body["next_cursor"], Value::Null);
            break;
        }
        cursor = Some(body["next_cursor"].as_str().unwrap().to_string());
    }

    assert_eq!(pages, 5);
    assert_eq!(collected, expected);

    handles.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_message_filters() {
    let (base_url, handles) = start_test_server().await;
    let client = reqwest::Client::new();

    let t = unix_now().floor() - 60.0;
    let batch = LogBatch::new(
        "app-m",
        vec![
            LogRecord::new(t, LogLevel::Info, "User 17 logged in", "app-m", "auth")
                .with_service_name("web"),
            LogRecord::new(t + 1.0, LogLevel::Info, "user 18 LOGGED OUT", "app-m", "auth")
                .with_service_name("web"),
            LogRecord::new(t + 2.0, LogLevel::Error, "payment 991 declined", "app-m", "billing")
                .with_service_name("payments"),
        ],
    );
    ingest(&client, &base_url, &batch).await;

    let base = [
        ("since", "10m".to_string()),
        ("application_id", "app-m".to_string()),
    ];

    let (_, body) = query(
        &client,
        &base_url,
        &[&base[..], &[("message_contains", "logged".to_string())]].concat(),
    )
    .await;
    assert_eq!(body["count"], 2);

    let (_, body) = query(
        &client,
        &base_url,
        &[&base[..], &[("message_regex", r"^\w+ \d{3} ".to_string())]].concat(),
    )
    .await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["module_name"], "billing");

    let (_, body) = query(
        &client,
        &base_url,
        &[&base[..], &[("module_name", "billing,auth".to_string())]].concat(),
    )
    .await;
    assert_eq!(body["count"], 3);

    let (_, body) = query(
        &client,
        &base_url,
        &[&base[..], &[("service_name", "payments".to_string())]].concat(),
    )
    .await;
    assert_eq!(body["count"], 1);

    handles.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_query_error_responses() {
    let (base_url, handles) = start_test_server().await;
    let client = reqwest::Client::new();

    let cases: Vec<(Vec<(&str, String)>, u16, &str)> = vec![
        (
            vec![("message_contains", "a".into()), ("message_regex", "a".into())],
            400,
            "INVALID_PARAMS",
        ),
        (vec![("min_level", "VERBOSE".into())], 400, "INVALID_LEVEL"),
        (vec![("message_regex", "[a-".into())], 400, "INVALID_PATTERN"),
        (vec![("message_regex", "x".repeat(501))], 400, "INVALID_PATTERN"),
        (vec![("cursor", "%%%garbage".into())], 400, "INVALID_CURSOR"),
        (vec![("until", "not-a-time".into())], 400, "INVALID_TIME_FORMAT"),
        (
            vec![("since", "1h".into()), ("until", "2h".into())],
            400,
            "INVALID_TIME_RANGE",
        ),
        (vec![("limit", "1001".into())], 422, "VALIDATION_ERROR"),
    ];

    for (params, status, code) in cases {
        let (got_status, body) = query(&client, &base_url, &params).await;
        assert_eq!(got_status, status, "{params:?}");
        assert_eq!(body["detail"]["code"], code, "{params:?}");
    }

    let resp = client
        .post(format!("{}/logs/ingest", base_url))
        .json(&json!({"logs": []}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 422);

    handles.shutdown().await.unwrap();
}

// =============================================================================
// Clear Tests
// =============================================================================

#[tokio::test]
async fn test_clear_by_application_and_environment() {
    let (base_url, handles) = start_test_server().await;
    let client = reqwest::Client::new();

    let t = unix_now().floor() - 60.0;
    for app in ["app-1", "app-2"] {
        let batch = LogBatch::new(
            app,
            vec![
                LogRecord::new(t, LogLevel::Info, "a", app, "m").with_context("environment", "staging"),
                LogRecord::new(t + 1.0, LogLevel::Info, "b", app, "m").with_context("environment", "prod"),
            ],
        );
        ingest(&client, &base_url, &batch).await;
    }

    let resp = client
        .post(format!("{}/logs/clear?application_id=app-1&environment=staging", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["deleted"], 1);

    let resp = client
        .post(format!("{}/logs/clear?application_id=app-1", base_url))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["deleted"], 1);

    let resp = client
        .post(format!("{}/logs/clear", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 422);

    assert_eq!(handles.reader.count(Some("app-1")).await.unwrap(), 0);
    assert_eq!(handles.reader.count(Some("app-2")).await.unwrap(), 2);

    handles.shutdown().await.unwrap();
}

// =============================================================================
// Producer End-to-End
// =============================================================================

#[test]
fn test_producer_layer_delivers_to_daemon() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (base_url, handles) = rt.block_on(start_test_server());

    let endpoint = url::Url::parse(&format!("{}/logs/ingest", base_url)).unwrap();
    let transport = HttpTransport::new(endpoint, Duration::from_secs(2));
    let queue = Arc::new(ProducerQueue::new(transport, "e2e-app", 100, 10));
    queue.start().unwrap();
    let layer = LogForwardLayer::new(Arc::clone(&queue), "e2e-app", Some("checkout".to_string()));

    let subscriber = tracing_subscriber::registry().with(layer);
    tracing::subscriber::with_default(subscriber, || {
        for i in 0..15 {
            tracing::info!(target: "checkout::cart", item = i, "item added");
        }
        tracing::error!(target: "checkout::pay", "card declined");
    });

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut stored = 0;
    while Instant::now() < deadline {
        stored = rt.block_on(handles.reader.count(Some("e2e-app"))).unwrap();
        if stored == 16 {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    assert_eq!(stored, 16);
    assert!(queue.stop());
    assert_eq!(queue.dropped_records(), 0);

    let page = rt
        .block_on(
            handles.reader.query(
                &loghound::storage::LogQuery::new(0.0, unix_now() + 1.0)
                    .with_application("e2e-app")
                    .with_min_level(LogLevel::Error),
            ),
        )
        .unwrap();
    assert_eq!(page.len(), 1);
    let record = &page.records[0].record;
    assert_eq!(record.message, "card declined");
    assert_eq!(record.module_name, "checkout::pay");
    assert_eq!(record.service_name.as_deref(), Some("checkout"));
    assert!(record.file_path.is_some());

    rt.block_on(handles.shutdown()).unwrap();
}
