//! Elasticsearch sink tests against an in-process bulk endpoint.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use batch_core::{Batch, LogLevel, LogRecord, ManualClock};
use bulk_sink::{BulkSink, ElasticsearchConfig, ElasticsearchSink};
use integration_tests::{fixtures, mocks::RecordingDiagnostics};
use parking_lot::Mutex;
use pipeline::{Ingestor, PipelineConfig, SessionDefaults};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// What the fake cluster received and how it should answer.
#[derive(Clone, Default)]
struct FakeCluster {
    bulk_bodies: Arc<Mutex<Vec<String>>>,
    settings: Arc<Mutex<Vec<(String, Value)>>>,
    reject_items: Arc<Mutex<bool>>,
    fail_status: Arc<Mutex<Option<StatusCode>>>,
}

impl FakeCluster {
    fn bulk_bodies(&self) -> Vec<String> {
        self.bulk_bodies.lock().clone()
    }

    fn settings(&self) -> Vec<(String, Value)> {
        self.settings.lock().clone()
    }
}

async fn bulk(State(cluster): State<FakeCluster>, body: Bytes) -> (StatusCode, Json<Value>) {
    let text = String::from_utf8_lossy(&body).into_owned();
    let documents = text.lines().count() / 2;
    cluster.bulk_bodies.lock().push(text);

    if let Some(status) = *cluster.fail_status.lock() {
        return (status, Json(json!({"error": "cluster_block_exception"})));
    }

    if *cluster.reject_items.lock() {
        let items: Vec<Value> = (0..documents)
            .map(|_| {
                json!({"index": {"status": 400, "error": {
                    "type": "mapper_parsing_exception",
                    "reason": "failed to parse field [@timestamp]"
                }}})
            })
            .collect();
        return (StatusCode::OK, Json(json!({"took": 1, "errors": true, "items": items})));
    }

    let items: Vec<Value> = (0..documents)
        .map(|_| json!({"index": {"status": 201}}))
        .collect();
    (StatusCode::OK, Json(json!({"took": 1, "errors": false, "items": items})))
}

async fn index_settings(
    State(cluster): State<FakeCluster>,
    Path(index): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    cluster.settings.lock().push((index, body));
    Json(json!({"acknowledged": true}))
}

async fn root() -> Json<Value> {
    Json(json!({"cluster_name": "fake"}))
}

/// Serves the fake cluster on an ephemeral port and returns its base URL.
async fn start_cluster(cluster: FakeCluster) -> String {
    let app = Router::new()
        .route("/", get(root))
        .route("/_bulk", post(bulk))
        .route("/:index/_settings", put(index_settings))
        .with_state(cluster);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake cluster");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    format!("http://{}", addr)
}

fn sink(url: String, lifecycle_policy: Option<&str>) -> ElasticsearchSink {
    let config = ElasticsearchConfig {
        url,
        lifecycle_policy: lifecycle_policy.map(str::to_string),
        ..ElasticsearchConfig::default()
    };
    ElasticsearchSink::new(config, Duration::from_secs(5)).expect("valid sink config")
}

fn batch(session_key: &str, messages: &[&str]) -> Batch {
    let mut batch = Batch::empty(session_key);
    for message in messages {
        batch.records.push(LogRecord::new(
            *message,
            LogLevel::Information,
            fixtures::start_time(),
        ));
    }
    batch
}

#[tokio::test]
async fn test_push_sends_routed_ndjson() {
    let cluster = FakeCluster::default();
    let sink = sink(start_cluster(cluster.clone()).await, None);

    let receipt = sink
        .push(&batch("sess-42", &["a", "b", "c"]), "app-logs")
        .await
        .unwrap();
    assert_eq!(receipt.records, 3);

    let bodies = cluster.bulk_bodies();
    assert_eq!(bodies.len(), 1);
    let lines: Vec<Value> = bodies[0]
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 6);

    for pair in lines.chunks(2) {
        assert_eq!(pair[0]["index"]["_index"], "app-logs");
        assert_eq!(pair[0]["index"]["routing"], "sess-42");
        assert_eq!(pair[1]["sessionId"], "sess-42");
    }
    assert_eq!(lines[1]["message"], "a");
    assert_eq!(lines[5]["message"], "c");
}

#[tokio::test]
async fn test_item_errors_reject_the_batch() {
    let cluster = FakeCluster::default();
    *cluster.reject_items.lock() = true;
    let sink = sink(start_cluster(cluster.clone()).await, None);

    let err = sink.push(&batch("s", &["x", "y"]), "logs").await.unwrap_err();
    assert_eq!(err.error_code(), Some("SINK_001"));
    assert!(err.to_string().contains("mapper_parsing_exception"));
}

#[tokio::test]
async fn test_error_status_rejects_the_batch() {
    let cluster = FakeCluster::default();
    *cluster.fail_status.lock() = Some(StatusCode::INTERNAL_SERVER_ERROR);
    let sink = sink(start_cluster(cluster.clone()).await, None);

    let err = sink.push(&batch("s", &["x"]), "logs").await.unwrap_err();
    assert_eq!(err.error_code(), Some("SINK_001"));
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn test_unreachable_cluster() {
    // Bind then drop to get a port nobody listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let sink = sink(format!("http://{}", addr), None);
    let err = sink.push(&batch("s", &["x"]), "logs").await.unwrap_err();
    assert_eq!(err.error_code(), Some("SINK_002"));
    assert!(!sink.ping().await);
}

#[tokio::test]
async fn test_empty_batch_is_not_sent() {
    let cluster = FakeCluster::default();
    let sink = sink(start_cluster(cluster.clone()).await, None);

    let receipt = sink.push(&Batch::empty("s"), "logs").await.unwrap();
    assert_eq!(receipt.records, 0);
    assert!(cluster.bulk_bodies().is_empty());
}

#[tokio::test]
async fn test_lifecycle_policy_applied_once_per_target() {
    let cluster = FakeCluster::default();
    let sink = sink(start_cluster(cluster.clone()).await, Some("logs-30d"));
    assert!(sink.ping().await);

    sink.push(&batch("s", &["1"]), "alpha").await.unwrap();
    sink.push(&batch("s", &["2"]), "alpha").await.unwrap();
    sink.push(&batch("s", &["3"]), "beta").await.unwrap();

    let settings = cluster.settings();
    let targets: Vec<&str> = settings.iter().map(|(index, _)| index.as_str()).collect();
    assert_eq!(targets, vec!["alpha", "beta"]);
    assert_eq!(settings[0].1["index"]["lifecycle"]["name"], "logs-30d");
    assert_eq!(cluster.bulk_bodies().len(), 3);
}

/// Records go from ingestion through the flush path into the bulk body.
#[tokio::test]
async fn test_ingestor_flushes_into_cluster() {
    let cluster = FakeCluster::default();
    let url = start_cluster(cluster.clone()).await;

    let config = PipelineConfig {
        default_session: SessionDefaults {
            flush_count: 2,
            flush_after_secs: 0,
            sink_target: "session-logs".to_string(),
            ..SessionDefaults::default()
        },
        ..PipelineConfig::default()
    };
    let diagnostics = RecordingDiagnostics::new();
    let ingestor = Ingestor::from_config(
        &config,
        Arc::new(sink(url, None)),
        None,
        Arc::new(diagnostics.clone()),
        Arc::new(ManualClock::new(fixtures::start_time())),
    )
    .unwrap();

    for record in fixtures::records("e2e", 4) {
        ingestor.ingest(record).await.unwrap();
    }

    let bodies = cluster.bulk_bodies();
    assert_eq!(bodies.len(), 2);
    let documents: Vec<Value> = bodies
        .iter()
        .flat_map(|body| body.lines().skip(1).step_by(2))
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let messages: Vec<&str> = documents
        .iter()
        .map(|doc| doc["message"].as_str().unwrap())
        .collect();
    assert_eq!(messages, vec!["m0", "m1", "m2", "m3"]);
    assert!(diagnostics.reports().is_empty());
}
