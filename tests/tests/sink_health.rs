//! Sink health as seen by the status endpoints.
//!
//! Kept in its own test binary: health is process-wide and the other sink
//! tests would flip it concurrently.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use batch_core::{Batch, LogLevel, LogRecord};
use bulk_sink::{BulkSink, ElasticsearchConfig, ElasticsearchSink};
use integration_tests::fixtures;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use telemetry::health;

async fn bulk(State(status): State<Arc<Mutex<StatusCode>>>) -> (StatusCode, Json<Value>) {
    let status = *status.lock();
    if status.is_success() {
        let items = vec![json!({"index": {"status": 201}})];
        (status, Json(json!({"took": 1, "errors": false, "items": items})))
    } else {
        (status, Json(json!({"error": "cluster_block_exception"})))
    }
}

#[tokio::test]
async fn test_rejected_bulk_request_marks_sink_unhealthy() {
    let status = Arc::new(Mutex::new(StatusCode::SERVICE_UNAVAILABLE));
    let app = Router::new()
        .route("/_bulk", post(bulk))
        .with_state(status.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    let sink = ElasticsearchSink::new(
        ElasticsearchConfig {
            url: format!("http://{}", addr),
            ..ElasticsearchConfig::default()
        },
        Duration::from_secs(5),
    )
    .unwrap();

    let mut batch = Batch::empty("s");
    batch
        .records
        .push(LogRecord::new("a", LogLevel::Information, fixtures::start_time()));

    health().sink.set_healthy();
    let err = sink.push(&batch, "logs").await.unwrap_err();
    assert_eq!(err.error_code(), Some("SINK_001"));

    let report = health().sink.report();
    assert!(!report.healthy);
    assert!(report.detail.unwrap().contains("503"));

    *status.lock() = StatusCode::OK;
    sink.push(&batch, "logs").await.unwrap();
    assert!(health().sink.is_healthy());
}
