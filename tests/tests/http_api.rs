//! HTTP transport tests.
//!
//! Drive the real router through `axum-test`; everything below the
//! handlers is the production pipeline with a mock sink.

use axum::http::StatusCode;
use axum_test::TestServer;
use integration_tests::{fixtures, setup::TestContext};
use serde_json::{json, Value};

fn server(ctx: &TestContext) -> TestServer {
    TestServer::new(ctx.router.clone()).expect("Failed to create test server")
}

/// POST /logs accepts a record and reports the flush it caused.
#[tokio::test]
async fn test_post_log_accepted() {
    let ctx = TestContext::new(2);
    let server = server(&ctx);

    let response = server.post("/logs").json(&fixtures::log_json("s1", "hello")).await;
    assert_eq!(response.status_code(), StatusCode::ACCEPTED);
    let body: Value = response.json();
    assert_eq!(body["accepted"], true);
    assert_eq!(body["sessionKey"], "s1");
    assert!(body["flushed"].is_null());

    let response = server.post("/logs").json(&fixtures::log_json("s1", "world")).await;
    let body: Value = response.json();
    assert_eq!(body["flushed"], 2);
    assert_eq!(ctx.sink.messages_for("s1"), vec!["hello", "world"]);
}

/// Records may carry their own configuration.
#[tokio::test]
async fn test_post_log_with_carried_configuration() {
    let ctx = TestContext::new(100);
    let server = server(&ctx);

    let payload = json!({
        "sessionKey": "carry",
        "message": "straight through",
        "level": "WARN",
        "configuration": {
            "sessionId": "carry",
            "sinkTarget": "audit",
            "flushCount": 1
        }
    });
    let response = server.post("/logs").json(&payload).await;
    assert_eq!(response.status_code(), StatusCode::ACCEPTED);

    let pushed = ctx.sink.pushed();
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0].target, "audit");
}

/// Rejected records map to 400 with the record error code.
#[tokio::test]
async fn test_post_log_rejections() {
    let ctx = TestContext::new(2);
    let server = server(&ctx);

    let cases = [
        (json!({"message": "no key"}), "RECORD_001"),
        (json!({"sessionKey": "s", "message": "x", "level": "loud"}), "RECORD_004"),
        (json!({"sessionKey": "s", "message": "  "}), "RECORD_005"),
        (
            json!({"sessionKey": "s", "message": "x", "timestamp": "yesterday-ish"}),
            "RECORD_003",
        ),
    ];

    for (payload, code) in cases {
        let response = server.post("/logs").json(&payload).await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST, "{}", payload);
        let body: Value = response.json();
        assert_eq!(body["code"], code, "{}", payload);
        assert!(body["error"].as_str().is_some());
    }
    assert_eq!(ctx.ingestor.volatile_store().session_count(), 0);
}

/// Bodies that are not JSON are rejected before ingestion.
#[tokio::test]
async fn test_post_log_malformed_body() {
    let ctx = TestContext::new(2);
    let server = server(&ctx);

    let response = server
        .post("/logs")
        .content_type("application/json")
        .bytes("{oops".into())
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "RECORD_006");
}

/// Storage outage surfaces as 503 so the producer retries.
#[tokio::test]
async fn test_post_log_storage_unavailable() {
    let ctx = TestContext::new(2);
    ctx.kv.set_fail_reads(true);
    let server = server(&ctx);

    let payload = json!({
        "sessionKey": "d",
        "message": "durable",
        "configuration": {"sessionId": "d", "sinkTarget": "logs", "flushCount": 2, "storageMode": "durable"}
    });
    let response = server.post("/logs").json(&payload).await;
    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json();
    assert_eq!(body["code"], "STORE_001");
}

/// Batch requests report every record individually.
#[tokio::test]
async fn test_post_batch_partial_rejection() {
    let ctx = TestContext::new(3);
    let server = server(&ctx);

    let payload = json!([
        fixtures::log_json("b", "one"),
        {"message": "missing key"},
        fixtures::log_json("b", "two"),
        fixtures::log_json("b", "three"),
    ]);
    let response = server.post("/logs/batch").json(&payload).await;
    assert_eq!(response.status_code(), StatusCode::ACCEPTED);

    let body: Value = response.json();
    assert_eq!(body["accepted"], 3);
    assert_eq!(body["rejected"], 1);
    assert_eq!(body["results"][1]["accepted"], false);
    assert_eq!(body["results"][1]["error"]["code"], "RECORD_001");
    assert_eq!(body["results"][3]["flushed"], 3);
    assert_eq!(ctx.sink.messages_for("b"), vec!["one", "two", "three"]);
}

/// Oversized batches are refused as a whole.
#[tokio::test]
async fn test_post_batch_too_large() {
    let ctx = TestContext::new(3);
    let server = server(&ctx);

    let payload: Vec<Value> = (0..1001)
        .map(|i| fixtures::log_json("big", &format!("m{}", i)))
        .collect();
    let response = server.post("/logs/batch").json(&payload).await;
    assert_eq!(response.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(ctx.ingestor.volatile_store().session_count(), 0);
}

/// Session configuration can be registered, read back and removed.
#[tokio::test]
async fn test_session_config_lifecycle() {
    let ctx = TestContext::new(100);
    let server = server(&ctx);

    let response = server.get("/sessions/abc/config").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["registered"], false);
    assert_eq!(body["configuration"]["flushCount"], 100);

    let response = server
        .put("/sessions/abc/config")
        .json(&json!({"flushCount": 2, "sinkTarget": "abc-logs"}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["configuration"]["sessionId"], "abc");
    assert_eq!(body["configuration"]["sinkTarget"], "abc-logs");

    server.post("/logs").json(&fixtures::log_json("abc", "x")).await;
    server.post("/logs").json(&fixtures::log_json("abc", "y")).await;
    assert_eq!(ctx.sink.pushed()[0].target, "abc-logs");

    let response = server.delete("/sessions/abc/config").await;
    assert_eq!(response.status_code(), StatusCode::NO_CONTENT);
    let body: Value = server.get("/sessions/abc/config").await.json();
    assert_eq!(body["registered"], false);
}

/// Invalid session configuration is rejected.
#[tokio::test]
async fn test_session_config_validation() {
    let ctx = TestContext::new(100);
    let server = server(&ctx);

    let response = server
        .put("/sessions/abc/config")
        .json(&json!({"sinkTarget": ""}))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "RECORD_006");
}

/// Health reports components and buffer occupancy.
#[tokio::test]
async fn test_health_endpoint_structure() {
    let ctx = TestContext::new(10);
    let server = server(&ctx);
    server.post("/logs").json(&fixtures::log_json("h", "buffered")).await;

    let response = server.get("/health").await;
    response.assert_status_ok();
    let body: Value = response.json();

    let status = body["status"].as_str().unwrap_or("");
    assert!(
        status == "healthy" || status == "degraded" || status == "unhealthy",
        "unexpected status '{}'",
        status
    );
    assert_eq!(body["components"].as_array().map(Vec::len), Some(2));
    assert_eq!(body["bufferedSessions"], 1);
    assert_eq!(body["bufferedRecords"], 1);
    assert_eq!(body["inFlightFlushes"], 0);
}

/// Liveness is unconditional; metrics are served as JSON.
#[tokio::test]
async fn test_live_and_metrics() {
    let ctx = TestContext::new(10);
    let server = server(&ctx);

    server.get("/health/live").await.assert_status_ok();

    server.post("/logs").json(&fixtures::log_json("m", "counted")).await;
    let body: Value = server.get("/metrics").await.json();
    assert!(body["recordsReceived"].as_u64().unwrap_or(0) >= 1);
    assert!(body.get("sinkPushLatencyMeanMs").is_some());
}
