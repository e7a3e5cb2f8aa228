//! Durable buffering across stateless invocations.
//!
//! Each invocation builds a fresh ingestor over the same key-value backend
//! and sink, so the only state carried between them is what was saved.

use batch_core::RawRecord;
use buffer_store::{BufferStore, KvStore, DEFAULT_KEY_PREFIX};
use integration_tests::{
    fixtures,
    mocks::{FlakyKvStore, MockSink},
    setup::TestContext,
};
use pipeline::{Diagnostic, FlushOutcome, PipelineConfig};

fn invocation(kv: &FlakyKvStore, sink: &MockSink) -> TestContext {
    TestContext::with_shared(PipelineConfig::default(), kv.clone(), sink.clone())
}

fn durable(key: &str, message: &str, flush_count: u32) -> RawRecord {
    RawRecord::new(key, message).with_configuration(fixtures::durable_config(key, flush_count))
}

/// Buffer state is rebuilt from the backend on every invocation.
#[tokio::test]
async fn test_buffer_survives_between_invocations() {
    let kv = FlakyKvStore::new();
    let sink = MockSink::new();

    for (i, message) in ["first", "second"].into_iter().enumerate() {
        let ctx = invocation(&kv, &sink);
        let receipt = ctx.ingestor.ingest(durable("s", message, 3)).await.unwrap();
        assert_eq!(receipt.outcome, FlushOutcome::NotDue, "invocation {}", i);
        assert_eq!(sink.batch_count(), 0);
    }
    assert_eq!(kv.entry_count(), 1);

    let ctx = invocation(&kv, &sink);
    let receipt = ctx.ingestor.ingest(durable("s", "third", 3)).await.unwrap();
    assert_eq!(receipt.flushed(), Some(3));

    assert_eq!(sink.messages_for("s"), vec!["first", "second", "third"]);
    assert_eq!(kv.entry_count(), 0, "entry removed after a successful push");
}

/// A backend outage is an ingestion error and buffers nothing.
#[tokio::test]
async fn test_storage_outage_is_ingestion_error() {
    let ctx = TestContext::new(2);
    ctx.kv.set_fail_reads(true);

    let err = ctx.ingestor.ingest(durable("s", "lost?", 2)).await.unwrap_err();
    assert!(err.is_storage_unavailable());
    assert!(err.is_retryable());
    assert_eq!(err.error_code(), Some("STORE_001"));
    assert_eq!(ctx.sink.batch_count(), 0);

    ctx.kv.set_fail_reads(false);
    ctx.ingestor.ingest(durable("s", "retried", 2)).await.unwrap();
    let durable_store = ctx.ingestor.durable_store().unwrap();
    assert_eq!(durable_store.peek_stats("s").await.unwrap().count, 1);
}

/// A failed write leaves the previous state untouched.
#[tokio::test]
async fn test_failed_save_keeps_previous_state() {
    let ctx = TestContext::new(5);
    ctx.ingestor.ingest(durable("s", "kept", 5)).await.unwrap();

    ctx.kv.set_fail_writes(true);
    let err = ctx.ingestor.ingest(durable("s", "dropped", 5)).await.unwrap_err();
    assert_eq!(err.error_code(), Some("STORE_002"));

    ctx.kv.set_fail_writes(false);
    let durable_store = ctx.ingestor.durable_store().unwrap();
    assert_eq!(durable_store.peek_stats("s").await.unwrap().count, 1);
}

/// Sink failure in durable mode drops the batch but not the session.
#[tokio::test]
async fn test_sink_failure_in_durable_mode() {
    let kv = FlakyKvStore::new();
    let sink = MockSink::new();
    sink.set_should_fail(true);

    let ctx = invocation(&kv, &sink);
    ctx.ingestor.ingest(durable("s", "a", 2)).await.unwrap();
    let receipt = ctx.ingestor.ingest(durable("s", "b", 2)).await.unwrap();
    assert_eq!(receipt.outcome, FlushOutcome::Lost { records: 2 });
    assert_eq!(ctx.diagnostics.lost_records(), 2);

    sink.set_should_fail(false);
    let next = invocation(&kv, &sink);
    next.ingestor.ingest(durable("s", "c", 2)).await.unwrap();
    let receipt = next.ingestor.ingest(durable("s", "d", 2)).await.unwrap();
    assert_eq!(receipt.flushed(), Some(2));
    assert_eq!(sink.messages_for("s"), vec!["c", "d"]);
}

/// An unreadable entry is replaced instead of blocking the session, and
/// the loss is reported to the operator.
#[tokio::test]
async fn test_corrupt_entry_is_replaced() {
    let ctx = TestContext::new(5);
    let storage_key = format!("{}s", DEFAULT_KEY_PREFIX);
    ctx.kv
        .put(&storage_key, "{not json".to_string())
        .await
        .unwrap();

    ctx.ingestor.ingest(durable("s", "fresh", 5)).await.unwrap();

    let raw = ctx.kv.raw(&storage_key).unwrap();
    assert!(raw.contains("fresh"));
    let durable_store = ctx.ingestor.durable_store().unwrap();
    assert_eq!(durable_store.peek_stats("s").await.unwrap().count, 1);

    let reports = ctx.diagnostics.reports();
    assert_eq!(reports.len(), 1);
    assert!(matches!(
        &reports[0],
        Diagnostic::StorageFailure { session_key, reason }
            if session_key == "s" && reason.contains("unreadable stored buffer")
    ));
}

/// Cleanup failure after a successful push is reported, not returned.
#[tokio::test]
async fn test_cleanup_failure_is_reported() {
    let ctx = TestContext::new(1);
    ctx.ingestor.ingest(durable("s", "a", 2)).await.unwrap();

    // writes start failing while the push is in flight, so only the
    // post-push delete sees the outage
    let sink = ctx.sink.clone();
    sink.set_delay(std::time::Duration::from_millis(50));
    let ingestor = ctx.ingestor.clone();
    let flush = tokio::spawn(async move { ingestor.ingest(durable("s", "b", 2)).await });

    tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    ctx.kv.set_fail_writes(true);
    let receipt = flush.await.unwrap().unwrap();
    ctx.kv.set_fail_writes(false);

    assert_eq!(receipt.flushed(), Some(2));
    let reports = ctx.diagnostics.reports();
    assert!(reports
        .iter()
        .any(|d| matches!(d, Diagnostic::StorageFailure { session_key, .. } if session_key == "s")));
}
