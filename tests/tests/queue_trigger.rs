//! Queue-triggered ingestion tests.
//!
//! A scripted record source stands in for the broker; decoding, ingestion
//! and flushing run through the production worker and pipeline.

use async_trait::async_trait;
use batch_core::{LogLevel, Result, StorageMode};
use integration_tests::{fixtures, setup::TestContext};
use parking_lot::Mutex;
use pipeline::SessionDefaults;
use queue::{QueueRecord, QueueWorker, RecordSource};
use std::sync::Arc;
use std::time::Duration;

/// In-memory partition: serves everything after the committed offset.
#[derive(Default)]
struct ScriptedPartition {
    records: Mutex<Vec<QueueRecord>>,
    committed: Mutex<i64>,
}

impl ScriptedPartition {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn publish(&self, body: impl Into<Vec<u8>>) {
        let mut records = self.records.lock();
        let offset = records.len() as i64;
        records.push(QueueRecord::new(offset, body));
    }

    fn committed(&self) -> i64 {
        *self.committed.lock()
    }
}

#[async_trait]
impl RecordSource for ScriptedPartition {
    fn describe(&self) -> String {
        "scripted partition".to_string()
    }

    async fn fetch(&self) -> Result<Vec<QueueRecord>> {
        let from = *self.committed.lock();
        let pending: Vec<QueueRecord> = self
            .records
            .lock()
            .iter()
            .filter(|r| r.offset >= from)
            .cloned()
            .collect();
        if pending.is_empty() {
            // Long-poll stand-in
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Ok(pending)
    }

    async fn commit(&self, next_offset: i64) -> Result<()> {
        *self.committed.lock() = next_offset;
        Ok(())
    }
}

#[tokio::test]
async fn test_queue_messages_flush_with_carried_settings() {
    let ctx = TestContext::new(100);
    let partition = ScriptedPartition::new();
    partition.publish("01-06-2024 11:59:00|q1|[WARN] disk at 91%|2|0");
    partition.publish(fixtures::queue_message("q2", "other session", 2));
    partition.publish(fixtures::queue_message("q1", "disk at 95%", 2));

    let worker = QueueWorker::new(partition.clone(), ctx.ingestor.clone());
    let outcome = worker.process_batch().await.unwrap();
    assert_eq!(outcome.ingested, 3);
    assert_eq!(outcome.committed, Some(3));

    let pushed = ctx.sink.pushed();
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0].target, "logs");
    assert_eq!(pushed[0].batch.session_key, "q1");
    assert_eq!(pushed[0].batch.records[0].level(), LogLevel::Warning);
    assert_eq!(ctx.sink.messages_for("q1"), vec!["disk at 91%", "disk at 95%"]);
    assert_eq!(ctx.ingestor.volatile_store().buffered_records(), 1);
}

#[tokio::test]
async fn test_queue_and_http_share_session_buffer() {
    let ctx = TestContext::new(3);
    let partition = ScriptedPartition::new();
    let worker = QueueWorker::new(partition.clone(), ctx.ingestor.clone());

    partition.publish(fixtures::queue_message("shared", "from queue 1", 3));
    worker.process_batch().await.unwrap();

    ctx.ingestor
        .ingest(batch_core::RawRecord::new("shared", "from http"))
        .await
        .unwrap();

    partition.publish(fixtures::queue_message("shared", "from queue 2", 3));
    worker.process_batch().await.unwrap();

    assert_eq!(
        ctx.sink.messages_for("shared"),
        vec!["from queue 1", "from http", "from queue 2"]
    );
}

#[tokio::test]
async fn test_malformed_messages_do_not_block_the_partition() {
    let ctx = TestContext::new(100);
    let partition = ScriptedPartition::new();
    partition.publish("this is not pipe delimited");
    partition.publish(fixtures::queue_message("ok", "valid", 1));
    partition.publish("01-06-2024 11:00:00|k|msg|lots|0");

    let worker = QueueWorker::new(partition.clone(), ctx.ingestor.clone());
    let outcome = worker.process_batch().await.unwrap();
    assert_eq!(outcome.ingested, 1);
    assert_eq!(outcome.rejected, 2);
    assert_eq!(partition.committed(), 3);
    assert_eq!(ctx.sink.messages_for("ok"), vec!["valid"]);
}

#[tokio::test]
async fn test_storage_outage_redelivers_after_recovery() {
    let ctx = TestContext::with_defaults(SessionDefaults {
        storage_mode: StorageMode::Durable,
        ..SessionDefaults::default()
    });
    let partition = ScriptedPartition::new();
    partition.publish(fixtures::queue_message("d", "first", 2));
    partition.publish(fixtures::queue_message("d", "second", 2));
    let worker = QueueWorker::new(partition.clone(), ctx.ingestor.clone());

    ctx.kv.set_fail_reads(true);
    let err = worker.process_batch().await.unwrap_err();
    assert!(err.is_storage_unavailable());
    assert_eq!(partition.committed(), 0);
    assert_eq!(ctx.sink.batch_count(), 0);

    ctx.kv.set_fail_reads(false);
    let outcome = worker.process_batch().await.unwrap();
    assert_eq!(outcome.ingested, 2);
    assert_eq!(partition.committed(), 2);
    assert_eq!(ctx.sink.messages_for("d"), vec!["first", "second"]);
    assert_eq!(ctx.kv.entry_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_loop_consumes_until_aborted() {
    let ctx = TestContext::new(100);
    let partition = ScriptedPartition::new();
    let worker = QueueWorker::new(partition.clone(), ctx.ingestor.clone())
        .with_retry_backoff(Duration::from_millis(10));
    let handle = tokio::spawn(async move { worker.run().await });

    for i in 0..4 {
        partition.publish(fixtures::queue_message("loop", &format!("m{}", i), 4));
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while ctx.sink.record_count() < 4 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    handle.abort();

    assert_eq!(ctx.sink.messages_for("loop"), vec!["m0", "m1", "m2", "m3"]);
    assert_eq!(partition.committed(), 4);
}
