//! Mock implementations for testing.

use async_trait::async_trait;
use batch_core::{error::SinkErrorCode, Batch, Error, Result};
use buffer_store::{KvError, KvStore, MemoryKvStore};
use bulk_sink::{BulkSink, PushReceipt};
use parking_lot::Mutex;
use pipeline::{Diagnostic, Diagnostics};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A batch as the sink received it.
#[derive(Debug, Clone)]
pub struct PushedBatch {
    pub target: String,
    pub batch: Batch,
}

/// Sink that captures batches in memory.
///
/// Implements the production `BulkSink` trait so every flush path runs
/// unchanged up to the network hop.
#[derive(Clone, Default)]
pub struct MockSink {
    pushed: Arc<Mutex<Vec<PushedBatch>>>,
    should_fail: Arc<AtomicBool>,
    /// Artificial latency per push
    delay_ms: Arc<AtomicUsize>,
    /// Pushes currently inside `push`
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pushed(&self) -> Vec<PushedBatch> {
        self.pushed.lock().clone()
    }

    pub fn batch_count(&self) -> usize {
        self.pushed.lock().len()
    }

    /// Total records across all pushed batches.
    pub fn record_count(&self) -> usize {
        self.pushed.lock().iter().map(|p| p.batch.len()).sum()
    }

    /// Every pushed message for `session_key`, in push order.
    pub fn messages_for(&self, session_key: &str) -> Vec<String> {
        self.pushed
            .lock()
            .iter()
            .filter(|p| p.batch.session_key == session_key)
            .flat_map(|p| p.batch.messages().into_iter().map(str::to_string))
            .collect()
    }

    pub fn clear(&self) {
        self.pushed.lock().clear();
    }

    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
    }

    /// Highest number of pushes observed running at once.
    pub fn max_concurrent_pushes(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BulkSink for MockSink {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn push(&self, batch: &Batch, target: &str) -> Result<PushReceipt> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }

        let result = if self.should_fail.load(Ordering::SeqCst) {
            Err(Error::sink(
                SinkErrorCode::Unreachable,
                "mock sink is down",
            ))
        } else {
            self.pushed.lock().push(PushedBatch {
                target: target.to_string(),
                batch: batch.clone(),
            });
            Ok(PushReceipt {
                records: batch.len(),
                latency_ms: delay as u64,
            })
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn ping(&self) -> bool {
        !self.should_fail.load(Ordering::SeqCst)
    }
}

/// Key-value store with a failure switch.
#[derive(Clone, Default)]
pub struct FlakyKvStore {
    inner: Arc<MemoryKvStore>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl FlakyKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn entry_count(&self) -> usize {
        self.inner.len()
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.inner.raw(key)
    }
}

#[async_trait]
impl KvStore for FlakyKvStore {
    async fn get(&self, key: &str) -> std::result::Result<Option<String>, KvError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(KvError::new("mock kv read failure"));
        }
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: String) -> std::result::Result<(), KvError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(KvError::new("mock kv write failure"));
        }
        self.inner.put(key, value).await
    }

    async fn delete(&self, key: &str) -> std::result::Result<(), KvError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(KvError::new("mock kv write failure"));
        }
        self.inner.delete(key).await
    }
}

/// Diagnostics channel that records every report.
#[derive(Clone, Default)]
pub struct RecordingDiagnostics {
    reports: Arc<Mutex<Vec<Diagnostic>>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<Diagnostic> {
        self.reports.lock().clone()
    }

    pub fn lost_records(&self) -> usize {
        self.reports
            .lock()
            .iter()
            .map(|d| match d {
                Diagnostic::BatchLost { records, .. } => *records,
                _ => 0,
            })
            .sum()
    }
}

#[async_trait]
impl Diagnostics for RecordingDiagnostics {
    async fn report(&self, diagnostic: Diagnostic) {
        self.reports.lock().push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batch_core::{LogLevel, LogRecord};
    use chrono::Utc;

    #[tokio::test]
    async fn test_mock_sink_captures_batches() {
        let sink = MockSink::new();
        let batch = Batch::single("s", LogRecord::new("hello", LogLevel::Information, Utc::now()));

        let receipt = sink.push(&batch, "logs").await.unwrap();
        assert_eq!(receipt.records, 1);
        assert_eq!(sink.messages_for("s"), vec!["hello"]);
        assert_eq!(sink.pushed()[0].target, "logs");
    }

    #[tokio::test]
    async fn test_mock_sink_failure_mode() {
        let sink = MockSink::new();
        sink.set_should_fail(true);

        let batch = Batch::empty("s");
        let err = sink.push(&batch, "logs").await.unwrap_err();
        assert_eq!(err.error_code(), Some("SINK_002"));
        assert!(!sink.ping().await);
        assert_eq!(sink.batch_count(), 0);
    }

    #[tokio::test]
    async fn test_flaky_kv_switches() {
        let kv = FlakyKvStore::new();
        kv.put("a", "1".to_string()).await.unwrap();

        kv.set_fail_reads(true);
        assert!(kv.get("a").await.is_err());
        kv.set_fail_reads(false);
        assert_eq!(kv.get("a").await.unwrap().as_deref(), Some("1"));
    }
}
