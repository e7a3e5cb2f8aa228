//! Single-flight flush coordination per session key.

use batch_core::{
    evaluate, evaluate_overdue, Batch, BufferStats, Clock, LoggerConfiguration, StorageMode,
};
use buffer_store::{BufferStore, KeyGuard, KeyedLocks};
use bulk_sink::BulkSink;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use telemetry::metrics;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::config::FlushDispatch;
use crate::diagnostics::{Diagnostic, Diagnostics};

/// What happened to a flush evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Policy said not yet.
    NotDue,
    /// Another flush for this key holds the token; the holder re-checks
    /// the buffer once it releases it.
    Skipped,
    /// Token taken but the buffer had already been drained.
    Empty,
    /// Batch accepted by the sink.
    Flushed { records: usize },
    /// Batch drained but rejected by the sink; the records are gone.
    Lost { records: usize },
    /// Snapshot could not be taken; nothing was drained.
    Deferred,
    /// Flush handed to a background task.
    Dispatched,
}

impl FlushOutcome {
    /// Records accepted by the sink, if this was a completed flush.
    pub fn flushed_records(&self) -> Option<usize> {
        match self {
            Self::Flushed { records } => Some(*records),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotDue => "not_due",
            Self::Skipped => "skipped",
            Self::Empty => "empty",
            Self::Flushed { .. } => "flushed",
            Self::Lost { .. } => "lost",
            Self::Deferred => "deferred",
            Self::Dispatched => "dispatched",
        }
    }
}

/// Owns the append → evaluate → snapshot → push → delete chain.
///
/// A per-key token guards the flush sequence only; appends to the same key
/// proceed while it is held and land in the freshly cleared buffer. A due
/// evaluation that finds the token held is parked in `pending` and honoured
/// by the holder after release.
pub struct FlushCoordinator {
    sink: Arc<dyn BulkSink>,
    diagnostics: Arc<dyn Diagnostics>,
    clock: Arc<dyn Clock>,
    tokens: KeyedLocks,
    pending: Mutex<HashMap<String, LoggerConfiguration>>,
    dispatch: FlushDispatch,
    in_flight: AtomicUsize,
    idle: Notify,
}

impl FlushCoordinator {
    pub fn new(
        sink: Arc<dyn BulkSink>,
        diagnostics: Arc<dyn Diagnostics>,
        clock: Arc<dyn Clock>,
        dispatch: FlushDispatch,
    ) -> Self {
        Self {
            sink,
            diagnostics,
            clock,
            tokens: KeyedLocks::new(),
            pending: Mutex::new(HashMap::new()),
            dispatch,
            in_flight: AtomicUsize::new(0),
            idle: Notify::new(),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn sink(&self) -> &Arc<dyn BulkSink> {
        &self.sink
    }

    pub fn diagnostics(&self) -> &Arc<dyn Diagnostics> {
        &self.diagnostics
    }

    pub fn dispatch(&self) -> FlushDispatch {
        self.dispatch
    }

    /// Flushes currently running or dispatched.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Evaluates the policy against fresh stats and flushes when due.
    ///
    /// Must run after every single append.
    pub async fn on_mutation(
        self: &Arc<Self>,
        store: Arc<dyn BufferStore>,
        key: &str,
        stats: &BufferStats,
        config: &LoggerConfiguration,
    ) -> FlushOutcome {
        let decision = evaluate(stats, config, self.clock.now());
        if !decision.is_due() {
            return FlushOutcome::NotDue;
        }

        debug!(
            session_key = %key,
            decision = decision.as_str(),
            count = stats.count,
            "Flush due"
        );

        // parked before the token check so a holder releasing concurrently sees it
        self.pending.lock().insert(key.to_string(), config.clone());
        let Some(token) = self.tokens.try_lock(key) else {
            metrics().flushes_skipped.inc();
            debug!(session_key = %key, "Flush already in flight, deferring to holder");
            return FlushOutcome::Skipped;
        };
        self.pending.lock().remove(key);

        self.start_flush(store, key, &config.sink_target, token).await
    }

    /// Flushes `key` now unless a flush for it is already in flight.
    pub async fn try_flush(
        self: &Arc<Self>,
        store: Arc<dyn BufferStore>,
        key: &str,
        target: &str,
    ) -> FlushOutcome {
        let Some(token) = self.tokens.try_lock(key) else {
            metrics().flushes_skipped.inc();
            debug!(session_key = %key, "Flush already in flight, skipping");
            return FlushOutcome::Skipped;
        };
        self.start_flush(store, key, target, token).await
    }

    async fn start_flush(
        self: &Arc<Self>,
        store: Arc<dyn BufferStore>,
        key: &str,
        target: &str,
        token: KeyGuard,
    ) -> FlushOutcome {
        metrics().flushes_triggered.inc();
        self.begin();

        match self.dispatch {
            FlushDispatch::Inline => self.flush_locked(store, key, target, token).await,
            FlushDispatch::Background => {
                let this = Arc::clone(self);
                let key = key.to_string();
                let target = target.to_string();
                tokio::spawn(async move {
                    this.flush_locked(store, &key, &target, token).await;
                });
                FlushOutcome::Dispatched
            }
        }
    }

    /// Like [`try_flush`](Self::try_flush) but always awaits the flush.
    pub async fn flush_inline(
        &self,
        store: Arc<dyn BufferStore>,
        key: &str,
        target: &str,
    ) -> FlushOutcome {
        let Some(token) = self.tokens.try_lock(key) else {
            metrics().flushes_skipped.inc();
            return FlushOutcome::Skipped;
        };

        metrics().flushes_triggered.inc();
        self.begin();
        self.flush_locked(store, key, target, token).await
    }

    /// Waits until no flush is running or dispatched.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn begin(&self) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        metrics().in_flight_flushes.inc();
    }

    fn finish(&self) {
        metrics().in_flight_flushes.dec();
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }

    async fn flush_locked(
        &self,
        store: Arc<dyn BufferStore>,
        key: &str,
        target: &str,
        token: KeyGuard,
    ) -> FlushOutcome {
        let outcome = self.run_flush(store.as_ref(), key, target).await;
        drop(token);
        self.catch_up(store.as_ref(), key).await;
        self.tokens.forget(key);
        self.finish();
        outcome
    }

    /// Re-checks evaluations that were skipped while the token was held.
    ///
    /// Appends during the flush may have carried the buffer past an exact
    /// count, so the re-check accepts any count at or above the threshold.
    async fn catch_up(&self, store: &dyn BufferStore, key: &str) {
        loop {
            let Some(config) = self.pending.lock().remove(key) else {
                return;
            };
            let stats = match store.peek_stats(key).await {
                Ok(stats) => stats,
                Err(e) => {
                    warn!(session_key = %key, error = %e, "Could not re-check deferred flush");
                    return;
                }
            };
            if !evaluate_overdue(&stats, &config, self.clock.now()).is_due() {
                return;
            }
            let Some(token) = self.tokens.try_lock(key) else {
                // a new holder took over and re-checks on its own release
                self.pending.lock().entry(key.to_string()).or_insert(config);
                return;
            };

            metrics().flushes_triggered.inc();
            debug!(session_key = %key, count = stats.count, "Flushing deferred evaluation");
            let outcome = self.run_flush(store, key, &config.sink_target).await;
            drop(token);
            debug!(session_key = %key, outcome = outcome.as_str(), "Deferred flush finished");
        }
    }

    async fn run_flush(&self, store: &dyn BufferStore, key: &str, target: &str) -> FlushOutcome {
        let batch = match store.snapshot_and_clear(key).await {
            Ok(batch) => batch,
            Err(e) => {
                warn!(session_key = %key, error = %e, "Could not snapshot buffer for flush");
                self.diagnostics
                    .report(Diagnostic::StorageFailure {
                        session_key: key.to_string(),
                        reason: e.to_string(),
                    })
                    .await;
                return FlushOutcome::Deferred;
            }
        };

        if batch.is_empty() {
            return FlushOutcome::Empty;
        }

        let outcome = self.deliver(&batch, target).await;

        if matches!(outcome, FlushOutcome::Flushed { .. }) && store.mode() == StorageMode::Durable {
            if let Err(e) = store.delete(key).await {
                warn!(session_key = %key, error = %e, "Could not remove drained durable buffer");
                self.diagnostics
                    .report(Diagnostic::StorageFailure {
                        session_key: key.to_string(),
                        reason: e.to_string(),
                    })
                    .await;
            }
        }

        outcome
    }

    /// Pushes a batch once. Failures are logged and reported, never returned.
    pub async fn deliver(&self, batch: &Batch, target: &str) -> FlushOutcome {
        let records = batch.len();
        match self.sink.push(batch, target).await {
            Ok(receipt) => {
                metrics().batches_pushed.inc();
                metrics().records_pushed.inc_by(receipt.records as u64);
                info!(
                    session_key = %batch.session_key,
                    target = %target,
                    records = records,
                    latency_ms = receipt.latency_ms,
                    "Flushed batch"
                );
                FlushOutcome::Flushed { records }
            }
            Err(e) => {
                metrics().batches_lost.inc();
                metrics().records_lost.inc_by(records as u64);
                error!(
                    session_key = %batch.session_key,
                    target = %target,
                    records = records,
                    error = %e,
                    "Sink push failed, batch dropped"
                );
                self.diagnostics
                    .report(Diagnostic::BatchLost {
                        session_key: batch.session_key.clone(),
                        target: target.to_string(),
                        records,
                        reason: e.to_string(),
                    })
                    .await;
                FlushOutcome::Lost { records }
            }
        }
    }
}
