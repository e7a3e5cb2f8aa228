//! Ingestion entrypoint shared by every transport.

use batch_core::{Batch, Clock, Error, LoggerConfiguration, RawRecord, Result, StorageMode};
use buffer_store::{BufferStore, DurableStore, KvStore, VolatileStore};
use bulk_sink::BulkSink;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use telemetry::metrics;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::coordinator::{FlushCoordinator, FlushOutcome};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::registry::SessionConfigRegistry;

/// Result of accepting one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReceipt {
    pub session_key: String,
    pub outcome: FlushOutcome,
}

impl IngestReceipt {
    /// Records flushed as a consequence of this record, if any.
    pub fn flushed(&self) -> Option<usize> {
        self.outcome.flushed_records()
    }
}

/// Totals from a shutdown drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainSummary {
    pub sessions: usize,
    pub records_flushed: usize,
    pub records_lost: usize,
}

/// Receives raw records, buffers them and triggers flushes.
///
/// Errors returned here are ingestion errors only (rejected record or
/// storage unavailable). Flush-path failures go to the diagnostics channel.
pub struct Ingestor {
    volatile: Arc<VolatileStore>,
    durable: Option<Arc<DurableStore>>,
    coordinator: Arc<FlushCoordinator>,
    registry: SessionConfigRegistry,
    /// Last configuration seen per volatile session, for sweeps and drains
    active: Mutex<HashMap<String, LoggerConfiguration>>,
}

impl Ingestor {
    pub fn new(
        volatile: Arc<VolatileStore>,
        durable: Option<Arc<DurableStore>>,
        coordinator: Arc<FlushCoordinator>,
        registry: SessionConfigRegistry,
    ) -> Self {
        Self {
            volatile,
            durable,
            coordinator,
            registry,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Wires stores, coordinator and registry from configuration.
    ///
    /// Durable mode is only available when a key-value backend is given.
    pub fn from_config(
        config: &PipelineConfig,
        sink: Arc<dyn BulkSink>,
        kv: Option<Arc<dyn KvStore>>,
        diagnostics: Arc<dyn Diagnostics>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let coordinator = Arc::new(FlushCoordinator::new(sink, diagnostics, clock, config.dispatch));
        let registry = SessionConfigRegistry::new(
            config.default_session_config()?,
            config.registry_ttl(),
            config.registry_capacity,
        );
        let durable = kv.map(|kv| Arc::new(DurableStore::new(kv)));
        Ok(Self::new(
            Arc::new(VolatileStore::new()),
            durable,
            coordinator,
            registry,
        ))
    }

    pub fn registry(&self) -> &SessionConfigRegistry {
        &self.registry
    }

    pub fn coordinator(&self) -> &Arc<FlushCoordinator> {
        &self.coordinator
    }

    pub fn volatile_store(&self) -> &Arc<VolatileStore> {
        &self.volatile
    }

    pub fn durable_store(&self) -> Option<&Arc<DurableStore>> {
        self.durable.as_ref()
    }

    fn store_for(&self, mode: StorageMode) -> Result<Arc<dyn BufferStore>> {
        match mode {
            StorageMode::Volatile => Ok(self.volatile.clone()),
            StorageMode::Durable => self
                .durable
                .clone()
                .map(|store| store as Arc<dyn BufferStore>)
                .ok_or_else(|| {
                    Error::configuration("durable storage requested but no durable store is configured")
                }),
        }
    }

    async fn resolve_config(&self, key: &str, raw: &RawRecord) -> Result<LoggerConfiguration> {
        match &raw.configuration {
            Some(carried) => carried.for_session(key).validated(),
            None => Ok(self.registry.resolve(key).await),
        }
    }

    /// Normalizes, buffers and evaluates one record.
    pub async fn ingest(&self, raw: RawRecord) -> Result<IngestReceipt> {
        metrics().records_received.inc();

        let result = self.ingest_inner(raw).await;
        if let Err(e) = &result {
            if e.is_invalid_record() {
                metrics().records_rejected.inc();
            }
            debug!(error = %e, "Record not ingested");
        }
        result
    }

    async fn ingest_inner(&self, raw: RawRecord) -> Result<IngestReceipt> {
        let now = self.coordinator.clock().now();
        let (key, record) = raw.normalize(now)?;
        let config = self.resolve_config(&key, &raw).await?;

        if config.is_immediate() {
            metrics().records_immediate.inc();
            let outcome = self
                .coordinator
                .deliver(&Batch::single(key.clone(), record), &config.sink_target)
                .await;
            return Ok(IngestReceipt {
                session_key: key,
                outcome,
            });
        }

        let store = self.store_for(config.storage_mode)?;
        let appended = store.append(&key, record).await;
        if config.is_durable() {
            self.report_discarded().await;
        }
        let stats = appended?;
        metrics().records_buffered.inc();

        if config.storage_mode == StorageMode::Volatile {
            self.active.lock().insert(key.clone(), config.clone());
        }

        let outcome = self
            .coordinator
            .on_mutation(store, &key, &stats, &config)
            .await;

        Ok(IngestReceipt {
            session_key: key,
            outcome,
        })
    }

    /// Tells the operator about durable buffers dropped as unreadable.
    async fn report_discarded(&self) {
        let Some(durable) = &self.durable else {
            return;
        };
        for discarded in durable.take_discarded() {
            self.coordinator
                .diagnostics()
                .report(Diagnostic::StorageFailure {
                    session_key: discarded.session_key,
                    reason: format!("unreadable stored buffer discarded: {}", discarded.reason),
                })
                .await;
        }
    }

    async fn config_for_volatile(&self, key: &str) -> LoggerConfiguration {
        let known = self.active.lock().get(key).cloned();
        match known {
            Some(config) => config,
            None => self.registry.resolve(key).await,
        }
    }

    /// Re-evaluates every non-empty volatile buffer against the clock.
    ///
    /// Elapsed-time thresholds are otherwise only checked on append, so an
    /// idle session would hold its records until the next one arrives.
    pub async fn sweep(&self) -> usize {
        let now = self.coordinator.clock().now();
        let store: Arc<dyn BufferStore> = self.volatile.clone();
        let mut flushed = 0;

        for key in self.volatile.non_empty_keys() {
            let config = self.config_for_volatile(&key).await;
            let Ok(stats) = store.peek_stats(&key).await else {
                continue;
            };
            if !batch_core::should_flush(&stats, &config, now) {
                continue;
            }
            let outcome = self
                .coordinator
                .try_flush(store.clone(), &key, &config.sink_target)
                .await;
            flushed += outcome.flushed_records().unwrap_or(0);
        }
        flushed
    }

    /// Flushes every non-empty volatile buffer regardless of thresholds.
    ///
    /// Called on shutdown so process-local records are not silently dropped.
    pub async fn drain_all(&self) -> DrainSummary {
        self.coordinator.wait_idle().await;

        let store: Arc<dyn BufferStore> = self.volatile.clone();
        let mut summary = DrainSummary::default();

        for key in self.volatile.non_empty_keys() {
            let config = self.config_for_volatile(&key).await;
            summary.sessions += 1;

            let outcome = self
                .coordinator
                .flush_inline(store.clone(), &key, &config.sink_target)
                .await;
            match outcome {
                FlushOutcome::Flushed { records } => summary.records_flushed += records,
                FlushOutcome::Lost { records } => summary.records_lost += records,
                _ => {}
            }
        }

        self.coordinator.wait_idle().await;
        self.active.lock().clear();

        info!(
            sessions = summary.sessions,
            records_flushed = summary.records_flushed,
            records_lost = summary.records_lost,
            "Drained volatile buffers"
        );
        summary
    }
}
