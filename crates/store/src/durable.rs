//! Buffer store backed by an external key-value store.

use async_trait::async_trait;
use batch_core::{
    error::StorageErrorCode, Batch, BufferStats, Error, LogRecord, Result, SessionBuffer,
    StorageMode,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use telemetry::{health, metrics};
use tracing::{debug, error};

use crate::kv::KvStore;
use crate::locks::KeyedLocks;
use crate::store::BufferStore;

/// Key prefix used when none is configured.
pub const DEFAULT_KEY_PREFIX: &str = "session-buffer:";

/// Serialized form of a session buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredBuffer {
    records: Vec<LogRecord>,
    first_timestamp: Option<DateTime<Utc>>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl From<&SessionBuffer> for StoredBuffer {
    fn from(buffer: &SessionBuffer) -> Self {
        let stats = buffer.peek_stats();
        Self {
            records: buffer.records().to_vec(),
            first_timestamp: stats.first_timestamp,
            last_timestamp: stats.last_timestamp,
        }
    }
}

/// A stored buffer that could not be read and was replaced with an empty one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscardedBuffer {
    pub session_key: String,
    pub reason: String,
}

/// Loads, mutates and saves a buffer through a [`KvStore`] on every call.
///
/// Operations on one key are serialized through a per-key lock, so a
/// load-modify-save cycle never interleaves with another on the same key
/// inside this process.
pub struct DurableStore {
    kv: Arc<dyn KvStore>,
    locks: KeyedLocks,
    key_prefix: String,
    discarded: Mutex<Vec<DiscardedBuffer>>,
}

impl DurableStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self::with_prefix(kv, DEFAULT_KEY_PREFIX)
    }

    pub fn with_prefix(kv: Arc<dyn KvStore>, key_prefix: impl Into<String>) -> Self {
        Self {
            kv,
            locks: KeyedLocks::new(),
            key_prefix: key_prefix.into(),
            discarded: Mutex::new(Vec::new()),
        }
    }

    /// Drains the buffers discarded as unreadable since the last call.
    pub fn take_discarded(&self) -> Vec<DiscardedBuffer> {
        std::mem::take(&mut *self.discarded.lock())
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    /// Records the outcome of one backend round trip.
    fn observe<T, E: std::fmt::Display>(
        &self,
        start: Instant,
        result: std::result::Result<T, E>,
        code: StorageErrorCode,
        context: impl FnOnce() -> String,
    ) -> Result<T> {
        metrics().storage_latency_ms.observe_since(start);
        match result {
            Ok(value) => {
                health().store.set_healthy();
                Ok(value)
            }
            Err(e) => {
                metrics().storage_errors.inc();
                health().store.set_unhealthy(e.to_string());
                Err(Error::storage(code, format!("{}: {e}", context())))
            }
        }
    }

    async fn load(&self, key: &str) -> Result<Option<SessionBuffer>> {
        let start = Instant::now();
        let raw = self.kv.get(&self.storage_key(key)).await;
        let raw = self.observe(start, raw, StorageErrorCode::LoadFailed, || {
            format!("loading buffer for session {key}")
        })?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        match serde_json::from_str::<StoredBuffer>(&raw) {
            Ok(stored) => Ok(Some(SessionBuffer::from_records(key, stored.records))),
            Err(e) => {
                // unreadable entries are replaced rather than blocking the session forever
                error!(session_key = %key, error = %e, "Discarding corrupt stored buffer");
                metrics().storage_errors.inc();
                self.discarded.lock().push(DiscardedBuffer {
                    session_key: key.to_string(),
                    reason: e.to_string(),
                });
                Ok(Some(SessionBuffer::new(key)))
            }
        }
    }

    async fn save(&self, key: &str, buffer: &SessionBuffer) -> Result<()> {
        let value = serde_json::to_string(&StoredBuffer::from(buffer))?;

        let start = Instant::now();
        let result = self.kv.put(&self.storage_key(key), value).await;
        self.observe(start, result, StorageErrorCode::SaveFailed, || {
            format!("saving buffer for session {key}")
        })
    }
}

#[async_trait]
impl BufferStore for DurableStore {
    fn mode(&self) -> StorageMode {
        StorageMode::Durable
    }

    async fn append(&self, key: &str, record: LogRecord) -> Result<BufferStats> {
        let _guard = self.locks.lock(key).await;

        let mut buffer = self
            .load(key)
            .await?
            .unwrap_or_else(|| SessionBuffer::new(key));
        let stats = buffer.append(record);
        self.save(key, &buffer).await?;

        debug!(session_key = %key, count = stats.count, "Appended record to durable buffer");
        Ok(stats)
    }

    async fn peek_stats(&self, key: &str) -> Result<BufferStats> {
        let _guard = self.locks.lock(key).await;
        Ok(self
            .load(key)
            .await?
            .map(|b| b.peek_stats())
            .unwrap_or_default())
    }

    async fn snapshot_and_clear(&self, key: &str) -> Result<Batch> {
        let _guard = self.locks.lock(key).await;

        let Some(mut buffer) = self.load(key).await? else {
            return Ok(Batch::empty(key));
        };
        let batch = buffer.snapshot_and_clear();
        if !batch.is_empty() {
            self.save(key, &buffer).await?;
        }
        Ok(batch)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        {
            let _guard = self.locks.lock(key).await;

            // records appended after the snapshot must survive the delete
            if let Some(buffer) = self.load(key).await? {
                if !buffer.is_empty() {
                    debug!(session_key = %key, count = buffer.len(), "Keeping non-empty durable buffer");
                    return Ok(());
                }
            }

            let start = Instant::now();
            let result = self.kv.delete(&self.storage_key(key)).await;
            self.observe(start, result, StorageErrorCode::DeleteFailed, || {
                format!("deleting buffer for session {key}")
            })?;
        }
        self.locks.forget(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let start = Instant::now();
        let result = self.kv.get(&self.storage_key(key)).await;
        self.observe(start, result, StorageErrorCode::LoadFailed, || {
            format!("checking buffer for session {key}")
        })
        .map(|v| v.is_some())
    }
}
