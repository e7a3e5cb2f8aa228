//! Process-local buffer store.

use async_trait::async_trait;
use batch_core::{Batch, BufferStats, LogRecord, Result, SessionBuffer, StorageMode};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

use crate::store::BufferStore;

/// In-memory buffers keyed by session.
///
/// Each buffer has its own mutex, so appends to different sessions never
/// contend beyond the brief map lookup. Cleared buffers stay in the map and
/// are reused by later appends.
#[derive(Default)]
pub struct VolatileStore {
    buffers: RwLock<HashMap<String, Arc<Mutex<SessionBuffer>>>>,
}

impl VolatileStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn buffer(&self, key: &str) -> Option<Arc<Mutex<SessionBuffer>>> {
        self.buffers.read().get(key).cloned()
    }

    fn buffer_or_create(&self, key: &str) -> Arc<Mutex<SessionBuffer>> {
        if let Some(buffer) = self.buffer(key) {
            return buffer;
        }
        let mut buffers = self.buffers.write();
        buffers
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(SessionBuffer::new(key))))
            .clone()
    }

    /// Keys whose buffers currently hold records.
    pub fn non_empty_keys(&self) -> Vec<String> {
        self.buffers
            .read()
            .iter()
            .filter(|(_, buffer)| !buffer.lock().is_empty())
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Number of session buffers ever created.
    pub fn session_count(&self) -> usize {
        self.buffers.read().len()
    }

    /// Total records buffered across all sessions.
    pub fn buffered_records(&self) -> usize {
        self.buffers.read().values().map(|b| b.lock().len()).sum()
    }
}

#[async_trait]
impl BufferStore for VolatileStore {
    fn mode(&self) -> StorageMode {
        StorageMode::Volatile
    }

    async fn append(&self, key: &str, record: LogRecord) -> Result<BufferStats> {
        let buffer = self.buffer_or_create(key);
        let stats = buffer.lock().append(record);
        Ok(stats)
    }

    async fn peek_stats(&self, key: &str) -> Result<BufferStats> {
        Ok(self
            .buffer(key)
            .map(|b| b.lock().peek_stats())
            .unwrap_or_default())
    }

    async fn snapshot_and_clear(&self, key: &str) -> Result<Batch> {
        Ok(match self.buffer(key) {
            Some(buffer) => buffer.lock().snapshot_and_clear(),
            None => Batch::empty(key),
        })
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.buffers.read().contains_key(key))
    }
}
