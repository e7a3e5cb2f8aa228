//! Buffer store capability interface.

use async_trait::async_trait;
use batch_core::{Batch, BufferStats, LogRecord, Result, StorageMode};

/// Keyed collection of session buffers.
///
/// The store owns every buffer; callers only ever see stats or drained
/// batches, never a live reference.
#[async_trait]
pub trait BufferStore: Send + Sync {
    /// Which storage mode this store serves.
    fn mode(&self) -> StorageMode;

    /// Appends one record, creating the buffer on first use.
    async fn append(&self, key: &str, record: LogRecord) -> Result<BufferStats>;

    /// Current stats without mutating anything.
    async fn peek_stats(&self, key: &str) -> Result<BufferStats>;

    /// Atomically takes every record and leaves the buffer empty.
    async fn snapshot_and_clear(&self, key: &str) -> Result<Batch>;

    /// Removes persisted state once drained. No-op for volatile stores.
    async fn delete(&self, key: &str) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;
}
