//! Per-session record buffer and the batches drained from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::LogRecord;

/// Read-only statistics used for flush decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferStats {
    pub count: usize,
    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,
}

impl BufferStats {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Ordered, append-only records for one session key.
///
/// `count` is always the record count; timestamps are the earliest and
/// latest record timestamps and are both `None` exactly when empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionBuffer {
    key: String,
    records: Vec<LogRecord>,
    first_timestamp: Option<DateTime<Utc>>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl SessionBuffer {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            records: Vec::new(),
            first_timestamp: None,
            last_timestamp: None,
        }
    }

    /// Rebuilds a buffer from persisted records, recomputing statistics.
    pub fn from_records(key: impl Into<String>, records: Vec<LogRecord>) -> Self {
        let mut buffer = Self::new(key);
        for record in records {
            buffer.append(record);
        }
        buffer
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    /// Appends one record and returns the statistics it produced.
    pub fn append(&mut self, record: LogRecord) -> BufferStats {
        let ts = record.timestamp();
        self.first_timestamp = Some(self.first_timestamp.map_or(ts, |first| first.min(ts)));
        self.last_timestamp = Some(self.last_timestamp.map_or(ts, |last| last.max(ts)));
        self.records.push(record);
        self.peek_stats()
    }

    pub fn peek_stats(&self) -> BufferStats {
        BufferStats {
            count: self.records.len(),
            first_timestamp: self.first_timestamp,
            last_timestamp: self.last_timestamp,
        }
    }

    /// Takes every record and leaves the buffer empty.
    pub fn snapshot_and_clear(&mut self) -> Batch {
        Batch {
            session_key: self.key.clone(),
            records: std::mem::take(&mut self.records),
            first_timestamp: self.first_timestamp.take(),
            last_timestamp: self.last_timestamp.take(),
        }
    }
}

/// Immutable snapshot of a drained buffer, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub session_key: String,
    pub records: Vec<LogRecord>,
    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,
}

impl Batch {
    /// A batch holding one record, for the immediate path.
    pub fn single(session_key: impl Into<String>, record: LogRecord) -> Self {
        let ts = record.timestamp();
        Self {
            session_key: session_key.into(),
            records: vec![record],
            first_timestamp: Some(ts),
            last_timestamp: Some(ts),
        }
    }

    pub fn empty(session_key: impl Into<String>) -> Self {
        Self {
            session_key: session_key.into(),
            records: Vec::new(),
            first_timestamp: None,
            last_timestamp: None,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn messages(&self) -> Vec<&str> {
        self.records.iter().map(LogRecord::message).collect()
    }
}
