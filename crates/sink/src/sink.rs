//! Bulk sink interface.

use async_trait::async_trait;
use batch_core::{Batch, LogRecord, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::clickhouse_sink::ClickHouseSink;
use crate::config::{SinkConfig, SinkKind};
use crate::elasticsearch::ElasticsearchSink;

/// Outcome of an accepted bulk push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushReceipt {
    pub records: usize,
    pub latency_ms: u64,
}

/// Backend that accepts a whole batch in one bulk operation.
///
/// Implementations route every record by the batch's session key and never
/// retry. Errors are `Error::SinkPushFailed` carrying the backend's
/// diagnostic text.
#[async_trait]
pub trait BulkSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn push(&self, batch: &Batch, target: &str) -> Result<PushReceipt>;

    /// Cheap reachability probe for health reporting.
    async fn ping(&self) -> bool {
        true
    }
}

/// Document shape written for each record.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogDocument<'a> {
    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,
    pub session_id: &'a str,
    pub level: &'static str,
    pub level_code: &'static str,
    pub message: &'a str,
    pub line: String,
}

impl<'a> LogDocument<'a> {
    pub fn new(session_id: &'a str, record: &'a LogRecord) -> Self {
        Self {
            timestamp: record.timestamp(),
            session_id,
            level: record.level().as_str(),
            level_code: record.level().short_code(),
            message: record.message(),
            line: record.render_line(session_id),
        }
    }
}

/// Builds the sink selected by `config.kind`.
pub fn build_sink(config: &SinkConfig) -> Result<Arc<dyn BulkSink>> {
    let timeout = Duration::from_secs(config.timeout_secs);
    Ok(match config.kind {
        SinkKind::Elasticsearch => {
            Arc::new(ElasticsearchSink::new(config.elasticsearch.clone(), timeout)?)
        }
        SinkKind::Clickhouse => Arc::new(ClickHouseSink::new(config.clickhouse.clone())?),
    })
}
