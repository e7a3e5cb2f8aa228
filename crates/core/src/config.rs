//! Per-session logger configuration.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{Error, RecordErrorCode, Result};

/// Where a session's buffer lives between appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// Process memory; lives as long as the process.
    #[default]
    Volatile,
    /// External key-value store; loaded and saved around every mutation.
    Durable,
}

/// What the elapsed-time trigger measures from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushWindow {
    /// Time since the earliest record currently buffered.
    #[default]
    SinceFirstRecord,
    /// Time since the session started, regardless of buffer contents.
    SinceSessionStart,
}

/// How the count trigger compares against the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountMatch {
    /// Flush when the count equals the threshold.
    #[default]
    Exact,
    /// Flush when the count reached or passed the threshold.
    AtLeast,
}

/// Flush settings for one session. Read-only once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoggerConfiguration {
    /// Session or registration id
    #[validate(length(min = 1, max = 256))]
    pub session_id: String,
    /// Records per flush (0 = disabled)
    #[serde(default)]
    pub flush_count: u32,
    /// Elapsed time before a flush (0 = disabled), serialized as seconds
    #[serde(default, with = "duration_secs")]
    pub flush_after: Duration,
    /// Index or table name
    #[validate(length(min = 1, max = 255))]
    pub sink_target: String,
    #[serde(default)]
    pub storage_mode: StorageMode,
    #[serde(default)]
    pub flush_window: FlushWindow,
    #[serde(default)]
    pub count_match: CountMatch,
    #[serde(default)]
    pub session_started_at: Option<DateTime<Utc>>,
}

impl LoggerConfiguration {
    pub fn new(session_id: impl Into<String>, sink_target: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            flush_count: 0,
            flush_after: Duration::ZERO,
            sink_target: sink_target.into(),
            storage_mode: StorageMode::default(),
            flush_window: FlushWindow::default(),
            count_match: CountMatch::default(),
            session_started_at: None,
        }
    }

    pub fn with_flush_count(mut self, count: u32) -> Self {
        self.flush_count = count;
        self
    }

    pub fn with_flush_after(mut self, after: Duration) -> Self {
        self.flush_after = after;
        self
    }

    pub fn with_storage_mode(mut self, mode: StorageMode) -> Self {
        self.storage_mode = mode;
        self
    }

    pub fn with_flush_window(mut self, window: FlushWindow) -> Self {
        self.flush_window = window;
        self
    }

    pub fn with_count_match(mut self, count_match: CountMatch) -> Self {
        self.count_match = count_match;
        self
    }

    pub fn with_session_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.session_started_at = Some(started_at);
        self
    }

    /// Returns a copy bound to another session id.
    pub fn for_session(&self, session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..self.clone()
        }
    }

    /// No thresholds configured: records bypass buffering.
    pub fn is_immediate(&self) -> bool {
        self.flush_count == 0 && self.flush_after.is_zero()
    }

    pub fn is_durable(&self) -> bool {
        self.storage_mode == StorageMode::Durable
    }

    /// Runs field validation, reporting failures as a rejected record.
    pub fn validated(self) -> Result<Self> {
        self.validate().map_err(|e| {
            Error::invalid_record(
                RecordErrorCode::MalformedEnvelope,
                format!("invalid logger configuration: {}", e),
            )
        })?;
        Ok(self)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
