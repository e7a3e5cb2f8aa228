//! Pipe-delimited queue message codec.
//!
//! One record per message:
//!
//! ```text
//! <dd-MM-yyyy HH:mm:ss>|<sessionKey>|<message>|<flushCount>|<flushAfterMinutes>
//! ```
//!
//! The message may itself contain `|`, so the first two fields are split
//! from the left and the last two from the right. A leading `[LEVEL]` tag
//! inside the message sets the record level.

use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::config::LoggerConfiguration;
use crate::error::{Error, RecordErrorCode, Result};
use crate::record::{parse_timestamp, LogLevel, RawRecord, LINE_TIMESTAMP_FORMAT};

const SEPARATOR: char = '|';

static LEVEL_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^\[([A-Za-z]+)\]\s?(.*)$").expect("valid level tag regex"));

/// A decoded queue message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub timestamp: DateTime<Utc>,
    pub session_key: String,
    pub level: LogLevel,
    pub message: String,
    pub flush_count: u32,
    pub flush_after_minutes: u64,
}

impl QueueMessage {
    pub fn flush_after(&self) -> Duration {
        Duration::from_secs(self.flush_after_minutes.saturating_mul(60))
    }

    /// Converts into a transport record carrying its own flush settings.
    ///
    /// Settings the wire does not carry (sink target, storage mode) come
    /// from `defaults`.
    pub fn into_raw_record(self, defaults: &LoggerConfiguration) -> RawRecord {
        let configuration = defaults
            .for_session(self.session_key.clone())
            .with_flush_count(self.flush_count)
            .with_flush_after(self.flush_after());

        RawRecord::new(self.session_key, self.message)
            .with_level(self.level.as_str())
            .with_timestamp(self.timestamp.to_rfc3339())
            .with_configuration(configuration)
    }
}

fn malformed(msg: impl Into<String>) -> Error {
    Error::invalid_record(RecordErrorCode::MalformedEnvelope, msg)
}

/// Decodes one queue message body.
pub fn decode_queue_message(body: &str) -> Result<QueueMessage> {
    let mut head = body.splitn(3, SEPARATOR);
    let (Some(timestamp), Some(session_key), Some(rest)) = (head.next(), head.next(), head.next())
    else {
        return Err(malformed("queue message needs 5 '|'-separated fields"));
    };

    let mut tail = rest.rsplitn(3, SEPARATOR);
    let (Some(flush_after), Some(flush_count), Some(message)) = (tail.next(), tail.next(), tail.next())
    else {
        return Err(malformed("queue message needs 5 '|'-separated fields"));
    };

    let flush_count = flush_count
        .trim()
        .parse::<u32>()
        .map_err(|e| malformed(format!("invalid flush count '{}': {}", flush_count, e)))?;
    let flush_after_minutes = flush_after
        .trim()
        .parse::<u64>()
        .map_err(|e| malformed(format!("invalid flush-after '{}': {}", flush_after, e)))?;
    if flush_after_minutes.checked_mul(60).is_none() {
        return Err(malformed(format!(
            "flush-after of {} minutes is out of range",
            flush_after_minutes
        )));
    }

    let timestamp = parse_timestamp(timestamp)?;

    let (level, message) = match LEVEL_TAG.captures(message) {
        Some(caps) => match caps[1].parse::<LogLevel>() {
            Ok(level) => (level, caps[2].to_string()),
            Err(_) => (LogLevel::default(), message.to_string()),
        },
        None => (LogLevel::default(), message.to_string()),
    };

    Ok(QueueMessage {
        timestamp,
        session_key: session_key.trim().to_string(),
        level,
        message,
        flush_count,
        flush_after_minutes,
    })
}

/// Encodes a queue message body.
pub fn encode_queue_message(msg: &QueueMessage) -> String {
    format!(
        "{ts}{sep}{key}{sep}[{level}] {message}{sep}{count}{sep}{after}",
        ts = msg.timestamp.format(LINE_TIMESTAMP_FORMAT),
        key = msg.session_key,
        level = msg.level.short_code(),
        message = msg.message,
        count = msg.flush_count,
        after = msg.flush_after_minutes,
        sep = SEPARATOR,
    )
}
