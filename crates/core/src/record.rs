//! Log records and the raw tuples transports deliver.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::LoggerConfiguration;
use crate::error::{Error, RecordErrorCode, Result};
use crate::limits::{MAX_FUTURE_SKEW_SECS, MAX_MESSAGE_BYTES, MAX_SESSION_KEY_LEN};

/// Timestamp layout used on the queue wire and in rendered lines.
pub const LINE_TIMESTAMP_FORMAT: &str = "%d-%m-%Y %H:%M:%S";

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Information,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// Four-letter code used in rendered lines.
    pub fn short_code(&self) -> &'static str {
        match self {
            Self::Trace => "TRCE",
            Self::Debug => "DBUG",
            Self::Information => "INFO",
            Self::Warning => "WARN",
            Self::Error => "FAIL",
            Self::Critical => "CRIT",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Information => "information",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" | "trce" => Ok(Self::Trace),
            "debug" | "dbug" => Ok(Self::Debug),
            "information" | "info" => Ok(Self::Information),
            "warning" | "warn" => Ok(Self::Warning),
            "error" | "err" | "fail" => Ok(Self::Error),
            "critical" | "crit" | "fatal" => Ok(Self::Critical),
            other => Err(Error::invalid_record(
                RecordErrorCode::InvalidLevel,
                format!("unknown log level '{}'", other),
            )),
        }
    }
}

/// One buffered log line. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    message: String,
    level: LogLevel,
    timestamp: DateTime<Utc>,
}

impl LogRecord {
    pub fn new(message: impl Into<String>, level: LogLevel, timestamp: DateTime<Utc>) -> Self {
        Self {
            message: message.into(),
            level,
            timestamp,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Tab-separated human-readable line for this record.
    pub fn render_line(&self, session_key: &str) -> String {
        format!(
            "{}\t{}\t[Session ID: {}]\t[Message: {}]",
            self.timestamp.format(LINE_TIMESTAMP_FORMAT),
            self.level.short_code(),
            session_key,
            self.message
        )
    }
}

/// A record exactly as a transport hands it over, before normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRecord {
    #[serde(default)]
    pub session_key: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub level: Option<String>,
    /// RFC 3339 or `dd-MM-yyyy HH:mm:ss` (UTC). Absent means "now".
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Flush settings carried alongside the record by stateless transports.
    #[serde(default)]
    pub configuration: Option<LoggerConfiguration>,
}

impl RawRecord {
    pub fn new(session_key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            session_key: Some(session_key.into()),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn with_configuration(mut self, configuration: LoggerConfiguration) -> Self {
        self.configuration = Some(configuration);
        self
    }

    /// Validates and converts into a session key plus an immutable record.
    pub fn normalize(&self, now: DateTime<Utc>) -> Result<(String, LogRecord)> {
        let session_key = normalize_session_key(self.session_key.as_deref())?;

        let message = self.message.trim_end();
        if message.trim().is_empty() {
            return Err(Error::invalid_record(
                RecordErrorCode::InvalidMessage,
                "message is blank",
            ));
        }
        if message.len() > MAX_MESSAGE_BYTES {
            return Err(Error::invalid_record(
                RecordErrorCode::InvalidMessage,
                format!(
                    "message size {}B exceeds {}B limit",
                    message.len(),
                    MAX_MESSAGE_BYTES
                ),
            ));
        }

        let level = match self.level.as_deref() {
            Some(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ => LogLevel::default(),
        };

        let timestamp = match self.timestamp.as_deref() {
            Some(raw) if !raw.trim().is_empty() => parse_timestamp(raw)?,
            _ => now,
        };
        if (timestamp - now).num_seconds() > MAX_FUTURE_SKEW_SECS {
            return Err(Error::invalid_record(
                RecordErrorCode::MalformedTimestamp,
                format!("timestamp {} is in the future", timestamp.to_rfc3339()),
            ));
        }

        Ok((session_key, LogRecord::new(message, level, timestamp)))
    }
}

/// Trims and validates a session key.
pub fn normalize_session_key(raw: Option<&str>) -> Result<String> {
    let key = raw.map(str::trim).unwrap_or_default();
    if key.is_empty() {
        return Err(Error::invalid_record(
            RecordErrorCode::MissingSessionKey,
            "session key is required",
        ));
    }
    if key.chars().count() > MAX_SESSION_KEY_LEN {
        return Err(Error::invalid_record(
            RecordErrorCode::InvalidSessionKey,
            format!("session key exceeds {} chars", MAX_SESSION_KEY_LEN),
        ));
    }
    if key.chars().any(char::is_control) {
        return Err(Error::invalid_record(
            RecordErrorCode::InvalidSessionKey,
            "session key contains control characters",
        ));
    }
    Ok(key.to_string())
}

/// Parses RFC 3339 or the line format (`dd-MM-yyyy HH:mm:ss`, UTC).
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, LINE_TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| {
            Error::invalid_record(
                RecordErrorCode::MalformedTimestamp,
                format!("cannot parse timestamp '{}': {}", raw, e),
            )
        })
}
