//! Unified error types for the session batcher.
//!
//! Error codes:
//! - STORE_001-003: Durable buffer storage errors
//! - SINK_001-002: Bulk sink errors
//! - RECORD_001-006: Rejected records

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Storage error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorCode {
    /// STORE_001: Buffer could not be loaded
    LoadFailed,
    /// STORE_002: Buffer could not be saved
    SaveFailed,
    /// STORE_003: Buffer entry could not be removed
    DeleteFailed,
}

impl StorageErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::LoadFailed => "STORE_001",
            Self::SaveFailed => "STORE_002",
            Self::DeleteFailed => "STORE_003",
        }
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> u16 {
        503
    }
}

/// Sink error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkErrorCode {
    /// SINK_001: Backend rejected the bulk request
    Rejected,
    /// SINK_002: Backend could not be reached
    Unreachable,
}

impl SinkErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Rejected => "SINK_001",
            Self::Unreachable => "SINK_002",
        }
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> u16 {
        502
    }
}

/// Record rejection codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordErrorCode {
    /// RECORD_001: Session key missing or blank
    MissingSessionKey,
    /// RECORD_002: Session key too long or contains control characters
    InvalidSessionKey,
    /// RECORD_003: Timestamp could not be parsed or is in the future
    MalformedTimestamp,
    /// RECORD_004: Unknown log level
    InvalidLevel,
    /// RECORD_005: Message blank or too large
    InvalidMessage,
    /// RECORD_006: Carried configuration failed validation or queue message malformed
    MalformedEnvelope,
}

impl RecordErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingSessionKey => "RECORD_001",
            Self::InvalidSessionKey => "RECORD_002",
            Self::MalformedTimestamp => "RECORD_003",
            Self::InvalidLevel => "RECORD_004",
            Self::InvalidMessage => "RECORD_005",
            Self::MalformedEnvelope => "RECORD_006",
        }
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> u16 {
        400
    }
}

/// Unified error type for the session batcher.
#[derive(Debug, Error)]
pub enum Error {
    /// Durable load/save failed; the record was not buffered.
    #[error("[{code}] storage unavailable: {message}")]
    StorageUnavailable {
        code: &'static str,
        message: String,
        http_status: u16,
    },

    /// Bulk write rejected or backend unreachable; the batch is dropped.
    #[error("[{code}] sink push failed: {message}")]
    SinkPushFailed {
        code: &'static str,
        message: String,
        http_status: u16,
    },

    /// Record rejected before buffering.
    #[error("[{code}] invalid record: {message}")]
    InvalidRecord {
        code: &'static str,
        message: String,
        http_status: u16,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a storage error.
    pub fn storage(code: StorageErrorCode, msg: impl Into<String>) -> Self {
        Self::StorageUnavailable {
            code: code.code(),
            message: msg.into(),
            http_status: code.http_status(),
        }
    }

    /// Create a sink error.
    pub fn sink(code: SinkErrorCode, msg: impl Into<String>) -> Self {
        Self::SinkPushFailed {
            code: code.code(),
            message: msg.into(),
            http_status: code.http_status(),
        }
    }

    /// Create a record rejection.
    pub fn invalid_record(code: RecordErrorCode, msg: impl Into<String>) -> Self {
        Self::InvalidRecord {
            code: code.code(),
            message: msg.into(),
            http_status: code.http_status(),
        }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Get the HTTP status code for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::StorageUnavailable { http_status, .. } => *http_status,
            Self::SinkPushFailed { http_status, .. } => *http_status,
            Self::InvalidRecord { http_status, .. } => *http_status,
            Self::Configuration(_) => 500,
            Self::Serialization(_) => 400,
            Self::Internal(_) => 500,
        }
    }

    /// Get the error code if this is a coded error.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::StorageUnavailable { code, .. } => Some(code),
            Self::SinkPushFailed { code, .. } => Some(code),
            Self::InvalidRecord { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Whether the transport should redeliver the inbound record.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable { .. } | Self::Internal(_))
    }

    pub fn is_storage_unavailable(&self) -> bool {
        matches!(self, Self::StorageUnavailable { .. })
    }

    pub fn is_invalid_record(&self) -> bool {
        matches!(self, Self::InvalidRecord { .. })
    }
}
