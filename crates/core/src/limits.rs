//! Size and time limits applied to inbound records.
//!
//! Records are rejected as `InvalidRecord` before they reach a buffer,
//! so a single oversized message can never grow a session's durable
//! entry past what the key-value store accepts.

// === Record Limits ===

/// Maximum message size in bytes (32KB).
pub const MAX_MESSAGE_BYTES: usize = 32 * 1024;

/// Session key max length (chars).
/// UUIDs=36, registration ids up to a few dozen.
pub const MAX_SESSION_KEY_LEN: usize = 256;

/// Sink target (index or table name) max length.
/// Elasticsearch caps index names at 255 bytes.
pub const MAX_SINK_TARGET_LEN: usize = 255;

// === Transport Limits ===

/// Maximum records accepted by one HTTP batch request.
pub const MAX_HTTP_BATCH_RECORDS: usize = 1000;

// === Timestamp Bounds ===

/// Maximum allowed clock skew for future timestamps (seconds).
pub const MAX_FUTURE_SKEW_SECS: i64 = 5;
