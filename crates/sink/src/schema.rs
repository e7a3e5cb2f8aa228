//! ClickHouse log table schema.
//!
//! One table per sink target:
//! - ORDER BY (session_id, timestamp) keeps a session's records together
//! - LowCardinality for the level columns
//! - DateTime64(3) for millisecond precision

/// Template for a per-target log table. `{database}` and `{table}` are
/// substituted by [`create_log_table`].
const LOG_TABLE_TEMPLATE: &str = r#"
CREATE TABLE IF NOT EXISTS {database}.{table} (
    session_id String,
    timestamp DateTime64(3),
    level LowCardinality(String),
    level_code LowCardinality(String),
    message String,
    line String,
    ingested_at DateTime64(3)
)
ENGINE = MergeTree()
PARTITION BY toYYYYMM(timestamp)
ORDER BY (session_id, timestamp)
SETTINGS index_granularity = 8192
"#;

/// Whether `name` is a safe unquoted ClickHouse identifier.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 255 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// DDL for the log table backing `table`.
pub fn create_log_table(database: &str, table: &str) -> String {
    LOG_TABLE_TEMPLATE
        .replace("{database}", database)
        .replace("{table}", table)
}

/// DDL for the database itself.
pub fn create_database(database: &str) -> String {
    format!("CREATE DATABASE IF NOT EXISTS {database}")
}
