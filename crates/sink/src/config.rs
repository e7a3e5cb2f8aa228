//! Sink configuration.

use serde::{Deserialize, Serialize};

/// Which backend receives flushed batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[default]
    Elasticsearch,
    Clickhouse,
}

/// Sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(default)]
    pub kind: SinkKind,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub elasticsearch: ElasticsearchConfig,
    #[serde(default)]
    pub clickhouse: ClickHouseConfig,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: SinkKind::default(),
            timeout_secs: default_timeout_secs(),
            elasticsearch: ElasticsearchConfig::default(),
            clickhouse: ClickHouseConfig::default(),
        }
    }
}

/// Elasticsearch bulk API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticsearchConfig {
    /// Cluster base URL
    #[serde(default = "default_es_url")]
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Index lifecycle policy applied to targets after a successful push
    pub lifecycle_policy: Option<String>,
    /// Refresh the index after each bulk write (`refresh=true`)
    #[serde(default)]
    pub refresh: bool,
}

fn default_es_url() -> String {
    "http://localhost:9200".to_string()
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: default_es_url(),
            username: None,
            password: None,
            lifecycle_policy: None,
            refresh: false,
        }
    }
}

/// ClickHouse client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickHouseConfig {
    /// ClickHouse HTTP URL
    #[serde(default = "default_ch_url")]
    pub url: String,
    /// Database name
    #[serde(default = "default_database")]
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Create log tables on first push to a target
    #[serde(default = "default_true")]
    pub create_tables: bool,
}

fn default_ch_url() -> String {
    "http://localhost:8123".to_string()
}

fn default_database() -> String {
    "logs".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: default_ch_url(),
            database: default_database(),
            username: None,
            password: None,
            create_tables: true,
        }
    }
}
