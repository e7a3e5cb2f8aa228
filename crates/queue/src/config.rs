//! Queue consumer configuration.

use serde::{Deserialize, Serialize};

/// Where a fresh consumer starts reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartOffset {
    Earliest,
    #[default]
    Latest,
}

/// Message-queue trigger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Whether the consumer runs at all
    #[serde(default)]
    pub enabled: bool,
    /// Broker addresses
    #[serde(default = "default_brokers")]
    pub brokers: Vec<String>,
    /// Topic carrying log messages
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Partition to read
    #[serde(default)]
    pub partition: i32,
    /// Expected messages per fetch, used to size the fetch window
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Max wait for a fetch in milliseconds
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
    #[serde(default)]
    pub start_offset: StartOffset,
    /// SASL username (enables TLS + SCRAM-SHA-256 together with the password)
    #[serde(default)]
    pub sasl_username: Option<String>,
    #[serde(default)]
    pub sasl_password: Option<String>,
}

fn default_brokers() -> Vec<String> {
    vec!["localhost:9092".to_string()]
}

fn default_topic() -> String {
    "session-logs".to_string()
}

fn default_batch_size() -> usize {
    500
}

fn default_batch_timeout_ms() -> u64 {
    1000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            brokers: default_brokers(),
            topic: default_topic(),
            partition: 0,
            batch_size: default_batch_size(),
            batch_timeout_ms: default_batch_timeout_ms(),
            start_offset: StartOffset::default(),
            sasl_username: None,
            sasl_password: None,
        }
    }
}

impl QueueConfig {
    /// Returns the broker list as a comma-separated string.
    pub fn broker_string(&self) -> String {
        self.brokers.join(",")
    }

    /// Upper bound for one fetch, assuming ~16KB per message.
    pub fn max_fetch_bytes(&self) -> i32 {
        let bytes = self.batch_size.max(1).saturating_mul(16 * 1024);
        i32::try_from(bytes).unwrap_or(i32::MAX)
    }

    pub fn uses_sasl(&self) -> bool {
        self.sasl_username.is_some() && self.sasl_password.is_some()
    }
}
