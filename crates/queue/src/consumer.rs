//! rskafka-backed record source.
//!
//! Single-partition reader with manual offset tracking: the worker commits
//! the next offset to read once a prefix of the fetched records is done.

use async_trait::async_trait;
use batch_core::{Error, Result};
use rskafka::client::{
    partition::{OffsetAt, PartitionClient, UnknownTopicHandling},
    ClientBuilder, Credentials, SaslConfig,
};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use telemetry::metrics;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::config::{QueueConfig, StartOffset};

/// One fetched queue record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRecord {
    pub offset: i64,
    pub value: Option<Vec<u8>>,
}

impl QueueRecord {
    pub fn new(offset: i64, value: impl Into<Vec<u8>>) -> Self {
        Self {
            offset,
            value: Some(value.into()),
        }
    }
}

/// Source of queue records with explicit offset commits.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Human-readable name for logs.
    fn describe(&self) -> String;

    /// Fetches the next records after the committed offset.
    async fn fetch(&self) -> Result<Vec<QueueRecord>>;

    /// Marks everything before `next_offset` as done.
    async fn commit(&self, next_offset: i64) -> Result<()>;

    /// Drops any cached connection after an error.
    async fn reset(&self) {}
}

fn create_tls_config() -> Arc<rustls::ClientConfig> {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Arc::new(config)
}

fn queue_error(context: &str, e: impl std::fmt::Display) -> Error {
    metrics().queue_errors.inc();
    Error::internal(format!("{}: {}", context, e))
}

/// Kafka-compatible consumer for the log topic.
pub struct QueueConsumer {
    config: QueueConfig,
    partition_client: RwLock<Option<Arc<PartitionClient>>>,
    /// Next offset to read
    current_offset: AtomicI64,
    initialized: AtomicBool,
}

impl QueueConsumer {
    pub fn new(config: QueueConfig) -> Self {
        info!(
            topic = %config.topic,
            partition = config.partition,
            brokers = %config.broker_string(),
            "Creating queue consumer"
        );

        Self {
            config,
            partition_client: RwLock::new(None),
            current_offset: AtomicI64::new(-1),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn current_offset(&self) -> i64 {
        self.current_offset.load(Ordering::SeqCst)
    }

    async fn ensure_connected(&self) -> Result<Arc<PartitionClient>> {
        {
            let client = self.partition_client.read().await;
            if let Some(ref c) = *client {
                return Ok(c.clone());
            }
        }

        let mut builder = ClientBuilder::new(self.config.brokers.clone());

        if let (Some(username), Some(password)) =
            (&self.config.sasl_username, &self.config.sasl_password)
        {
            builder = builder
                .tls_config(create_tls_config())
                .sasl_config(SaslConfig::ScramSha256(Credentials::new(
                    username.clone(),
                    password.clone(),
                )));
        }

        let client = builder
            .build()
            .await
            .map_err(|e| queue_error("failed to connect to brokers", e))?;

        let partition_client = client
            .partition_client(
                self.config.topic.clone(),
                self.config.partition,
                UnknownTopicHandling::Error,
            )
            .await
            .map_err(|e| queue_error("failed to get partition client", e))?;
        let partition_client = Arc::new(partition_client);

        if !self.initialized.load(Ordering::SeqCst) {
            let at = match self.config.start_offset {
                StartOffset::Earliest => OffsetAt::Earliest,
                StartOffset::Latest => OffsetAt::Latest,
            };
            let offset = partition_client
                .get_offset(at)
                .await
                .map_err(|e| queue_error("failed to get start offset", e))?;

            self.current_offset.store(offset, Ordering::SeqCst);
            self.initialized.store(true, Ordering::SeqCst);

            info!(
                topic = %self.config.topic,
                partition = self.config.partition,
                offset = offset,
                "Queue consumer initialized at offset"
            );
        }

        *self.partition_client.write().await = Some(partition_client.clone());
        Ok(partition_client)
    }

    /// Checks that the partition is reachable.
    pub async fn health_check(&self) -> bool {
        match self.ensure_connected().await {
            Ok(_) => true,
            Err(e) => {
                error!(error = %e, "Queue consumer health check failed");
                false
            }
        }
    }
}

#[async_trait]
impl RecordSource for QueueConsumer {
    fn describe(&self) -> String {
        format!("{}[{}]", self.config.topic, self.config.partition)
    }

    async fn fetch(&self) -> Result<Vec<QueueRecord>> {
        let client = self.ensure_connected().await?;
        let current = self.current_offset();
        let max_wait_ms = i32::try_from(self.config.batch_timeout_ms).unwrap_or(i32::MAX);

        let (records, high_watermark) = client
            .fetch_records(current, 1..self.config.max_fetch_bytes(), max_wait_ms)
            .await
            .map_err(|e| queue_error("failed to fetch records", e))?;

        let fetched: Vec<QueueRecord> = records
            .into_iter()
            .filter(|r| r.offset >= current)
            .map(|r| QueueRecord {
                offset: r.offset,
                value: r.record.value,
            })
            .collect();

        let next = fetched.last().map(|r| r.offset + 1).unwrap_or(current);
        metrics()
            .queue_lag
            .set(u64::try_from(high_watermark - next).unwrap_or(0));

        if !fetched.is_empty() {
            debug!(
                records = fetched.len(),
                offset_start = current,
                offset_end = next - 1,
                high_watermark = high_watermark,
                "Fetched queue records"
            );
        }
        Ok(fetched)
    }

    async fn commit(&self, next_offset: i64) -> Result<()> {
        let prev = self.current_offset.swap(next_offset, Ordering::SeqCst);
        debug!(prev_offset = prev, new_offset = next_offset, "Committed offset");
        Ok(())
    }

    async fn reset(&self) {
        *self.partition_client.write().await = None;
        info!("Queue consumer connection reset");
    }
}
