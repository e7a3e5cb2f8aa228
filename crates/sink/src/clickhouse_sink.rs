//! ClickHouse sink.

use async_trait::async_trait;
use batch_core::{error::SinkErrorCode, Batch, Error, LogRecord, Result};
use chrono::Utc;
use clickhouse::{Client, Row};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::time::Instant;
use telemetry::{health, metrics};
use tracing::{debug, error, info};

use crate::config::ClickHouseConfig;
use crate::schema;
use crate::sink::{BulkSink, PushReceipt};

/// One log row as inserted.
#[derive(Debug, Clone, Row, Serialize)]
pub struct LogRow {
    pub session_id: String,
    pub timestamp: i64, // milliseconds since epoch
    pub level: &'static str,
    pub level_code: &'static str,
    pub message: String,
    pub line: String,
    pub ingested_at: i64,
}

impl LogRow {
    pub fn new(session_id: &str, record: &LogRecord, ingested_at: i64) -> Self {
        Self {
            session_id: session_id.to_string(),
            timestamp: record.timestamp().timestamp_millis(),
            level: record.level().as_str(),
            level_code: record.level().short_code(),
            message: record.message().to_string(),
            line: record.render_line(session_id),
            ingested_at,
        }
    }
}

/// Inserts each batch into a table named after the sink target.
pub struct ClickHouseSink {
    client: Client,
    config: ClickHouseConfig,
    /// Tables already created by this process
    created: Mutex<HashSet<String>>,
}

impl ClickHouseSink {
    pub fn new(config: ClickHouseConfig) -> Result<Self> {
        if !schema::is_valid_identifier(&config.database) {
            return Err(Error::configuration(format!(
                "invalid clickhouse database name '{}'",
                config.database
            )));
        }

        let mut client = Client::default()
            .with_url(&config.url)
            .with_database(&config.database);

        if let Some(ref user) = config.username {
            client = client.with_user(user);
        }

        if let Some(ref pass) = config.password {
            client = client.with_password(pass);
        }

        info!(
            url = %config.url,
            database = %config.database,
            "Created ClickHouse sink"
        );

        Ok(Self {
            client,
            config,
            created: Mutex::new(HashSet::new()),
        })
    }

    async fn ensure_table(&self, table: &str) -> Result<()> {
        if !self.config.create_tables || self.created.lock().contains(table) {
            return Ok(());
        }

        for ddl in [
            schema::create_database(&self.config.database),
            schema::create_log_table(&self.config.database, table),
        ] {
            self.client.query(&ddl).execute().await.map_err(|e| {
                Error::sink(SinkErrorCode::Rejected, format!("creating table {table}: {e}"))
            })?;
        }

        self.created.lock().insert(table.to_string());
        debug!(table = %table, "ClickHouse log table ready");
        Ok(())
    }

    async fn insert(&self, table: &str, batch: &Batch) -> Result<()> {
        let ingested_at = Utc::now().timestamp_millis();

        let mut insert = self.client.insert(table).map_err(|e| {
            Error::sink(SinkErrorCode::Unreachable, format!("insert error: {e}"))
        })?;

        for record in &batch.records {
            let row = LogRow::new(&batch.session_key, record, ingested_at);
            insert.write(&row).await.map_err(|e| {
                Error::sink(SinkErrorCode::Rejected, format!("write error: {e}"))
            })?;
        }

        insert.end().await.map_err(|e| {
            Error::sink(SinkErrorCode::Rejected, format!("end error: {e}"))
        })
    }
}

#[async_trait]
impl BulkSink for ClickHouseSink {
    fn name(&self) -> &'static str {
        "clickhouse"
    }

    async fn push(&self, batch: &Batch, target: &str) -> Result<PushReceipt> {
        if batch.is_empty() {
            return Ok(PushReceipt {
                records: 0,
                latency_ms: 0,
            });
        }
        if !schema::is_valid_identifier(target) {
            return Err(Error::sink(
                SinkErrorCode::Rejected,
                format!("'{target}' is not a valid table name"),
            ));
        }

        let start = Instant::now();
        self.ensure_table(target).await?;
        if let Err(e) = self.insert(target, batch).await {
            health().sink.set_unhealthy(e.to_string());
            return Err(e);
        }

        let latency_ms = start.elapsed().as_millis() as u64;
        metrics().sink_push_latency_ms.observe(latency_ms);
        health().sink.set_healthy();

        debug!(
            session_key = %batch.session_key,
            table = %target,
            count = batch.len(),
            latency_ms = latency_ms,
            "Inserted batch into ClickHouse"
        );

        Ok(PushReceipt {
            records: batch.len(),
            latency_ms,
        })
    }

    async fn ping(&self) -> bool {
        match self.client.query("SELECT 1").fetch_one::<u8>().await {
            Ok(_) => true,
            Err(e) => {
                error!("ClickHouse health check failed: {}", e);
                false
            }
        }
    }
}
