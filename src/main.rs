//! Session Batcher
//!
//! Buffers log records per session and flushes them in bulk to a search
//! backend once a count or elapsed-time threshold is reached:
//! - HTTP transport (`POST /logs`, `POST /logs/batch`)
//! - Optional message-queue trigger (pipe-delimited messages)
//! - Volatile or durable session buffers
//! - Elasticsearch or ClickHouse bulk sink

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};

use api::{router, AppState};
use batch_core::SystemClock;
use buffer_store::{KvStore, MemoryKvStore};
use bulk_sink::{build_sink, SinkConfig, SinkKind};
use pipeline::{FlushScheduler, Ingestor, OperatorChannel, PipelineConfig, SchedulerConfig};
use queue::{QueueConfig, QueueConsumer, QueueWorker};
use telemetry::{health, init_tracing_from_env};

/// Durable buffer backend settings.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StoreConfig {
    /// Enables durable session buffers (in-process key-value backend)
    #[serde(default = "default_durable")]
    durable: bool,
}

fn default_durable() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            durable: default_durable(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct AppConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,

    #[serde(default)]
    sink: SinkConfig,

    #[serde(default)]
    store: StoreConfig,

    #[serde(default)]
    pipeline: PipelineConfig,

    #[serde(default)]
    queue: QueueConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            sink: SinkConfig::default(),
            store: StoreConfig::default(),
            pipeline: PipelineConfig::default(),
            queue: QueueConfig::default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // rustls 0.23 needs a process-wide crypto provider before any TLS use
    let provider_installed = rustls::crypto::ring::default_provider()
        .install_default()
        .is_ok();

    dotenvy::dotenv().ok();

    init_tracing_from_env();

    if !provider_installed {
        warn!("rustls crypto provider was already installed");
    }

    info!("Starting Session Batcher v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;

    info!(
        sink = ?config.sink.kind,
        target = %config.pipeline.default_session.sink_target,
        flush_count = config.pipeline.default_session.flush_count,
        flush_after_secs = config.pipeline.default_session.flush_after_secs,
        dispatch = ?config.pipeline.dispatch,
        durable = config.store.durable,
        queue_enabled = config.queue.enabled,
        "Loaded configuration"
    );

    let sink = build_sink(&config.sink).context("Failed to create bulk sink")?;
    check_health(&sink).await;

    let kv: Option<Arc<dyn KvStore>> = if config.store.durable {
        Some(Arc::new(MemoryKvStore::new()))
    } else {
        None
    };
    health().store.set_healthy();

    let diagnostics =
        Arc::new(OperatorChannel::new().with_webhook(config.pipeline.diagnostics_webhook.clone()));

    let ingestor = Arc::new(
        Ingestor::from_config(&config.pipeline, sink, kv, diagnostics, Arc::new(SystemClock))
            .context("Invalid default session configuration")?,
    );

    let scheduler = Arc::new(FlushScheduler::new(
        SchedulerConfig {
            sweep_interval: config.pipeline.sweep_interval(),
            sink_probe_interval: config.pipeline.sink_probe_interval(),
        },
        ingestor.clone(),
    ));
    let mut background = scheduler.start();

    if config.queue.enabled {
        let consumer = Arc::new(QueueConsumer::new(config.queue.clone()));
        let worker = QueueWorker::new(consumer, ingestor.clone());
        background.push(tokio::spawn(async move { worker.run().await }));
        info!(topic = %config.queue.topic, "Queue worker started");
    }

    let app = router(AppState::new(ingestor.clone()));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid server address")?;

    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down...");

    for handle in background {
        handle.abort();
    }

    // Volatile buffers do not survive the process
    let summary = ingestor.drain_all().await;
    if summary.records_lost > 0 {
        error!(
            records_lost = summary.records_lost,
            "Some buffered records could not be delivered on shutdown"
        );
    }

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<AppConfig> {
    let config = config::Config::builder()
        .add_source(config::Config::try_from(&AppConfig::default())?)
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("BATCHER")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: AppConfig = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    apply_env_overrides(&mut config)?;
    Ok(config)
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env_var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} is invalid: {}", name, e)),
        None => Ok(None),
    }
}

/// Flat overrides for nested fields.
///
/// The `config` crate lowercases environment keys and cannot address
/// fields containing underscores, so these are read explicitly.
fn apply_env_overrides(config: &mut AppConfig) -> Result<()> {
    let session = &mut config.pipeline.default_session;
    if let Some(count) = parse_env::<u32>("BATCHER_FLUSH_COUNT")? {
        session.flush_count = count;
    }
    if let Some(secs) = parse_env::<u64>("BATCHER_FLUSH_AFTER_SECS")? {
        session.flush_after_secs = secs;
    }
    if let Some(target) = env_var("BATCHER_SINK_TARGET") {
        session.sink_target = target;
    }
    if let Some(mode) = env_var("BATCHER_STORAGE_MODE") {
        session.storage_mode = serde_json::from_value(serde_json::Value::String(mode))
            .context("BATCHER_STORAGE_MODE must be 'volatile' or 'durable'")?;
    }
    if let Some(dispatch) = env_var("BATCHER_FLUSH_DISPATCH") {
        config.pipeline.dispatch = serde_json::from_value(serde_json::Value::String(dispatch))
            .context("BATCHER_FLUSH_DISPATCH must be 'inline' or 'background'")?;
    }
    if let Some(url) = env_var("BATCHER_DIAGNOSTICS_WEBHOOK") {
        config.pipeline.diagnostics_webhook = Some(url);
    }

    if let Some(kind) = env_var("BATCHER_SINK_KIND") {
        config.sink.kind = match kind.to_ascii_lowercase().as_str() {
            "elasticsearch" => SinkKind::Elasticsearch,
            "clickhouse" => SinkKind::Clickhouse,
            other => anyhow::bail!("BATCHER_SINK_KIND '{}' is not a known sink", other),
        };
    }
    if let Some(url) = env_var("BATCHER_ELASTICSEARCH_URL") {
        config.sink.elasticsearch.url = url;
    }
    if let Some(username) = env_var("BATCHER_ELASTICSEARCH_USERNAME") {
        config.sink.elasticsearch.username = Some(username);
    }
    if let Some(password) = env_var("BATCHER_ELASTICSEARCH_PASSWORD") {
        config.sink.elasticsearch.password = Some(password);
    }
    if let Some(policy) = env_var("BATCHER_LIFECYCLE_POLICY") {
        config.sink.elasticsearch.lifecycle_policy = Some(policy);
    }
    if let Some(url) = env_var("BATCHER_CLICKHOUSE_URL") {
        config.sink.clickhouse.url = url;
    }
    if let Some(database) = env_var("BATCHER_CLICKHOUSE_DATABASE") {
        config.sink.clickhouse.database = database;
    }
    if let Some(username) = env_var("BATCHER_CLICKHOUSE_USERNAME") {
        config.sink.clickhouse.username = Some(username);
    }
    if let Some(password) = env_var("BATCHER_CLICKHOUSE_PASSWORD") {
        config.sink.clickhouse.password = Some(password);
    }

    if let Some(enabled) = parse_env::<bool>("BATCHER_QUEUE_ENABLED")? {
        config.queue.enabled = enabled;
    }
    if let Some(brokers) = env_var("BATCHER_KAFKA_BROKERS") {
        config.queue.brokers = brokers.split(',').map(|s| s.trim().to_string()).collect();
    }
    if let Some(topic) = env_var("BATCHER_KAFKA_TOPIC") {
        config.queue.topic = topic;
    }
    if let Some(username) = env_var("BATCHER_KAFKA_SASL_USERNAME") {
        config.queue.sasl_username = Some(username);
    }
    if let Some(password) = env_var("BATCHER_KAFKA_SASL_PASSWORD") {
        config.queue.sasl_password = Some(password);
    }

    Ok(())
}

/// Probe the sink on startup.
async fn check_health(sink: &Arc<dyn bulk_sink::BulkSink>) {
    if sink.ping().await {
        health().sink.set_healthy();
        info!(sink = sink.name(), "Sink connection: healthy");
    } else {
        health().sink.set_unhealthy("Connection failed");
        error!(sink = sink.name(), "Sink connection: unhealthy");
    }
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
