//! Subscriber installation for structured logs.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Filter used when `RUST_LOG` is unset or unparseable.
pub const DEFAULT_FILTER: &str = "info,session_batcher=info,pipeline=info,queue=info";

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable single lines
    #[default]
    Text,
    /// One JSON object per event, for log shippers
    Json,
}

#[derive(Debug, Clone, Default)]
pub struct TracingConfig {
    /// `EnvFilter` directives; None uses [`DEFAULT_FILTER`]
    pub filter: Option<String>,
    pub format: LogFormat,
    /// Emit span open/close events (flush spans are noisy)
    pub span_events: bool,
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

impl TracingConfig {
    /// Reads `RUST_LOG`, `LOG_JSON` and `LOG_SPANS`.
    pub fn from_env() -> Self {
        Self {
            filter: std::env::var("RUST_LOG").ok().filter(|f| !f.trim().is_empty()),
            format: if env_flag("LOG_JSON") {
                LogFormat::Json
            } else {
                LogFormat::Text
            },
            span_events: env_flag("LOG_SPANS"),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        self.filter
            .as_deref()
            .and_then(|directives| EnvFilter::try_new(directives).ok())
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
    }
}

/// Installs the global subscriber.
///
/// Returns false if one was already installed (tests call this repeatedly).
pub fn init_tracing(config: TracingConfig) -> bool {
    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let registry = tracing_subscriber::registry().with(config.env_filter());

    let installed = match config.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_events(span_events)
                    .with_thread_ids(true),
            )
            .try_init()
            .is_ok(),
        LogFormat::Text => registry
            .with(fmt::layer().with_span_events(span_events).with_target(true))
            .try_init()
            .is_ok(),
    };

    if installed {
        tracing::info!(
            filter = config.filter.as_deref().unwrap_or(DEFAULT_FILTER),
            format = ?config.format,
            "Tracing initialized"
        );
    }
    installed
}

pub fn init_tracing_from_env() -> bool {
    init_tracing(TracingConfig::from_env())
}
