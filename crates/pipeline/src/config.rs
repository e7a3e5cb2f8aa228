//! Pipeline configuration.

use batch_core::{CountMatch, FlushWindow, LoggerConfiguration, StorageMode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where a due flush runs relative to the ingestion call that triggered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushDispatch {
    /// Awaited inside the ingestion call; errors are still never propagated.
    #[default]
    Inline,
    /// Spawned onto the runtime; the ingestion call returns immediately.
    Background,
}

/// Flush settings applied to sessions that neither carry nor registered
/// their own. Flat and snake_case so every field is addressable from
/// config files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDefaults {
    #[serde(default = "default_flush_count")]
    pub flush_count: u32,
    #[serde(default = "default_flush_after_secs")]
    pub flush_after_secs: u64,
    #[serde(default = "default_sink_target")]
    pub sink_target: String,
    #[serde(default)]
    pub storage_mode: StorageMode,
    #[serde(default)]
    pub flush_window: FlushWindow,
    #[serde(default)]
    pub count_match: CountMatch,
}

fn default_flush_count() -> u32 {
    100
}

fn default_flush_after_secs() -> u64 {
    60
}

fn default_sink_target() -> String {
    "logs".to_string()
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            flush_count: default_flush_count(),
            flush_after_secs: default_flush_after_secs(),
            sink_target: default_sink_target(),
            storage_mode: StorageMode::default(),
            flush_window: FlushWindow::default(),
            count_match: CountMatch::default(),
        }
    }
}

impl SessionDefaults {
    pub fn to_logger_configuration(&self) -> LoggerConfiguration {
        LoggerConfiguration::new("default", self.sink_target.clone())
            .with_flush_count(self.flush_count)
            .with_flush_after(Duration::from_secs(self.flush_after_secs))
            .with_storage_mode(self.storage_mode)
            .with_flush_window(self.flush_window)
            .with_count_match(self.count_match)
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Flush settings for sessions that neither carry nor registered their own
    #[serde(default)]
    pub default_session: SessionDefaults,
    #[serde(default)]
    pub dispatch: FlushDispatch,
    /// How long a registered session configuration is kept without use
    #[serde(default = "default_registry_ttl_secs")]
    pub registry_ttl_secs: u64,
    #[serde(default = "default_registry_capacity")]
    pub registry_capacity: u64,
    /// Interval between idle-session sweeps (0 = disabled)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Interval between sink reachability probes (0 = disabled)
    #[serde(default = "default_sink_probe_interval_secs")]
    pub sink_probe_interval_secs: u64,
    /// Webhook receiving lost-batch diagnostics
    #[serde(default)]
    pub diagnostics_webhook: Option<String>,
}

fn default_registry_ttl_secs() -> u64 {
    3600
}

fn default_registry_capacity() -> u64 {
    100_000
}

fn default_sweep_interval_secs() -> u64 {
    15
}

fn default_sink_probe_interval_secs() -> u64 {
    30
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_session: SessionDefaults::default(),
            dispatch: FlushDispatch::default(),
            registry_ttl_secs: default_registry_ttl_secs(),
            registry_capacity: default_registry_capacity(),
            sweep_interval_secs: default_sweep_interval_secs(),
            sink_probe_interval_secs: default_sink_probe_interval_secs(),
            diagnostics_webhook: None,
        }
    }
}

impl PipelineConfig {
    /// Validated default configuration for unconfigured sessions.
    pub fn default_session_config(&self) -> batch_core::Result<LoggerConfiguration> {
        self.default_session.to_logger_configuration().validated()
    }

    pub fn registry_ttl(&self) -> Duration {
        Duration::from_secs(self.registry_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }

    pub fn sink_probe_interval(&self) -> Option<Duration> {
        (self.sink_probe_interval_secs > 0)
            .then(|| Duration::from_secs(self.sink_probe_interval_secs))
    }
}
