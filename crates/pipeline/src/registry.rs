//! Per-session configuration registry.

use batch_core::{LoggerConfiguration, Result};
use moka::future::Cache;
use std::time::Duration;
use tracing::debug;

/// Resolves the [`LoggerConfiguration`] for sessions whose transport does
/// not carry one.
///
/// Registered configurations age out after the TTL; unknown sessions get
/// the process default re-keyed to the session.
#[derive(Clone)]
pub struct SessionConfigRegistry {
    cache: Cache<String, LoggerConfiguration>,
    default: LoggerConfiguration,
}

impl SessionConfigRegistry {
    pub fn new(default: LoggerConfiguration, ttl: Duration, capacity: u64) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(capacity)
                .time_to_idle(ttl)
                .build(),
            default,
        }
    }

    pub fn default_config(&self) -> &LoggerConfiguration {
        &self.default
    }

    /// Validates and stores `config` under `session_key`.
    pub async fn register(
        &self,
        session_key: &str,
        config: LoggerConfiguration,
    ) -> Result<LoggerConfiguration> {
        let config = config.for_session(session_key).validated()?;
        self.cache.insert(session_key.to_string(), config.clone()).await;
        debug!(
            session_key = %session_key,
            flush_count = config.flush_count,
            flush_after_secs = config.flush_after.as_secs(),
            "Registered session configuration"
        );
        Ok(config)
    }

    /// The registered configuration, if any.
    pub async fn get(&self, session_key: &str) -> Option<LoggerConfiguration> {
        self.cache.get(session_key).await
    }

    /// The registered configuration or the default for this session.
    pub async fn resolve(&self, session_key: &str) -> LoggerConfiguration {
        match self.cache.get(session_key).await {
            Some(config) => config,
            None => self.default.for_session(session_key),
        }
    }

    pub async fn remove(&self, session_key: &str) {
        self.cache.invalidate(session_key).await;
    }
}
