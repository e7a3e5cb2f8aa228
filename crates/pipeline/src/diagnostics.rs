//! Operator diagnostics channel.
//!
//! Flush-path failures never reach the ingestion caller; they are reported
//! here instead.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, warn};

/// Something the operator should know about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Diagnostic {
    /// A batch was drained but the sink did not accept it.
    BatchLost {
        session_key: String,
        target: String,
        records: usize,
        reason: String,
    },
    /// The flush path could not read or clean up durable state.
    StorageFailure { session_key: String, reason: String },
}

impl Diagnostic {
    pub fn session_key(&self) -> &str {
        match self {
            Self::BatchLost { session_key, .. } | Self::StorageFailure { session_key, .. } => {
                session_key
            }
        }
    }
}

/// Receives flush-path diagnostics. Must not fail or block for long.
#[async_trait]
pub trait Diagnostics: Send + Sync {
    async fn report(&self, diagnostic: Diagnostic);
}

/// Where diagnostics are delivered.
#[derive(Debug, Clone)]
pub enum DiagnosticChannel {
    /// Error-level log line (always on)
    Log,
    /// JSON POST to a webhook
    Webhook { url: String },
}

/// Default operator channel: logs every diagnostic and optionally forwards
/// it to webhooks.
pub struct OperatorChannel {
    channels: Vec<DiagnosticChannel>,
    http: reqwest::Client,
}

impl Default for OperatorChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl OperatorChannel {
    pub fn new() -> Self {
        Self {
            channels: vec![DiagnosticChannel::Log],
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn with_channel(mut self, channel: DiagnosticChannel) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn with_webhook(self, url: Option<String>) -> Self {
        match url {
            Some(url) if !url.is_empty() => self.with_channel(DiagnosticChannel::Webhook { url }),
            _ => self,
        }
    }
}

#[async_trait]
impl Diagnostics for OperatorChannel {
    async fn report(&self, diagnostic: Diagnostic) {
        for channel in &self.channels {
            match channel {
                DiagnosticChannel::Log => match &diagnostic {
                    Diagnostic::BatchLost {
                        session_key,
                        target,
                        records,
                        reason,
                    } => error!(
                        session_key = %session_key,
                        target = %target,
                        records = records,
                        reason = %reason,
                        "Batch lost"
                    ),
                    Diagnostic::StorageFailure {
                        session_key,
                        reason,
                    } => error!(
                        session_key = %session_key,
                        reason = %reason,
                        "Flush storage failure"
                    ),
                },
                DiagnosticChannel::Webhook { url } => {
                    if let Err(e) = self.http.post(url).json(&diagnostic).send().await {
                        warn!(url = %url, error = %e, "Diagnostic webhook failed");
                    }
                }
            }
        }
    }
}
