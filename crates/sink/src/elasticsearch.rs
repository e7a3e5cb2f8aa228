//! Elasticsearch bulk API sink.

use async_trait::async_trait;
use batch_core::{error::SinkErrorCode, Batch, Error, Result};
use bytes::{BufMut, Bytes, BytesMut};
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use telemetry::{health, metrics};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ElasticsearchConfig;
use crate::lifecycle::LifecyclePolicy;
use crate::sink::{BulkSink, LogDocument, PushReceipt};

/// Longest backend diagnostic kept in an error message.
const MAX_DIAGNOSTIC_LEN: usize = 2048;

/// Pushes batches through `POST /_bulk`, one `index` action per record.
pub struct ElasticsearchSink {
    client: reqwest::Client,
    base_url: Url,
    config: ElasticsearchConfig,
    lifecycle: Option<LifecyclePolicy>,
}

/// The parts of a bulk response we inspect.
#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<Value>,
}

impl BulkResponse {
    fn failed_items(&self) -> usize {
        self.items.iter().filter(|item| item_error(item).is_some()).count()
    }

    fn first_error(&self) -> Option<String> {
        self.items.iter().find_map(item_error)
    }
}

fn item_error(item: &Value) -> Option<String> {
    let error = item.get("index")?.get("error")?;
    let kind = error.get("type").and_then(Value::as_str).unwrap_or("unknown");
    let reason = error.get("reason").and_then(Value::as_str).unwrap_or("");
    Some(format!("{kind}: {reason}"))
}

fn truncate(mut text: String) -> String {
    if text.len() > MAX_DIAGNOSTIC_LEN {
        let mut cut = MAX_DIAGNOSTIC_LEN;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}

/// Newline-delimited bulk body routing every document by the session key.
pub fn bulk_body(batch: &Batch, target: &str) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(batch.len() * 256);
    let action = json!({ "index": { "_index": target, "routing": batch.session_key } });

    for record in &batch.records {
        serde_json::to_writer((&mut buf).writer(), &action)?;
        buf.put_u8(b'\n');
        serde_json::to_writer((&mut buf).writer(), &LogDocument::new(&batch.session_key, record))?;
        buf.put_u8(b'\n');
    }
    Ok(buf.freeze())
}

impl ElasticsearchSink {
    pub fn new(config: ElasticsearchConfig, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| Error::configuration(format!("invalid elasticsearch url '{}': {e}", config.url)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::configuration(format!(
                "elasticsearch url '{}' cannot be a base",
                config.url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::configuration(format!("building http client: {e}")))?;

        let lifecycle = config.lifecycle_policy.clone().map(LifecyclePolicy::new);

        info!(url = %base_url, lifecycle = ?config.lifecycle_policy, "Created Elasticsearch sink");

        Ok(Self {
            client,
            base_url,
            config,
            lifecycle,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // checked in new()
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.config.username {
            Some(user) => builder.basic_auth(user, self.config.password.as_deref()),
            None => builder,
        }
    }

    async fn apply_lifecycle(&self, policy: &LifecyclePolicy, target: &str) {
        let url = self.endpoint(&[target, "_settings"]);
        let result = self
            .request(reqwest::Method::PUT, url)
            .json(&policy.settings_body(target))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                policy.mark_applied(target);
                debug!(target = %target, policy = %policy.name(), "Applied index lifecycle policy");
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                metrics().lifecycle_errors.inc();
                warn!(target = %target, status = %status, body = %truncate(body), "Lifecycle policy rejected");
            }
            Err(e) => {
                metrics().lifecycle_errors.inc();
                warn!(target = %target, error = %e, "Lifecycle policy request failed");
            }
        }
    }
}

#[async_trait]
impl BulkSink for ElasticsearchSink {
    fn name(&self) -> &'static str {
        "elasticsearch"
    }

    async fn push(&self, batch: &Batch, target: &str) -> Result<PushReceipt> {
        if batch.is_empty() {
            return Ok(PushReceipt {
                records: 0,
                latency_ms: 0,
            });
        }

        let body = bulk_body(batch, target)?;
        let mut url = self.endpoint(&["_bulk"]);
        if self.config.refresh {
            url.query_pairs_mut().append_pair("refresh", "true");
        }

        let start = Instant::now();
        let response = self
            .request(reqwest::Method::POST, url)
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                health().sink.set_unhealthy(e.to_string());
                Error::sink(SinkErrorCode::Unreachable, format!("bulk request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            health()
                .sink
                .set_unhealthy(format!("bulk request returned {status}"));
            let body = response.text().await.unwrap_or_default();
            return Err(Error::sink(
                SinkErrorCode::Rejected,
                format!("bulk request returned {status}: {}", truncate(body)),
            ));
        }

        let parsed: BulkResponse = response.json().await.map_err(|e| {
            Error::sink(SinkErrorCode::Rejected, format!("unreadable bulk response: {e}"))
        })?;

        let latency_ms = start.elapsed().as_millis() as u64;
        metrics().sink_push_latency_ms.observe(latency_ms);
        health().sink.set_healthy();

        if parsed.errors {
            return Err(Error::sink(
                SinkErrorCode::Rejected,
                format!(
                    "{} of {} documents rejected: {}",
                    parsed.failed_items(),
                    batch.len(),
                    parsed.first_error().unwrap_or_else(|| "no item detail".to_string())
                ),
            ));
        }

        debug!(
            session_key = %batch.session_key,
            target = %target,
            count = batch.len(),
            latency_ms = latency_ms,
            "Pushed batch to Elasticsearch"
        );

        if let Some(policy) = &self.lifecycle {
            if !policy.is_applied(target) {
                self.apply_lifecycle(policy, target).await;
            }
        }

        Ok(PushReceipt {
            records: batch.len(),
            latency_ms,
        })
    }

    async fn ping(&self) -> bool {
        match self.request(reqwest::Method::GET, self.base_url.clone()).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Elasticsearch ping failed");
                false
            }
        }
    }
}
