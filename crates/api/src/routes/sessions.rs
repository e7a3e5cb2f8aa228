//! Session configuration endpoints.
//!
//! Lets a producer register flush settings once instead of carrying them on
//! every record.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use batch_core::{CountMatch, FlushWindow, LoggerConfiguration, StorageMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::response::ApiError;
use crate::state::AppState;

/// Body of `PUT /sessions/{key}/config`. Omitted fields keep the default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfigRequest {
    #[serde(default)]
    pub flush_count: Option<u32>,
    /// Seconds
    #[serde(default)]
    pub flush_after: Option<u64>,
    #[serde(default)]
    pub sink_target: Option<String>,
    #[serde(default)]
    pub storage_mode: Option<StorageMode>,
    #[serde(default)]
    pub flush_window: Option<FlushWindow>,
    #[serde(default)]
    pub count_match: Option<CountMatch>,
    #[serde(default)]
    pub session_started_at: Option<DateTime<Utc>>,
}

impl SessionConfigRequest {
    /// Overlays the request on `base`.
    pub fn apply(self, base: &LoggerConfiguration) -> LoggerConfiguration {
        let mut config = base.clone();
        if let Some(count) = self.flush_count {
            config.flush_count = count;
        }
        if let Some(secs) = self.flush_after {
            config.flush_after = Duration::from_secs(secs);
        }
        if let Some(target) = self.sink_target {
            config.sink_target = target;
        }
        if let Some(mode) = self.storage_mode {
            config.storage_mode = mode;
        }
        if let Some(window) = self.flush_window {
            config.flush_window = window;
        }
        if let Some(count_match) = self.count_match {
            config.count_match = count_match;
        }
        if self.session_started_at.is_some() {
            config.session_started_at = self.session_started_at;
        }
        config
    }
}

/// Configuration as seen by a session.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfigResponse {
    pub registered: bool,
    pub configuration: LoggerConfiguration,
}

/// PUT /sessions/{key}/config
pub async fn register_handler(
    State(state): State<AppState>,
    Path(session_key): Path<String>,
    body: Bytes,
) -> Result<Json<SessionConfigResponse>, ApiError> {
    let request: SessionConfigRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::malformed_body(format!("invalid JSON body: {}", e)))?;

    let key = batch_core::normalize_session_key(Some(&session_key))?;
    let registry = state.ingestor.registry();
    let config = request.apply(&registry.default_config().for_session(key.as_str()));
    let configuration = registry.register(&key, config).await?;

    Ok(Json(SessionConfigResponse {
        registered: true,
        configuration,
    }))
}

/// GET /sessions/{key}/config
pub async fn get_handler(
    State(state): State<AppState>,
    Path(session_key): Path<String>,
) -> Result<Json<SessionConfigResponse>, ApiError> {
    let key = batch_core::normalize_session_key(Some(&session_key))?;
    let registry = state.ingestor.registry();

    let response = match registry.get(&key).await {
        Some(configuration) => SessionConfigResponse {
            registered: true,
            configuration,
        },
        None => SessionConfigResponse {
            registered: false,
            configuration: registry.resolve(&key).await,
        },
    };
    Ok(Json(response))
}

/// DELETE /sessions/{key}/config
pub async fn remove_handler(
    State(state): State<AppState>,
    Path(session_key): Path<String>,
) -> Result<StatusCode, ApiError> {
    let key = batch_core::normalize_session_key(Some(&session_key))?;
    state.ingestor.registry().remove(&key).await;
    Ok(StatusCode::NO_CONTENT)
}
