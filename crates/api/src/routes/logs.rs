//! Log ingestion endpoints.
//!
//! `POST /logs` takes one record, `POST /logs/batch` an array. Records in a
//! batch are ingested in order and succeed or fail individually.

use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use batch_core::{limits::MAX_HTTP_BATCH_RECORDS, RawRecord};
use tracing::{debug, warn};

use crate::response::{ApiError, BatchItemResult, BatchResponse, LogAccepted};
use crate::state::AppState;

fn parse_body<T: serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::malformed_body(format!("invalid JSON body: {}", e)))
}

/// POST /logs
pub async fn ingest_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<LogAccepted>), ApiError> {
    let raw: RawRecord = parse_body(&body)?;

    let receipt = state.ingestor.ingest(raw).await.map_err(|e| {
        debug!(error = %e, "Record rejected");
        ApiError::from(e)
    })?;

    Ok((StatusCode::ACCEPTED, Json(receipt.into())))
}

/// POST /logs/batch
pub async fn ingest_batch_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<BatchResponse>), ApiError> {
    let records: Vec<RawRecord> = parse_body(&body)?;

    if records.len() > MAX_HTTP_BATCH_RECORDS {
        return Err(ApiError::payload_too_large(format!(
            "batch has {} records, exceeds {} limit",
            records.len(),
            MAX_HTTP_BATCH_RECORDS
        )));
    }

    let mut results = Vec::with_capacity(records.len());
    for (index, raw) in records.into_iter().enumerate() {
        let result = match state.ingestor.ingest(raw).await {
            Ok(receipt) => BatchItemResult::accepted(index, receipt),
            Err(e) => BatchItemResult::rejected(index, &e),
        };
        results.push(result);
    }

    let response = BatchResponse::from_results(results);
    if response.rejected > 0 {
        warn!(
            accepted = response.accepted,
            rejected = response.rejected,
            "Some batch records were rejected"
        );
    }

    Ok((StatusCode::ACCEPTED, Json(response)))
}
