//! Standardized API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use batch_core::{error::RecordErrorCode, Error};
use pipeline::IngestReceipt;
use serde::{Deserialize, Serialize};
use telemetry::ComponentHealthReport;

/// Response for one accepted record.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogAccepted {
    pub accepted: bool,
    pub session_key: String,
    /// Records flushed because of this record
    pub flushed: Option<usize>,
}

impl From<IngestReceipt> for LogAccepted {
    fn from(receipt: IngestReceipt) -> Self {
        Self {
            accepted: true,
            flushed: receipt.flushed(),
            session_key: receipt.session_key,
        }
    }
}

/// Per-record result inside a batch response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemResult {
    pub index: usize,
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flushed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorResponse>,
}

impl BatchItemResult {
    pub fn accepted(index: usize, receipt: IngestReceipt) -> Self {
        Self {
            index,
            accepted: true,
            flushed: receipt.flushed(),
            session_key: Some(receipt.session_key),
            error: None,
        }
    }

    pub fn rejected(index: usize, err: &Error) -> Self {
        Self {
            index,
            accepted: false,
            session_key: None,
            flushed: None,
            error: Some(ErrorResponse::from_error(err)),
        }
    }
}

/// Response for `POST /logs/batch`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub accepted: usize,
    pub rejected: usize,
    pub results: Vec<BatchItemResult>,
}

impl BatchResponse {
    pub fn from_results(results: Vec<BatchItemResult>) -> Self {
        let accepted = results.iter().filter(|r| r.accepted).count();
        Self {
            accepted,
            rejected: results.len() - accepted,
            results,
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub components: Vec<ComponentHealthReport>,
    pub buffered_sessions: usize,
    pub buffered_records: usize,
    pub in_flight_flushes: usize,
}

/// Error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }

    pub fn from_error(err: &Error) -> Self {
        let code = match err {
            Error::Configuration(_) => "CONFIG",
            Error::Serialization(_) => RecordErrorCode::MalformedEnvelope.code(),
            other => other.error_code().unwrap_or("INTERNAL"),
        };
        Self::new(err.to_string(), code)
    }
}

/// API error carrying the HTTP status and body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub response: ErrorResponse,
}

impl ApiError {
    pub fn with_code(status: StatusCode, code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            status,
            response: ErrorResponse::new(msg, code),
        }
    }

    /// Body could not be read as the expected JSON shape.
    pub fn malformed_body(msg: impl Into<String>) -> Self {
        Self::with_code(
            StatusCode::BAD_REQUEST,
            RecordErrorCode::MalformedEnvelope.code(),
            msg,
        )
    }

    pub fn payload_too_large(msg: impl Into<String>) -> Self {
        Self::with_code(StatusCode::PAYLOAD_TOO_LARGE, "BATCH_001", msg)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.response)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status =
            StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self {
            status,
            response: ErrorResponse::from_error(&err),
        }
    }
}
