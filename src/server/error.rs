//! Error types for the REST API server

use crate::analytics::engine::AnalysisError;
use crate::store::StoreError;
use crate::symbol::SymbolError;
use crate::yahoo_finance::DownloadError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tokio::task::JoinError;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    /// No stored analysis for the symbol
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),
    /// Invalid parameter in request
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    /// Analysis run failed
    #[error("Computation failed: {0}")]
    ComputationFailed(String),
    /// Internal server error
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::SymbolNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            ApiError::ComputationFailed(_) | ApiError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            ApiError::SymbolNotFound(_) => "SymbolNotFound",
            ApiError::InvalidParameter(_) => "InvalidParameter",
            ApiError::ComputationFailed(_) => "ComputationFailed",
            ApiError::InternalError(_) => "InternalError",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            ApiError::SymbolNotFound(symbol) => format!("No stored analysis for '{}'", symbol),
            ApiError::InvalidParameter(msg)
            | ApiError::ComputationFailed(msg)
            | ApiError::InternalError(msg) => msg.clone(),
        };

        let body = Json(json!({
            "error": self.error_type(),
            "message": message,
        }));

        (self.status_code(), body).into_response()
    }
}

// Conversions from other error types

impl From<SymbolError> for ApiError {
    fn from(err: SymbolError) -> Self {
        ApiError::InvalidParameter(format!("Invalid symbol: {}", err))
    }
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        ApiError::ComputationFailed(err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::InternalError(err.to_string())
    }
}

impl From<DownloadError> for ApiError {
    fn from(err: DownloadError) -> Self {
        ApiError::InternalError(err.to_string())
    }
}

impl From<JoinError> for ApiError {
    fn from(err: JoinError) -> Self {
        ApiError::InternalError(format!("Background task failed: {}", err))
    }
}
