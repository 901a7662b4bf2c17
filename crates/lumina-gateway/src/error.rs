// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping from [`LuminaError`] to HTTP responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use lumina_core::LuminaError;
use serde::Serialize;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Stable machine-readable code, e.g. `conflict`.
    pub error: &'static str,
    pub message: String,
}

/// A [`LuminaError`] on its way out of a handler.
#[derive(Debug)]
pub struct ApiError(pub LuminaError);

impl From<LuminaError> for ApiError {
    fn from(err: LuminaError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            LuminaError::Conflict(_) => StatusCode::CONFLICT,
            LuminaError::NotFound { .. } => StatusCode::NOT_FOUND,
            LuminaError::Validation(_) => StatusCode::BAD_REQUEST,
            LuminaError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            LuminaError::UpstreamDegraded { .. } | LuminaError::Channel { .. } => {
                StatusCode::BAD_GATEWAY
            }
            LuminaError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            LuminaError::Config(_) | LuminaError::Storage { .. } | LuminaError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::debug!(error = %self.0, "request rejected");
        }
        let body = ErrorResponse {
            error: self.0.code(),
            // Storage and internal details stay in the log.
            message: if status == StatusCode::INTERNAL_SERVER_ERROR {
                "internal error".to_string()
            } else {
                self.0.to_string()
            },
        };
        (status, Json(body)).into_response()
    }
}
