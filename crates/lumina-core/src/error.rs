// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Lumina conversation control core.

use thiserror::Error;

/// The primary error type used across all Lumina crates and adapter traits.
#[derive(Debug, Error)]
pub enum LuminaError {
    /// Control is already held, a second open escalation was requested, or the
    /// requested transition is invalid for the current state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The referenced entity does not exist (or the session is Absent).
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Malformed input, rejected before any state mutation.
    #[error("validation error: {0}")]
    Validation(String),

    /// The reply generator failed or timed out.
    #[error("upstream degraded: {message}")]
    UpstreamDegraded {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Webhook signature or operator credential rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Outbound channel errors (delivery failure, bad payload, rate limiting).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LuminaError {
    /// Shorthand for a [`LuminaError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Stable machine-readable code, used in API error bodies and log fields.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Conflict(_) => "conflict",
            Self::NotFound { .. } => "not_found",
            Self::Validation(_) => "validation_failed",
            Self::UpstreamDegraded { .. } => "upstream_degraded",
            Self::Unauthorized(_) => "unauthorized",
            Self::Config(_) => "config_error",
            Self::Storage { .. } => "storage_error",
            Self::Channel { .. } => "channel_error",
            Self::Timeout { .. } => "timeout",
            Self::Internal(_) => "internal_error",
        }
    }
}
