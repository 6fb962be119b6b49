//! HTTP-facing error type.
//!
//! Every failed request produces a `{error: {message, code}}` body — never a
//! raw stack trace or an unclassified 500. Ownership mismatches are mapped
//! to the same 404 as missing records so callers cannot probe for existence.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use opendesk_agent::AgentError;
use opendesk_store::StoreError;

/// An error ready to be rendered as an HTTP response.
#[derive(Debug, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub code: &'static str,
}

impl ApiError {
    /// 400 — the request itself is malformed.
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            code: "VALIDATION",
        }
    }

    /// 404 — missing record or ownership mismatch, indistinguishable.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
            code: "NOT_FOUND",
        }
    }

    /// 429 — the caller exceeded the request budget.
    pub fn rate_limited() -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            message: "Rate limit exceeded. Please try again later.".into(),
            code: "RATE_LIMIT_EXCEEDED",
        }
    }

    /// 500 — unexpected internal failure.
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
            code: "INTERNAL_ERROR",
        }
    }

    /// 500 — the model provider failed in a non-recoverable way.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
            code: "UPSTREAM_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.code, message = %self.message, "request failed");
        }
        (
            self.status,
            Json(json!({
                "error": {
                    "message": self.message,
                    "code": self.code,
                }
            })),
        )
            .into_response()
    }
}

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        match &err {
            AgentError::Store(StoreError::NotFound { entity, .. }) => match *entity {
                "conversation" => Self::not_found("Conversation not found"),
                "user" => Self::not_found("User not found"),
                other => Self::not_found(format!("{other} not found")),
            },
            AgentError::MissingApiKey => Self::upstream(err.to_string()),
            AgentError::QuotaExhausted { .. } => Self::upstream(err.to_string()),
            AgentError::LlmRequestFailed { .. } | AgentError::LlmParseFailed { .. } => {
                Self::upstream(err.to_string())
            }
            AgentError::UnknownTool { .. } => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: err.to_string(),
                code: "TOOL_CONTRACT",
            },
            AgentError::Store(_) | AgentError::Json(_) => Self::internal(err.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::from(AgentError::Store(err))
    }
}

// ── tests ────────────────────────────────────────────────────────────
