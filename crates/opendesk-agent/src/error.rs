//! Agent error types.
//!
//! All agent subsystems surface errors through [`AgentError`]. Each variant
//! carries enough context for callers to decide how to handle the failure;
//! the orchestrator in particular branches on [`AgentError::QuotaExhausted`]
//! to engage the fallback generator.

use thiserror::Error;

/// Unified error type for the agent core.
#[derive(Debug, Error)]
pub enum AgentError {
    // -- LLM errors ----------------------------------------------------------
    /// The API key is missing or set to a placeholder value.
    #[error("model provider api key is missing or not set")]
    MissingApiKey,

    /// The provider rejected the request for quota or rate-limit reasons.
    /// Recovered exactly once per request via the fallback generator.
    #[error("model provider quota exhausted: {reason}")]
    QuotaExhausted { reason: String },

    /// An HTTP request to the model provider failed.
    #[error("model request failed: {reason}")]
    LlmRequestFailed { reason: String },

    /// The provider response could not be parsed into the expected format.
    #[error("model response parse error: {reason}")]
    LlmParseFailed { reason: String },

    // -- Tool errors ---------------------------------------------------------
    /// The model requested a tool that the responder never declared.
    /// A contract violation between prompt and schema — fatal for the turn.
    #[error("unknown tool: {tool_name}")]
    UnknownTool { tool_name: String },

    // -- Passthrough ---------------------------------------------------------
    /// A storage operation failed.
    #[error(transparent)]
    Store(#[from] opendesk_store::StoreError),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the agent crate.
pub type Result<T> = std::result::Result<T, AgentError>;

impl AgentError {
    /// True when the conversation the request referenced does not exist or
    /// is not visible to the caller.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_not_found())
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        Self::LlmRequestFailed {
            reason: err.to_string(),
        }
    }
}
