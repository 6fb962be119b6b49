//! Agent core for Opendesk.
//!
//! This crate implements the orchestration heart of the chat backend: the
//! component that decides which specialized responder handles a message,
//! maintains conversational context across turns, executes tool calls
//! requested by the model, reconciles streaming and non-streaming delivery,
//! and falls back to deterministic replies when the model provider is
//! unavailable or rate-limited.
//!
//! ## Modules
//!
//! - [`llm`] — chat-completions client and wire types.
//! - [`classifier`] — stateless intent classification.
//! - [`responder`] — the three specialized responders and their tools.
//! - [`fallback`] — deterministic canned replies for degraded operation.
//! - [`orchestrator`] — the top-level per-request pipeline.
//! - [`error`] — agent error types.

pub mod classifier;
pub mod error;
pub mod fallback;
pub mod llm;
pub mod orchestrator;
pub mod responder;

// Re-export the most commonly used types at the crate root.
pub use classifier::{Intent, classify, parse_intent};
pub use error::{AgentError, Result};
pub use llm::{ChatMessage, ChatRequest, Completion, LlmClient, LlmClientConfig, Role, ToolCall, ToolDefinition};
pub use orchestrator::{ChatOutcome, Orchestrator, OrchestratorConfig};
pub use responder::{Responder, ResponderKind, ResponderReply};
