//! Intent classification.
//!
//! A degenerate responder with no tools: one model call with a fixed system
//! prompt, no conversation history (classification is stateless per call),
//! and a substring parse of the answer.

use tracing::debug;

use crate::error::Result;
use crate::llm::{ChatMessage, ChatRequest, LlmClient};

// ═══════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════

/// The intent category of a user message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Support,
    Order,
    Billing,
    /// The model's answer matched no known category.
    Unknown,
}

// ═══════════════════════════════════════════════════════════════════════
//  Classification prompt
// ═══════════════════════════════════════════════════════════════════════

const CLASSIFY_PROMPT: &str = "\
You are a routing agent that classifies customer queries into one of these categories:
1. support - General support inquiries, FAQs, troubleshooting, product questions
2. order - Order status, tracking, modifications, cancellations
3. billing - Payment issues, refunds, invoices, subscription queries

Analyze the user's query and determine the most appropriate category. Respond with only \
the category name (support, order, or billing).";

// ═══════════════════════════════════════════════════════════════════════
//  Classification
// ═══════════════════════════════════════════════════════════════════════

/// Classify a user message into an [`Intent`].
///
/// Errors (including quota rejections) propagate to the orchestrator, which
/// decides whether to fall back or fail the request.
pub async fn classify(llm: &LlmClient, text: &str) -> Result<Intent> {
    let request = ChatRequest {
        messages: vec![ChatMessage::system(CLASSIFY_PROMPT), ChatMessage::user(text)],
        tools: Vec::new(),
        temperature: Some(0.0),
        max_tokens: Some(16),
    };

    let completion = llm.chat(&request).await?;
    let intent = parse_intent(&completion.text);
    debug!(answer = %completion.text.trim(), ?intent, "classified intent");
    Ok(intent)
}

/// Parse a model answer into an intent, case-insensitively.
///
/// First match wins in the priority order support, order, billing.
pub fn parse_intent(answer: &str) -> Intent {
    let lower = answer.to_lowercase();
    if lower.contains("support") {
        Intent::Support
    } else if lower.contains("order") {
        Intent::Order
    } else if lower.contains("billing") {
        Intent::Billing
    } else {
        Intent::Unknown
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
