//! Deterministic fallback replies.
//!
//! Used when the model provider signals quota exhaustion or rate limiting,
//! and as the reply source in degraded mode. Pure keyword matching over the
//! message text, no external calls, with a small fixed delay to keep UX
//! timing close to the real path.
//!
//! This must never be the default path — every activation is logged by the
//! orchestrator.

use std::time::Duration;

use regex::Regex;
use std::sync::OnceLock;

use opendesk_store::AgentType;

use crate::responder::ResponderReply;

/// Artificial delay applied before every canned reply.
const REPLY_DELAY: Duration = Duration::from_millis(500);

fn order_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)ORD-\d+").expect("static regex"))
}

fn invoice_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)INV-\d+").expect("static regex"))
}

/// Pick the route for a message using the degraded-mode keyword heuristic:
/// order-related words first, then billing, otherwise support.
pub fn heuristic_route(text: &str) -> AgentType {
    let lower = text.to_lowercase();
    if lower.contains("order") || order_number_re().is_match(text) {
        AgentType::Order
    } else if lower.contains("invoice") || lower.contains("refund") || lower.contains("billing") {
        AgentType::Billing
    } else {
        AgentType::Support
    }
}

/// Produce a deterministic canned reply for a message.
pub async fn reply(text: &str) -> ResponderReply {
    tokio::time::sleep(REPLY_DELAY).await;

    let lower = text.to_lowercase();

    // Order-related queries.
    if lower.contains("order") || order_number_re().is_match(text) {
        let order_number = order_number_re()
            .find(text)
            .map(|m| m.as_str().to_uppercase())
            .unwrap_or_else(|| "ORD-002".to_string());
        return ResponderReply {
            content: format!(
                "I found your order {order_number}! It's currently in transit with FedEx. \
                 Your tracking number is TRACK-67890, and the estimated delivery date is \
                 January 25, 2024. You can track your package on the FedEx website."
            ),
            agent_type: AgentType::Order,
        };
    }

    // Billing-related queries.
    if lower.contains("refund") || lower.contains("invoice") || invoice_number_re().is_match(text) {
        let invoice_number = invoice_number_re()
            .find(text)
            .map(|m| m.as_str().to_uppercase())
            .unwrap_or_else(|| "INV-002".to_string());
        return ResponderReply {
            content: format!(
                "I can see your invoice {invoice_number} for $149.50. Your refund request \
                 has been processed successfully and was completed on January 20, 2024. \
                 The refund amount of $149.50 should appear in your account within 5-7 \
                 business days."
            ),
            agent_type: AgentType::Billing,
        };
    }

    // Support queries.
    if lower.contains("support") || lower.contains("help") {
        return ResponderReply {
            content: "I'm here to help! I can assist you with:\n\
                      - Order tracking and delivery status\n\
                      - Billing inquiries and refunds\n\
                      - Product information\n\
                      - Account questions\n\n\
                      What would you like help with today?"
                .to_string(),
            agent_type: AgentType::Support,
        };
    }

    // Greetings.
    if ["hi", "hello", "hey", "greetings"]
        .iter()
        .any(|g| lower.starts_with(g))
    {
        return ResponderReply {
            content: "Hello! Welcome to Opendesk Customer Support. I'm here to help you \
                      with orders, billing, and general support questions. What can I \
                      assist you with today?"
                .to_string(),
            agent_type: AgentType::Support,
        };
    }

    // Default.
    ResponderReply {
        content: "Thank you for your message. I'm here to help with:\n\
                  - Order tracking (try \"Where is order ORD-002?\")\n\
                  - Billing questions (try \"Check refund for INV-002\")\n\
                  - General support\n\n\
                  How can I assist you?"
            .to_string(),
        agent_type: AgentType::Support,
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
