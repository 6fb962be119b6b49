//! Specialized responders.
//!
//! Each responder owns a system prompt and a declared tool set, and turns a
//! user message plus history into a reply, invoking tools as needed. The
//! three variants form a closed set — the orchestrator dispatches on
//! [`ResponderKind`] rather than through trait objects.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, warn};

use opendesk_store::{AgentType, CommerceStore, ConversationStore};

use crate::error::{AgentError, Result};
use crate::llm::{ChatMessage, ChatRequest, LlmClient, ToolCall, ToolDefinition};

/// Sampling temperature for responder completions.
const RESPONDER_TEMPERATURE: f32 = 0.7;

// ---------------------------------------------------------------------------
// Responder kinds
// ---------------------------------------------------------------------------

/// The closed set of specialized responders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponderKind {
    Support,
    Order,
    Billing,
}

impl ResponderKind {
    /// All responder kinds, in catalog order.
    pub const ALL: [ResponderKind; 3] = [Self::Support, Self::Order, Self::Billing];

    /// The agent-type tag this responder stamps on its replies.
    pub fn agent_type(&self) -> AgentType {
        match self {
            Self::Support => AgentType::Support,
            Self::Order => AgentType::Order,
            Self::Billing => AgentType::Billing,
        }
    }

    /// Short identifier used in the HTTP catalog.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Support => "support",
            Self::Order => "order",
            Self::Billing => "billing",
        }
    }

    /// Parse a catalog slug.
    pub fn from_slug(s: &str) -> Option<Self> {
        match s {
            "support" => Some(Self::Support),
            "order" => Some(Self::Order),
            "billing" => Some(Self::Billing),
            _ => None,
        }
    }

    /// Display name for the HTTP catalog.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Support => "Support Agent",
            Self::Order => "Order Agent",
            Self::Billing => "Billing Agent",
        }
    }

    /// One-line description for the HTTP catalog.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Support => "Handles general support inquiries, FAQs, and troubleshooting",
            Self::Order => "Handles order status, tracking, modifications, and cancellations",
            Self::Billing => "Handles payment issues, refunds, invoices, and subscription queries",
        }
    }

    /// The system prompt this responder sends to the model.
    pub fn system_prompt(&self) -> &'static str {
        match self {
            Self::Support => {
                "You are a helpful customer support agent. You assist customers with:\n\
                 - General inquiries and FAQs\n\
                 - Product information and troubleshooting\n\
                 - Account-related questions\n\
                 - Technical support\n\n\
                 Use the conversation history tool to access previous conversations for context.\n\
                 Always be friendly, professional, and helpful."
            }
            Self::Order => {
                "You are a specialized order support agent. You help customers with:\n\
                 - Order status inquiries\n\
                 - Order tracking information\n\
                 - Order modifications and cancellations\n\
                 - Delivery updates\n\n\
                 Use the available tools to fetch real-time order and delivery information.\n\
                 Always provide accurate and up-to-date information."
            }
            Self::Billing => {
                "You are a specialized billing support agent. You help customers with:\n\
                 - Invoice inquiries and details\n\
                 - Payment issues and status\n\
                 - Refund requests and status\n\
                 - Subscription queries\n\
                 - Billing disputes\n\n\
                 Use the available tools to fetch real-time invoice and refund information.\n\
                 Always provide accurate financial information."
            }
        }
    }

    /// The tool schemas this responder declares to the model.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        match self {
            Self::Support => vec![ToolDefinition {
                name: "query_conversation_history".into(),
                description: "Query the conversation history for a specific user to understand \
                              context and previous interactions."
                    .into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "userId": {
                            "type": "string",
                            "description": "The ID of the user whose conversation history to retrieve"
                        },
                        "limit": {
                            "type": "number",
                            "description": "Maximum number of previous messages to retrieve",
                            "default": 10
                        }
                    },
                    "required": ["userId"]
                }),
            }],
            Self::Order => vec![
                ToolDefinition {
                    name: "fetch_order_details".into(),
                    description: "Fetch detailed information about a specific order including \
                                  status, items, and total amount."
                        .into(),
                    parameters: json!({
                        "type": "object",
                        "properties": {
                            "orderNumber": {
                                "type": "string",
                                "description": "The order number to fetch details for (e.g., ORD-001)"
                            },
                            "userId": {
                                "type": "string",
                                "description": "The ID of the user who placed the order"
                            }
                        },
                        "required": ["orderNumber"]
                    }),
                },
                ToolDefinition {
                    name: "check_delivery_status".into(),
                    description: "Check the current delivery status and tracking information \
                                  for an order."
                        .into(),
                    parameters: json!({
                        "type": "object",
                        "properties": {
                            "orderNumber": {
                                "type": "string",
                                "description": "The order number to check delivery status for"
                            },
                            "trackingId": {
                                "type": "string",
                                "description": "The tracking ID (optional, will be found if not provided)"
                            }
                        },
                        "required": ["orderNumber"]
                    }),
                },
            ],
            Self::Billing => vec![
                ToolDefinition {
                    name: "get_invoice_details".into(),
                    description: "Fetch detailed information about a specific invoice including \
                                  amount, status, items, and due date."
                        .into(),
                    parameters: json!({
                        "type": "object",
                        "properties": {
                            "invoiceNumber": {
                                "type": "string",
                                "description": "The invoice number to fetch details for (e.g., INV-001)"
                            },
                            "userId": {
                                "type": "string",
                                "description": "The ID of the user whose invoice to retrieve"
                            }
                        },
                        "required": ["invoiceNumber"]
                    }),
                },
                ToolDefinition {
                    name: "check_refund_status".into(),
                    description: "Check the status of a refund request for a specific invoice."
                        .into(),
                    parameters: json!({
                        "type": "object",
                        "properties": {
                            "invoiceNumber": {
                                "type": "string",
                                "description": "The invoice number associated with the refund"
                            },
                            "refundId": {
                                "type": "string",
                                "description": "The refund ID (optional, will find all refunds if not provided)"
                            }
                        },
                        "required": ["invoiceNumber"]
                    }),
                },
            ],
        }
    }

    /// The declared tool names, for the HTTP catalog.
    pub fn tool_names(&self) -> Vec<String> {
        self.tool_definitions().into_iter().map(|t| t.name).collect()
    }
}

// ---------------------------------------------------------------------------
// Responder
// ---------------------------------------------------------------------------

/// A reply produced by a responder (or the fallback generator).
#[derive(Debug, Clone)]
pub struct ResponderReply {
    /// The reply text.
    pub content: String,
    /// Which responder produced it.
    pub agent_type: AgentType,
}

/// A responder bound to its model client and data stores.
pub struct Responder {
    kind: ResponderKind,
    llm: Arc<LlmClient>,
    conversations: ConversationStore,
    commerce: CommerceStore,
}

impl Responder {
    /// Create a responder of the given kind.
    pub fn new(
        kind: ResponderKind,
        llm: Arc<LlmClient>,
        conversations: ConversationStore,
        commerce: CommerceStore,
    ) -> Self {
        Self {
            kind,
            llm,
            conversations,
            commerce,
        }
    }

    /// The responder's kind.
    pub fn kind(&self) -> ResponderKind {
        self.kind
    }

    /// Process one turn: build the message sequence, call the model with the
    /// declared tool schema, run at most one tool round-trip, and return the
    /// final text.
    ///
    /// The tool loop is bounded at one round: if the follow-up completion
    /// requests tools again, those requests are dropped and its text content
    /// is returned as-is.
    pub async fn process(
        &self,
        user_text: &str,
        history: &[ChatMessage],
        user_id: &str,
    ) -> Result<ResponderReply> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(self.kind.system_prompt()));
        messages.extend_from_slice(history);
        messages.push(ChatMessage::user(user_text));

        let request = ChatRequest {
            messages,
            tools: self.kind.tool_definitions(),
            temperature: Some(RESPONDER_TEMPERATURE),
            max_tokens: None,
        };

        let first = self.llm.chat(&request).await?;
        if !first.wants_tools() {
            return Ok(self.reply(first.text));
        }

        debug!(
            responder = self.kind.slug(),
            tools = ?first.tool_calls.iter().map(|c| &c.name).collect::<Vec<_>>(),
            "model requested tool calls"
        );

        let mut followup = request.messages;
        let results = self.execute_tool_calls(&first.tool_calls, user_id).await?;
        followup.push(ChatMessage::assistant_tool_calls(
            first.text,
            first.tool_calls,
        ));
        followup.extend(results);

        let second = self
            .llm
            .chat(&ChatRequest {
                messages: followup,
                tools: self.kind.tool_definitions(),
                temperature: Some(RESPONDER_TEMPERATURE),
                max_tokens: None,
            })
            .await?;

        if second.wants_tools() {
            warn!(
                responder = self.kind.slug(),
                dropped = second.tool_calls.len(),
                "tool round-trip limit reached, dropping further tool requests"
            );
        }

        Ok(self.reply(second.text))
    }

    fn reply(&self, content: String) -> ResponderReply {
        ResponderReply {
            content,
            agent_type: self.kind.agent_type(),
        }
    }

    /// Execute a batch of tool calls, returning tool-result messages.
    async fn execute_tool_calls(
        &self,
        calls: &[ToolCall],
        user_id: &str,
    ) -> Result<Vec<ChatMessage>> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let value = self.execute_tool(&call.name, &call.arguments, user_id).await?;
            results.push(ChatMessage::tool_result(&call.id, value.to_string()));
        }
        Ok(results)
    }

    /// Execute a single named tool against the store.
    ///
    /// Domain lookup misses come back as structured `{"error": ...}` payloads
    /// so the model can narrate them; only an undeclared tool name is an
    /// actual error (a prompt/schema contract violation).
    pub async fn execute_tool(&self, name: &str, args: &Value, user_id: &str) -> Result<Value> {
        let declared = self.kind.tool_definitions();
        if !declared.iter().any(|t| t.name == name) {
            return Err(AgentError::UnknownTool {
                tool_name: name.to_string(),
            });
        }

        match name {
            "fetch_order_details" => self.fetch_order_details(args).await,
            "check_delivery_status" => self.check_delivery_status(args).await,
            "get_invoice_details" => self.get_invoice_details(args).await,
            "check_refund_status" => self.check_refund_status(args).await,
            "query_conversation_history" => self.query_conversation_history(args, user_id).await,
            other => Err(AgentError::UnknownTool {
                tool_name: other.to_string(),
            }),
        }
    }

    // -- tool implementations ------------------------------------------------

    async fn fetch_order_details(&self, args: &Value) -> Result<Value> {
        let order_number = required_str(args, "orderNumber")?;
        let user_filter = args["userId"].as_str();

        let Some((order, delivery)) = self.commerce.order_by_number(order_number).await? else {
            return Ok(json!({ "error": format!("Order {order_number} not found") }));
        };

        if let Some(uid) = user_filter
            && order.user_id != uid
        {
            return Ok(json!({ "error": "Order not found for this user" }));
        }

        Ok(json!({
            "order": {
                "id": order.id,
                "orderNumber": order.order_number,
                "status": order.status,
                "total": order.total,
                "items": order.items,
                "createdAt": order.created_at,
                "updatedAt": order.updated_at,
                "delivery": delivery.map(|d| json!({
                    "status": d.status,
                    "trackingId": d.tracking_id,
                    "carrier": d.carrier,
                    "estimatedDelivery": d.estimated_delivery,
                    "deliveredAt": d.delivered_at,
                })),
            }
        }))
    }

    async fn check_delivery_status(&self, args: &Value) -> Result<Value> {
        let order_number = required_str(args, "orderNumber")?;
        let tracking_id = args["trackingId"].as_str();

        let resolved = match tracking_id {
            Some(tid) => self.commerce.delivery_by_tracking(tid).await?,
            None => self
                .commerce
                .order_by_number(order_number)
                .await?
                .and_then(|(order, delivery)| delivery.map(|d| (d, order.order_number))),
        };

        let Some((delivery, order_number)) = resolved else {
            return Ok(json!({ "error": "Delivery information not found" }));
        };

        Ok(json!({
            "delivery": {
                "status": delivery.status,
                "trackingId": delivery.tracking_id,
                "carrier": delivery.carrier,
                "estimatedDelivery": delivery.estimated_delivery,
                "deliveredAt": delivery.delivered_at,
                "orderNumber": order_number,
            }
        }))
    }

    async fn get_invoice_details(&self, args: &Value) -> Result<Value> {
        let invoice_number = required_str(args, "invoiceNumber")?;
        let user_filter = args["userId"].as_str();

        let Some((invoice, refunds)) = self.commerce.invoice_by_number(invoice_number, None).await?
        else {
            return Ok(json!({ "error": format!("Invoice {invoice_number} not found") }));
        };

        if let Some(uid) = user_filter
            && invoice.user_id != uid
        {
            return Ok(json!({ "error": "Invoice not found for this user" }));
        }

        Ok(json!({
            "invoice": {
                "id": invoice.id,
                "invoiceNumber": invoice.invoice_number,
                "amount": invoice.amount,
                "status": invoice.status,
                "items": invoice.items,
                "dueDate": invoice.due_date,
                "paidAt": invoice.paid_at,
                "createdAt": invoice.created_at,
                "refunds": refunds.iter().map(refund_json).collect::<Vec<_>>(),
            }
        }))
    }

    async fn check_refund_status(&self, args: &Value) -> Result<Value> {
        let invoice_number = required_str(args, "invoiceNumber")?;
        let refund_id = args["refundId"].as_str();

        let Some((invoice, refunds)) = self
            .commerce
            .invoice_by_number(invoice_number, refund_id)
            .await?
        else {
            return Ok(json!({ "error": format!("Invoice {invoice_number} not found") }));
        };

        if refunds.is_empty() {
            return Ok(json!({
                "message": "No refunds found for this invoice",
                "refunds": [],
            }));
        }

        Ok(json!({
            "invoiceNumber": invoice.invoice_number,
            "refunds": refunds.iter().map(refund_json).collect::<Vec<_>>(),
        }))
    }

    async fn query_conversation_history(&self, args: &Value, user_id: &str) -> Result<Value> {
        // The model supplies the user id from the prompt context; fall back
        // to the requesting user when it omits one.
        let target = args["userId"].as_str().unwrap_or(user_id);
        let limit = args["limit"].as_u64().unwrap_or(10) as u32;

        let history = self.conversations.recent_history(target, limit).await?;

        Ok(json!({
            "conversations": history
                .iter()
                .map(|(conv, messages)| json!({
                    "id": conv.id,
                    "title": conv.title,
                    "messageCount": messages.len(),
                    "messages": messages.iter().map(|m| json!({
                        "role": m.role.as_str(),
                        "content": m.content,
                        "agentType": m.agent_type.map(|a| a.as_str()),
                        "createdAt": m.created_at,
                    })).collect::<Vec<_>>(),
                }))
                .collect::<Vec<_>>(),
        }))
    }
}

/// Extract a required string argument from a tool call.
fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args[key].as_str().ok_or_else(|| AgentError::LlmParseFailed {
        reason: format!("tool call is missing required argument `{key}`"),
    })
}

fn refund_json(refund: &opendesk_store::Refund) -> Value {
    json!({
        "id": refund.id,
        "amount": refund.amount,
        "status": refund.status,
        "reason": refund.reason,
        "processedAt": refund.processed_at,
        "createdAt": refund.created_at,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmClientConfig;
    use opendesk_store::{Database, UserStore, seed};

    async fn seeded_responder(kind: ResponderKind) -> (Responder, String) {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();
        seed::seed_demo_data(&db).await.unwrap();

        let john = UserStore::new(db.clone())
            .find_by_email("john.doe@example.com")
            .await
            .unwrap()
            .unwrap();

        let llm = Arc::new(
            LlmClient::new(LlmClientConfig::new("sk-test", "gpt-4-turbo-preview")).unwrap(),
        );
        let responder = Responder::new(
            kind,
            llm,
            ConversationStore::new(db.clone()),
            CommerceStore::new(db),
        );
        (responder, john.id)
    }

    #[tokio::test]
    async fn fetch_order_details_returns_shipped_order_with_delivery() {
        let (responder, _) = seeded_responder(ResponderKind::Order).await;

        let result = responder
            .execute_tool(
                "fetch_order_details",
                &json!({"orderNumber": "ORD-002"}),
                "anyone",
            )
            .await
            .unwrap();

        assert_eq!(result["order"]["status"], "SHIPPED");
        assert_eq!(result["order"]["delivery"]["trackingId"], "TRACK-67890");
        assert_eq!(result["order"]["delivery"]["carrier"], "FedEx");
    }

    #[tokio::test]
    async fn fetch_order_details_unknown_order_is_structured_error() {
        let (responder, _) = seeded_responder(ResponderKind::Order).await;

        let result = responder
            .execute_tool(
                "fetch_order_details",
                &json!({"orderNumber": "ORD-999"}),
                "anyone",
            )
            .await
            .unwrap();

        assert_eq!(result["error"], "Order ORD-999 not found");
    }

    #[tokio::test]
    async fn fetch_order_details_enforces_owner_filter() {
        let (responder, john_id) = seeded_responder(ResponderKind::Order).await;

        let owned = responder
            .execute_tool(
                "fetch_order_details",
                &json!({"orderNumber": "ORD-002", "userId": john_id}),
                "anyone",
            )
            .await
            .unwrap();
        assert_eq!(owned["order"]["orderNumber"], "ORD-002");

        let not_owned = responder
            .execute_tool(
                "fetch_order_details",
                &json!({"orderNumber": "ORD-002", "userId": "someone-else"}),
                "anyone",
            )
            .await
            .unwrap();
        assert_eq!(not_owned["error"], "Order not found for this user");
    }

    #[tokio::test]
    async fn check_delivery_status_by_tracking_id() {
        let (responder, _) = seeded_responder(ResponderKind::Order).await;

        let result = responder
            .execute_tool(
                "check_delivery_status",
                &json!({"orderNumber": "ignored", "trackingId": "TRACK-12345"}),
                "anyone",
            )
            .await
            .unwrap();

        assert_eq!(result["delivery"]["carrier"], "UPS");
        assert_eq!(result["delivery"]["orderNumber"], "ORD-001");
    }

    #[tokio::test]
    async fn check_delivery_status_without_delivery_is_structured_error() {
        let (responder, _) = seeded_responder(ResponderKind::Order).await;

        let result = responder
            .execute_tool(
                "check_delivery_status",
                &json!({"orderNumber": "ORD-003"}),
                "anyone",
            )
            .await
            .unwrap();

        assert_eq!(result["error"], "Delivery information not found");
    }

    #[tokio::test]
    async fn get_invoice_details_unknown_invoice_is_structured_error() {
        let (responder, _) = seeded_responder(ResponderKind::Billing).await;

        let result = responder
            .execute_tool(
                "get_invoice_details",
                &json!({"invoiceNumber": "INV-999"}),
                "anyone",
            )
            .await
            .unwrap();

        assert_eq!(result["error"], "Invoice INV-999 not found");
    }

    #[tokio::test]
    async fn check_refund_status_lists_refunds() {
        let (responder, _) = seeded_responder(ResponderKind::Billing).await;

        let result = responder
            .execute_tool(
                "check_refund_status",
                &json!({"invoiceNumber": "INV-002"}),
                "anyone",
            )
            .await
            .unwrap();

        assert_eq!(result["invoiceNumber"], "INV-002");
        assert_eq!(result["refunds"][0]["status"], "COMPLETED");
    }

    #[tokio::test]
    async fn check_refund_status_no_refunds_message() {
        let (responder, _) = seeded_responder(ResponderKind::Billing).await;

        let result = responder
            .execute_tool(
                "check_refund_status",
                &json!({"invoiceNumber": "INV-003"}),
                "anyone",
            )
            .await
            .unwrap();

        assert_eq!(result["message"], "No refunds found for this invoice");
        assert!(result["refunds"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn query_conversation_history_returns_recent_conversations() {
        let (responder, john_id) = seeded_responder(ResponderKind::Support).await;

        let result = responder
            .execute_tool(
                "query_conversation_history",
                &json!({"userId": john_id, "limit": 10}),
                &john_id,
            )
            .await
            .unwrap();

        let conversations = result["conversations"].as_array().unwrap();
        assert_eq!(conversations.len(), 2);
        // Messages within each conversation are chronological.
        assert_eq!(conversations[0]["messages"][0]["role"], "user");
    }

    #[tokio::test]
    async fn undeclared_tool_name_is_fatal() {
        let (responder, _) = seeded_responder(ResponderKind::Support).await;

        let err = responder
            .execute_tool("fetch_order_details", &json!({}), "anyone")
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::UnknownTool { .. }));
    }

    #[test]
    fn catalog_metadata_is_complete() {
        for kind in ResponderKind::ALL {
            assert!(!kind.display_name().is_empty());
            assert!(!kind.description().is_empty());
            assert!(!kind.system_prompt().is_empty());
        }
        assert_eq!(
            ResponderKind::Order.tool_names(),
            vec!["fetch_order_details", "check_delivery_status"]
        );
        assert_eq!(
            ResponderKind::Billing.tool_names(),
            vec!["get_invoice_details", "check_refund_status"]
        );
        assert_eq!(
            ResponderKind::Support.tool_names(),
            vec!["query_conversation_history"]
        );
    }

    #[test]
    fn slug_round_trip() {
        for kind in ResponderKind::ALL {
            assert_eq!(ResponderKind::from_slug(kind.slug()), Some(kind));
        }
        assert_eq!(ResponderKind::from_slug("router"), None);
    }
}
