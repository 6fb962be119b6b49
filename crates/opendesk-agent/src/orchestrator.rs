//! Conversation orchestrator.
//!
//! The top-level coordinator: resolves identity, loads or creates the
//! conversation, classifies intent, dispatches to the matching responder
//! (or the fallback generator), persists the exchange, and exposes both a
//! single-shot and an incremental delivery mode.

use std::sync::Arc;

use tokio::sync::{OnceCell, mpsc};
use tracing::{info, warn};

use opendesk_store::{
    AgentType, CommerceStore, Conversation, ConversationPreview, ConversationStore, Database,
    MessageRole, StoreError, StoredMessage, User, UserStore,
};

use crate::classifier::{self, Intent};
use crate::error::{AgentError, Result};
use crate::fallback;
use crate::llm::{ChatMessage, LlmClient, LlmClientConfig};
use crate::responder::{Responder, ResponderKind, ResponderReply};

/// Most recent messages supplied to the model as context; older messages
/// are silently dropped (no summarization).
const CONTEXT_WINDOW: u32 = 20;

/// Conversation titles are cut to this many characters of the first message.
const TITLE_LIMIT: usize = 50;

/// Capacity of the streaming fragment channel.
const STREAM_BUFFER: usize = 32;

// ---------------------------------------------------------------------------
// Configuration and outcome
// ---------------------------------------------------------------------------

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Model-provider API key. `None` defers the failure to first use —
    /// the process must start without one.
    pub api_key: Option<String>,
    /// Model identifier.
    pub model: String,
    /// Optional base-URL override for compatible endpoints.
    pub base_url: Option<String>,
    /// Degraded mode: skip the model entirely and serve canned replies.
    pub mock_mode: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-4-turbo-preview".into(),
            base_url: None,
            mock_mode: false,
        }
    }
}

/// The result of processing one message.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    /// The assistant's reply text.
    pub reply: String,
    /// Which responder produced the reply.
    pub agent_type: AgentType,
    /// The conversation the exchange was persisted to.
    pub conversation_id: String,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Coordinates one request through identity resolution, routing, responder
/// dispatch, and persistence.
pub struct Orchestrator {
    config: OrchestratorConfig,
    users: UserStore,
    conversations: ConversationStore,
    commerce: CommerceStore,
    /// Lazily constructed model client. `OnceCell` gives single-flight
    /// initialization under concurrent first requests; a failed attempt
    /// leaves the cell empty so the next request retries.
    llm: OnceCell<Arc<LlmClient>>,
}

impl Orchestrator {
    /// Create an orchestrator over the given database.
    pub fn new(db: Database, config: OrchestratorConfig) -> Self {
        Self {
            config,
            users: UserStore::new(db.clone()),
            conversations: ConversationStore::new(db.clone()),
            commerce: CommerceStore::new(db),
            llm: OnceCell::new(),
        }
    }

    /// True when the orchestrator serves canned replies only.
    pub fn mock_mode(&self) -> bool {
        self.config.mock_mode
    }

    /// Get or lazily construct the model client.
    async fn llm(&self) -> Result<Arc<LlmClient>> {
        self.llm
            .get_or_try_init(|| async {
                let api_key = self.config.api_key.clone().unwrap_or_default();
                let mut cfg = LlmClientConfig::new(api_key, self.config.model.clone());
                if let Some(url) = &self.config.base_url {
                    cfg = cfg.with_base_url(url.clone());
                }
                LlmClient::new(cfg).map(Arc::new)
            })
            .await
            .cloned()
    }

    // -----------------------------------------------------------------------
    // Identity resolution
    // -----------------------------------------------------------------------

    /// Resolve a caller-supplied identifier to a canonical user.
    ///
    /// Identifiers containing `@` are emails: looked up and created lazily
    /// when absent. Anything else is an opaque id: looked up, never created.
    pub async fn resolve_user(&self, user_ref: &str) -> Result<User> {
        if user_ref.contains('@') {
            Ok(self.users.get_or_create_by_email(user_ref).await?)
        } else {
            Ok(self.users.find_by_id(user_ref).await?)
        }
    }

    // -----------------------------------------------------------------------
    // Message processing
    // -----------------------------------------------------------------------

    /// Process one message and return the completed reply.
    pub async fn process_message(
        &self,
        user_ref: &str,
        conversation_id: Option<&str>,
        text: &str,
    ) -> Result<ChatOutcome> {
        self.run_turn(user_ref, conversation_id, text).await
    }

    /// Process one message and deliver the reply as a lazy sequence of text
    /// fragments.
    ///
    /// Routing, tool handling, and persistence are identical to
    /// [`process_message`]; fragments are produced only after the full reply
    /// has been computed and the assistant message persisted, so a consumer
    /// that stops reading mid-stream cannot corrupt stored state.
    pub async fn stream_message(
        &self,
        user_ref: &str,
        conversation_id: Option<&str>,
        text: &str,
    ) -> Result<(ChatOutcome, mpsc::Receiver<String>)> {
        let outcome = self.run_turn(user_ref, conversation_id, text).await?;

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let reply = outcome.reply.clone();
        tokio::spawn(async move {
            for fragment in chunk_reply(&reply) {
                // A closed channel means the consumer went away; persistence
                // already happened, so just stop producing.
                if tx.send(fragment).await.is_err() {
                    break;
                }
            }
        });

        Ok((outcome, rx))
    }

    /// The shared turn pipeline behind both delivery modes.
    async fn run_turn(
        &self,
        user_ref: &str,
        conversation_id: Option<&str>,
        text: &str,
    ) -> Result<ChatOutcome> {
        let user = self.resolve_user(user_ref).await?;

        // Resolve the conversation: load when the id resolves, otherwise
        // create a new one seeded with the user's message.
        let (conversation, created) = match conversation_id {
            Some(id) => match self.conversations.get(id).await {
                Ok(conv) => (conv, false),
                Err(e) if e.is_not_found() => (self.new_conversation(&user.id, text).await?, true),
                Err(e) => return Err(e.into()),
            },
            None => (self.new_conversation(&user.id, text).await?, true),
        };

        if !created {
            self.conversations
                .append_message(&conversation.id, MessageRole::User, text, None, None)
                .await?;
        }

        let stored = self
            .conversations
            .messages(&conversation.id, Some(CONTEXT_WINDOW))
            .await?;
        let history = history_to_chat(&stored);

        let reply = if self.config.mock_mode {
            self.degraded_reply(text).await
        } else {
            match self.classify_and_dispatch(text, &history, &user).await {
                Ok(reply) => reply,
                // Quota rejection is recovered exactly once per request;
                // everything else fails the request.
                Err(AgentError::QuotaExhausted { reason }) => {
                    warn!(%reason, "provider quota exhausted, using fallback generator");
                    self.degraded_reply(text).await
                }
                Err(e) => return Err(e),
            }
        };

        self.conversations
            .append_message(
                &conversation.id,
                MessageRole::Assistant,
                &reply.content,
                Some(reply.agent_type),
                None,
            )
            .await?;

        info!(
            conversation_id = %conversation.id,
            agent_type = %reply.agent_type,
            "assistant reply persisted"
        );

        Ok(ChatOutcome {
            reply: reply.content,
            agent_type: reply.agent_type,
            conversation_id: conversation.id,
        })
    }

    /// Classify the message and dispatch to the matching responder.
    ///
    /// An unrecognized category dispatches to Support but tags the reply
    /// `router`, distinguishing "answered without confident routing" from an
    /// intentional Support route. The same rule applies to both delivery
    /// modes.
    async fn classify_and_dispatch(
        &self,
        text: &str,
        history: &[ChatMessage],
        user: &User,
    ) -> Result<ResponderReply> {
        let llm = self.llm().await?;

        let intent = classifier::classify(&llm, text).await?;
        let (kind, tag) = match intent {
            Intent::Support => (ResponderKind::Support, AgentType::Support),
            Intent::Order => (ResponderKind::Order, AgentType::Order),
            Intent::Billing => (ResponderKind::Billing, AgentType::Billing),
            Intent::Unknown => (ResponderKind::Support, AgentType::Router),
        };

        let responder = Responder::new(
            kind,
            llm,
            self.conversations.clone(),
            self.commerce.clone(),
        );
        let mut reply = responder.process(text, history, &user.id).await?;
        reply.agent_type = tag;
        Ok(reply)
    }

    /// Degraded-mode reply: keyword heuristic picks the route, content comes
    /// from the deterministic fallback table.
    async fn degraded_reply(&self, text: &str) -> ResponderReply {
        warn!("serving canned fallback reply");
        let mut reply = fallback::reply(text).await;
        reply.agent_type = fallback::heuristic_route(text);
        reply
    }

    async fn new_conversation(&self, user_id: &str, text: &str) -> Result<Conversation> {
        let title = derive_title(text);
        Ok(self
            .conversations
            .create(user_id, Some(&title), text)
            .await?)
    }

    // -----------------------------------------------------------------------
    // Conversation reads
    // -----------------------------------------------------------------------

    /// List the resolved user's conversations with previews.
    pub async fn list_conversations(&self, user_ref: &str) -> Result<Vec<ConversationPreview>> {
        let user = self.resolve_user(user_ref).await?;
        Ok(self.conversations.list_for_user(&user.id).await?)
    }

    /// Fetch a conversation with its full ordered history.
    ///
    /// An ownership mismatch is reported identically to a missing
    /// conversation so callers cannot probe for existence.
    pub async fn get_conversation(
        &self,
        user_ref: &str,
        conversation_id: &str,
    ) -> Result<(Conversation, Vec<StoredMessage>)> {
        let user = self.resolve_user(user_ref).await?;
        let conversation = self.conversations.get(conversation_id).await?;
        if conversation.user_id != user.id {
            return Err(not_found(conversation_id));
        }
        let messages = self.conversations.messages(conversation_id, None).await?;
        Ok((conversation, messages))
    }

    /// Delete a conversation and its messages, owner-scoped like
    /// [`get_conversation`].
    pub async fn delete_conversation(&self, user_ref: &str, conversation_id: &str) -> Result<()> {
        let user = self.resolve_user(user_ref).await?;
        let conversation = self.conversations.get(conversation_id).await?;
        if conversation.user_id != user.id {
            return Err(not_found(conversation_id));
        }
        self.conversations.delete(conversation_id).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn not_found(conversation_id: &str) -> AgentError {
    AgentError::Store(StoreError::NotFound {
        entity: "conversation",
        id: conversation_id.to_string(),
    })
}

/// Derive a conversation title from the first message.
fn derive_title(text: &str) -> String {
    if text.chars().count() > TITLE_LIMIT {
        let mut title: String = text.chars().take(TITLE_LIMIT).collect();
        title.push_str("...");
        title
    } else {
        text.to_string()
    }
}

/// Map stored history into model messages, role for role.
fn history_to_chat(stored: &[StoredMessage]) -> Vec<ChatMessage> {
    stored
        .iter()
        .map(|m| match m.role {
            MessageRole::User => ChatMessage::user(&m.content),
            MessageRole::Assistant => ChatMessage::assistant(&m.content),
            MessageRole::System => ChatMessage::system(&m.content),
        })
        .collect()
}

/// Split a reply into whitespace-preserving word fragments for streaming.
fn chunk_reply(text: &str) -> Vec<String> {
    text.split_inclusive(char::is_whitespace)
        .map(|s| s.to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
