//! Conversation and message persistence.
//!
//! Conversations belong to exactly one user and exclusively own their
//! messages (cascade delete). Messages are immutable once created and are
//! ordered by creation time — the row id only breaks same-second ties.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

// ═══════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════

/// Which specialized responder produced an assistant message.
///
/// `Router` marks replies produced through the support path without a
/// confident classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    Router,
    Support,
    Order,
    Billing,
}

impl AgentType {
    /// Convert from a database string representation.
    pub fn from_str(s: &str) -> StoreResult<Self> {
        match s {
            "router" => Ok(Self::Router),
            "support" => Ok(Self::Support),
            "order" => Ok(Self::Order),
            "billing" => Ok(Self::Billing),
            other => Err(StoreError::InvalidArgument(format!(
                "unknown agent type: {other}"
            ))),
        }
    }

    /// Convert to a database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Router => "router",
            Self::Support => "support",
            Self::Order => "order",
            Self::Billing => "billing",
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    /// System-internal entries (seed summaries etc.); never user-authored.
    System,
}

impl MessageRole {
    /// Convert from a database string representation.
    pub fn from_str(s: &str) -> StoreResult<Self> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            other => Err(StoreError::InvalidArgument(format!(
                "unknown message role: {other}"
            ))),
        }
    }

    /// Convert to a database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// A conversation between one user and the assistant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique identifier (UUID v7).
    pub id: String,
    /// Owning user (non-owning back-reference, used for authorization only).
    pub user_id: String,
    /// Title derived from the first message, truncated.
    pub title: Option<String>,
    /// Unix timestamp when the conversation was created.
    pub created_at: i64,
    /// Unix timestamp refreshed on every new message.
    pub updated_at: i64,
}

/// A single persisted message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Auto-incrementing row id.
    pub id: i64,
    /// The conversation this message belongs to.
    pub conversation_id: String,
    /// Who authored the message.
    pub role: MessageRole,
    /// Text content.
    pub content: String,
    /// Which responder produced it; `None` for user messages.
    pub agent_type: Option<AgentType>,
    /// Optional structured metadata (JSON).
    pub metadata: Option<serde_json::Value>,
    /// Unix timestamp when the message was created.
    pub created_at: i64,
}

/// Listing entry: a conversation with its last message and message count.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationPreview {
    pub id: String,
    pub title: Option<String>,
    pub updated_at: i64,
    pub message_count: i64,
    pub last_message: Option<StoredMessage>,
}

// ═══════════════════════════════════════════════════════════════════════
//  ConversationStore
// ═══════════════════════════════════════════════════════════════════════

/// CRUD operations on conversations and their messages.
#[derive(Clone)]
pub struct ConversationStore {
    db: Database,
}

impl ConversationStore {
    /// Create a new conversation store backed by `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a conversation owned by `user_id` with its first user message.
    ///
    /// Both rows are written in one transaction so a conversation can never
    /// exist without its opening message.
    #[instrument(skip(self, first_message))]
    pub async fn create(
        &self,
        user_id: &str,
        title: Option<&str>,
        first_message: &str,
    ) -> StoreResult<Conversation> {
        let conversation = Conversation {
            id: Uuid::now_v7().to_string(),
            user_id: user_id.to_string(),
            title: title.map(|t| t.to_string()),
            created_at: Utc::now().timestamp(),
            updated_at: Utc::now().timestamp(),
        };

        let row = conversation.clone();
        let first_message = first_message.to_string();
        self.db
            .execute_mut(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO conversations (id, user_id, title, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![row.id, row.user_id, row.title, row.created_at, row.updated_at],
                )?;
                tx.execute(
                    "INSERT INTO messages (conversation_id, role, content, created_at) \
                     VALUES (?1, 'user', ?2, ?3)",
                    rusqlite::params![row.id, first_message, row.created_at],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await?;

        debug!(conversation_id = %conversation.id, "conversation created");
        Ok(conversation)
    }

    /// Fetch a single conversation by id.
    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> StoreResult<Conversation> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                conn.query_row(
                    "SELECT id, user_id, title, created_at, updated_at \
                     FROM conversations WHERE id = ?1",
                    rusqlite::params![id],
                    map_conversation_row,
                )
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound {
                        entity: "conversation",
                        id: id.clone(),
                    },
                    other => StoreError::Sqlite(other),
                })
            })
            .await
    }

    /// List a user's conversations, most recently updated first, each with
    /// its newest message and total message count.
    #[instrument(skip(self))]
    pub async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<ConversationPreview>> {
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, title, created_at, updated_at \
                     FROM conversations WHERE user_id = ?1 ORDER BY updated_at DESC",
                )?;
                let conversations = stmt
                    .query_map(rusqlite::params![user_id], map_conversation_row)?
                    .collect::<Result<Vec<_>, _>>()?;

                let mut previews = Vec::with_capacity(conversations.len());
                for conv in conversations {
                    let count: i64 = conn.query_row(
                        "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
                        rusqlite::params![conv.id],
                        |row| row.get(0),
                    )?;

                    let last = conn
                        .query_row(
                            "SELECT id, conversation_id, role, content, agent_type, metadata, created_at \
                             FROM messages WHERE conversation_id = ?1 \
                             ORDER BY created_at DESC, id DESC LIMIT 1",
                            rusqlite::params![conv.id],
                            map_message_row,
                        )
                        .map(Some)
                        .or_else(|e| match e {
                            rusqlite::Error::QueryReturnedNoRows => Ok(None),
                            other => Err(other),
                        })?;
                    let last = last.transpose()?;

                    previews.push(ConversationPreview {
                        id: conv.id,
                        title: conv.title,
                        updated_at: conv.updated_at,
                        message_count: count,
                        last_message: last,
                    });
                }
                Ok(previews)
            })
            .await
    }

    /// Delete a conversation and all its messages (cascade).
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                let deleted = conn.execute(
                    "DELETE FROM conversations WHERE id = ?1",
                    rusqlite::params![id],
                )?;
                if deleted == 0 {
                    return Err(StoreError::NotFound {
                        entity: "conversation",
                        id,
                    });
                }
                Ok(())
            })
            .await
    }

    /// Append a message to a conversation.
    ///
    /// Also refreshes the conversation's `updated_at`. Returns the new
    /// message's row id.
    #[instrument(skip(self, content, metadata))]
    pub async fn append_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
        agent_type: Option<AgentType>,
        metadata: Option<&serde_json::Value>,
    ) -> StoreResult<i64> {
        let conversation_id = conversation_id.to_string();
        let content = content.to_string();
        let metadata = metadata.map(|m| m.to_string());
        let now = Utc::now().timestamp();

        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO messages (conversation_id, role, content, agent_type, metadata, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![
                        conversation_id,
                        role.as_str(),
                        content,
                        agent_type.map(|a| a.as_str()),
                        metadata,
                        now
                    ],
                )?;
                let msg_id = conn.last_insert_rowid();

                conn.execute(
                    "UPDATE conversations SET updated_at = ?2 WHERE id = ?1",
                    rusqlite::params![conversation_id, now],
                )?;

                Ok(msg_id)
            })
            .await
    }

    /// Get messages for a conversation, ordered by creation time ascending.
    ///
    /// If `limit` is `Some(n)`, returns the most recent `n` messages (older
    /// ones are silently dropped — this is the model context window).
    #[instrument(skip(self))]
    pub async fn messages(
        &self,
        conversation_id: &str,
        limit: Option<u32>,
    ) -> StoreResult<Vec<StoredMessage>> {
        let conversation_id = conversation_id.to_string();
        self.db
            .execute(move |conn| {
                let rows = match limit {
                    Some(n) => {
                        // Subquery grabs the most recent N, outer query
                        // restores chronological order.
                        let mut stmt = conn.prepare(
                            "SELECT id, conversation_id, role, content, agent_type, metadata, created_at \
                             FROM (SELECT * FROM messages WHERE conversation_id = ?1 \
                                   ORDER BY created_at DESC, id DESC LIMIT ?2) \
                             ORDER BY created_at ASC, id ASC",
                        )?;
                        stmt.query_map(rusqlite::params![conversation_id, n], map_message_row)?
                            .collect::<Result<Vec<_>, _>>()?
                    }
                    None => {
                        let mut stmt = conn.prepare(
                            "SELECT id, conversation_id, role, content, agent_type, metadata, created_at \
                             FROM messages WHERE conversation_id = ?1 \
                             ORDER BY created_at ASC, id ASC",
                        )?;
                        stmt.query_map(rusqlite::params![conversation_id], map_message_row)?
                            .collect::<Result<Vec<_>, _>>()?
                    }
                };
                rows.into_iter().collect::<StoreResult<Vec<_>>>()
            })
            .await
    }

    /// Get the message count for a conversation.
    #[instrument(skip(self))]
    pub async fn message_count(&self, conversation_id: &str) -> StoreResult<i64> {
        let conversation_id = conversation_id.to_string();
        self.db
            .execute(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
                    rusqlite::params![conversation_id],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await
    }

    /// The support tool's history lookup: the user's 5 most recently updated
    /// conversations, each with up to `limit` newest messages re-sorted into
    /// chronological order.
    #[instrument(skip(self))]
    pub async fn recent_history(
        &self,
        user_id: &str,
        limit: u32,
    ) -> StoreResult<Vec<(Conversation, Vec<StoredMessage>)>> {
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, title, created_at, updated_at \
                     FROM conversations WHERE user_id = ?1 \
                     ORDER BY updated_at DESC LIMIT 5",
                )?;
                let conversations = stmt
                    .query_map(rusqlite::params![user_id], map_conversation_row)?
                    .collect::<Result<Vec<_>, _>>()?;

                let mut out = Vec::with_capacity(conversations.len());
                for conv in conversations {
                    let mut stmt = conn.prepare(
                        "SELECT id, conversation_id, role, content, agent_type, metadata, created_at \
                         FROM (SELECT * FROM messages WHERE conversation_id = ?1 \
                               ORDER BY created_at DESC, id DESC LIMIT ?2) \
                         ORDER BY created_at ASC, id ASC",
                    )?;
                    let messages = stmt
                        .query_map(rusqlite::params![conv.id, limit], map_message_row)?
                        .collect::<Result<Vec<_>, _>>()?
                        .into_iter()
                        .collect::<StoreResult<Vec<_>>>()?;
                    out.push((conv, messages));
                }
                Ok(out)
            })
            .await
    }
}

// ── row mapping ──────────────────────────────────────────────────────

fn map_conversation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

/// Maps a message row; enum/JSON decoding is deferred to a `StoreResult`
/// so invalid stored values surface as store errors, not panics.
fn map_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoreResult<StoredMessage>> {
    let role: String = row.get(2)?;
    let agent_type: Option<String> = row.get(4)?;
    let metadata: Option<String> = row.get(5)?;

    let id: i64 = row.get(0)?;
    let conversation_id: String = row.get(1)?;
    let content: String = row.get(3)?;
    let created_at: i64 = row.get(6)?;

    Ok((|| {
        Ok(StoredMessage {
            id,
            conversation_id,
            role: MessageRole::from_str(&role)?,
            content,
            agent_type: agent_type.as_deref().map(AgentType::from_str).transpose()?,
            metadata: metadata
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .map_err(StoreError::Json)?,
            created_at,
        })
    })())
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::UserStore;

    async fn setup() -> (ConversationStore, UserStore) {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();
        (ConversationStore::new(db.clone()), UserStore::new(db))
    }

    #[tokio::test]
    async fn create_writes_conversation_and_first_message() {
        let (convs, users) = setup().await;
        let user = users.create("a@example.com", None).await.unwrap();

        let conv = convs
            .create(&user.id, Some("Order tracking"), "Where is my order?")
            .await
            .unwrap();

        let messages = convs.messages(&conv.id, None).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[0].content, "Where is my order?");
        assert!(messages[0].agent_type.is_none());
    }

    #[tokio::test]
    async fn append_bumps_updated_at() {
        let (convs, users) = setup().await;
        let user = users.create("a@example.com", None).await.unwrap();
        let conv = convs.create(&user.id, None, "hello").await.unwrap();

        // Force an older updated_at so the bump is observable.
        let conv_id = conv.id.clone();
        convs
            .db
            .execute(move |conn| {
                conn.execute(
                    "UPDATE conversations SET updated_at = 0 WHERE id = ?1",
                    rusqlite::params![conv_id],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        convs
            .append_message(
                &conv.id,
                MessageRole::Assistant,
                "hi!",
                Some(AgentType::Support),
                None,
            )
            .await
            .unwrap();

        let reloaded = convs.get(&conv.id).await.unwrap();
        assert!(reloaded.updated_at > 0);
    }

    #[tokio::test]
    async fn messages_limit_returns_recent_in_chronological_order() {
        let (convs, users) = setup().await;
        let user = users.create("a@example.com", None).await.unwrap();
        let conv = convs.create(&user.id, None, "msg 0").await.unwrap();

        for i in 1..6 {
            convs
                .append_message(&conv.id, MessageRole::User, &format!("msg {i}"), None, None)
                .await
                .unwrap();
        }

        let recent = convs.messages(&conv.id, Some(3)).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content, "msg 3");
        assert_eq!(recent[1].content, "msg 4");
        assert_eq!(recent[2].content, "msg 5");
    }

    #[tokio::test]
    async fn delete_cascades_messages() {
        let (convs, users) = setup().await;
        let user = users.create("a@example.com", None).await.unwrap();
        let conv = convs.create(&user.id, None, "hello").await.unwrap();
        convs
            .append_message(&conv.id, MessageRole::Assistant, "hi", None, None)
            .await
            .unwrap();

        convs.delete(&conv.id).await.unwrap();

        let conv_id = conv.id.clone();
        let orphans: i64 = convs
            .db
            .execute(move |conn| {
                let c: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
                    rusqlite::params![conv_id],
                    |row| row.get(0),
                )?;
                Ok(c)
            })
            .await
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[tokio::test]
    async fn delete_unknown_conversation_is_not_found() {
        let (convs, _) = setup().await;
        let err = convs.delete("nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn list_for_user_includes_preview_fields() {
        let (convs, users) = setup().await;
        let user = users.create("a@example.com", None).await.unwrap();
        let conv = convs
            .create(&user.id, Some("Billing question"), "refund please")
            .await
            .unwrap();
        convs
            .append_message(
                &conv.id,
                MessageRole::Assistant,
                "sure",
                Some(AgentType::Billing),
                None,
            )
            .await
            .unwrap();

        let previews = convs.list_for_user(&user.id).await.unwrap();
        assert_eq!(previews.len(), 1);
        assert_eq!(previews[0].message_count, 2);
        assert_eq!(
            previews[0].last_message.as_ref().unwrap().content,
            "sure"
        );
    }

    #[tokio::test]
    async fn recent_history_caps_conversations_at_five() {
        let (convs, users) = setup().await;
        let user = users.create("a@example.com", None).await.unwrap();

        for i in 0..7 {
            convs
                .create(&user.id, None, &format!("conversation {i}"))
                .await
                .unwrap();
        }

        let history = convs.recent_history(&user.id, 10).await.unwrap();
        assert_eq!(history.len(), 5);
    }

    #[tokio::test]
    async fn metadata_round_trips_as_json() {
        let (convs, users) = setup().await;
        let user = users.create("a@example.com", None).await.unwrap();
        let conv = convs.create(&user.id, None, "hello").await.unwrap();

        let meta = serde_json::json!({"tool_calls": 1});
        convs
            .append_message(
                &conv.id,
                MessageRole::Assistant,
                "done",
                Some(AgentType::Order),
                Some(&meta),
            )
            .await
            .unwrap();

        let messages = convs.messages(&conv.id, None).await.unwrap();
        assert_eq!(messages[1].metadata.as_ref().unwrap()["tool_calls"], 1);
        assert_eq!(messages[1].agent_type, Some(AgentType::Order));
    }
}
