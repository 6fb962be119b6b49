//! REST API route handlers.
//!
//! Handlers validate the request shape, delegate to the orchestrator, and
//! render the `{success, data}` envelopes the chat client expects. Agent
//! types are emitted uppercase on the wire (`SUPPORT`, `ORDER`, ...), the
//! format the browser client renders.

use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{Value, json};

use opendesk_store::{AgentType, ConversationPreview, StoredMessage};

use crate::error::ApiError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// POST /api/chat/messages
// ---------------------------------------------------------------------------

/// Request body for the chat endpoint.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBody {
    /// Opaque user id or email address.
    pub user_id: String,
    /// Existing conversation to continue; absent or stale ids start a new one.
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// The message text.
    pub message: String,
    /// Deliver the reply as raw text fragments instead of one JSON blob.
    #[serde(default)]
    pub stream: bool,
}

/// Process a chat message, streaming or single-shot.
pub async fn post_message(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChatBody>,
) -> Result<Response, ApiError> {
    if body.user_id.trim().is_empty() {
        return Err(ApiError::validation("userId is required"));
    }
    if body.message.trim().is_empty() {
        return Err(ApiError::validation("message must not be empty"));
    }

    let conversation_id = body.conversation_id.as_deref();

    if body.stream {
        let (_, rx) = state
            .orchestrator
            .stream_message(&body.user_id, conversation_id, &body.message)
            .await?;

        // Raw text fragments, not JSON-framed.
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv()
                .await
                .map(|chunk| (Ok::<_, std::convert::Infallible>(chunk), rx))
        });

        let response = Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(Body::from_stream(stream))
            .map_err(|e| ApiError::internal(format!("failed to build stream response: {e}")))?;
        return Ok(response);
    }

    let outcome = state
        .orchestrator
        .process_message(&body.user_id, conversation_id, &body.message)
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "conversationId": outcome.conversation_id,
            "message": outcome.reply,
            "agentType": wire_agent_type(outcome.agent_type),
        }
    }))
    .into_response())
}

// ---------------------------------------------------------------------------
// Conversation routes
// ---------------------------------------------------------------------------

/// `userId` query parameter shared by the conversation routes.
#[derive(Deserialize)]
pub struct OwnerQuery {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

impl OwnerQuery {
    fn require(&self) -> Result<&str, ApiError> {
        self.user_id
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| ApiError::validation("userId query parameter is required"))
    }
}

/// GET /api/chat/conversations — list the user's conversations.
pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<Value>, ApiError> {
    let user_ref = query.require()?;
    let previews = state.orchestrator.list_conversations(user_ref).await?;

    Ok(Json(json!({
        "success": true,
        "data": previews.iter().map(preview_json).collect::<Vec<_>>(),
    })))
}

/// GET /api/chat/conversations/{id} — full ordered history, owner-scoped.
pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<Value>, ApiError> {
    let user_ref = query.require()?;
    let (conversation, messages) = state.orchestrator.get_conversation(user_ref, &id).await?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "id": conversation.id,
            "title": conversation.title,
            "createdAt": conversation.created_at,
            "updatedAt": conversation.updated_at,
            "messages": messages.iter().map(message_json).collect::<Vec<_>>(),
        }
    })))
}

/// DELETE /api/chat/conversations/{id} — owner-scoped cascade delete.
pub async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<Value>, ApiError> {
    let user_ref = query.require()?;
    state.orchestrator.delete_conversation(user_ref, &id).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Conversation deleted",
    })))
}

// ---------------------------------------------------------------------------
// GET /api/agents
// ---------------------------------------------------------------------------

/// Static catalog of the three responders and their declared tool names.
pub async fn agents() -> Json<Value> {
    let agents: Vec<Value> = opendesk_agent::ResponderKind::ALL
        .iter()
        .map(|kind| {
            json!({
                "type": kind.slug(),
                "name": kind.display_name(),
                "description": kind.description(),
                "capabilities": kind.tool_names(),
            })
        })
        .collect();

    Json(json!({
        "success": true,
        "data": { "agents": agents },
    }))
}

/// GET /api/agents/{type}/capabilities — one responder's tools and prompt.
pub async fn agent_capabilities(Path(slug): Path<String>) -> Result<Json<Value>, ApiError> {
    let kind = opendesk_agent::ResponderKind::from_slug(&slug)
        .ok_or_else(|| ApiError::validation("Invalid agent type"))?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "type": kind.slug(),
            "agentType": wire_agent_type(kind.agent_type()),
            "tools": kind.tool_definitions(),
            "systemPrompt": kind.system_prompt(),
        }
    })))
}

// ---------------------------------------------------------------------------
// GET /api/users/by-email
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct EmailQuery {
    pub email: Option<String>,
}

/// Demo helper: get or lazily create a user by email.
pub async fn user_by_email(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EmailQuery>,
) -> Result<Json<Value>, ApiError> {
    let email = query
        .email
        .as_deref()
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| ApiError::validation("email query parameter is required"))?;

    let user = state.users.get_or_create_by_email(email).await?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "id": user.id,
            "email": user.email,
            "name": user.name,
        }
    })))
}

// ---------------------------------------------------------------------------
// GET /api/health
// ---------------------------------------------------------------------------

/// Liveness plus store connectivity probe.
pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    let timestamp = chrono::Utc::now().to_rfc3339();

    match state.db.ping().await {
        Ok(()) => Json(json!({
            "status": "healthy",
            "timestamp": timestamp,
            "services": { "database": "connected" },
        }))
        .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "health probe failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "timestamp": timestamp,
                    "services": { "database": "disconnected" },
                })),
            )
                .into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// Serialization helpers
// ---------------------------------------------------------------------------

/// Agent types travel uppercase on the wire.
fn wire_agent_type(agent_type: AgentType) -> String {
    agent_type.as_str().to_uppercase()
}

fn message_json(message: &StoredMessage) -> Value {
    json!({
        "id": message.id,
        "role": message.role.as_str(),
        "content": message.content,
        "agentType": message.agent_type.map(wire_agent_type),
        "createdAt": message.created_at,
    })
}

fn preview_json(preview: &ConversationPreview) -> Value {
    json!({
        "id": preview.id,
        "title": preview.title,
        "updatedAt": preview.updated_at,
        "messageCount": preview.message_count,
        "lastMessage": preview.last_message.as_ref().map(message_json),
    })
}
