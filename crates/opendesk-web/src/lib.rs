//! HTTP surface for Opendesk.
//!
//! This crate exposes the chat backend over JSON/HTTP:
//!
//! - `POST /api/chat/messages` — process a message, single-shot or streamed.
//! - `GET/DELETE /api/chat/conversations...` — owner-scoped history access.
//! - `GET /api/agents` — static catalog of the responders and their tools.
//! - `GET /api/users/by-email` — demo helper for identity bootstrap.
//! - `GET /api/health` — liveness plus store connectivity.
//!
//! Request validation, the per-IP rate limiter, CORS, and the structured
//! `{error: {message, code}}` body shape all live here; everything behind
//! the routes is delegated to the orchestrator.

pub mod api;
pub mod error;
pub mod ratelimit;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use server::WebServer;
pub use state::AppState;

/// Web server configuration.
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// The address to bind the HTTP server to.
    pub bind_addr: String,
    /// The port to listen on.
    pub port: u16,
    /// Allowed CORS origin for the browser frontend.
    pub cors_origin: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".into(),
            port: 3000,
            cors_origin: "http://localhost:5173".into(),
        }
    }
}
