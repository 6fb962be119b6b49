//! Web server setup and startup.
//!
//! [`WebServer`] composes the Axum router, registers all routes, applies the
//! CORS and rate-limit layers, and starts the HTTP listener.

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, Method};
use axum::middleware;
use axum::routing::{delete, get, post};
use tower_http::cors::CorsLayer;

use opendesk_agent::Orchestrator;
use opendesk_store::Database;

use crate::WebConfig;
use crate::api;
use crate::ratelimit;
use crate::state::AppState;

/// The Opendesk web server.
pub struct WebServer {
    config: WebConfig,
    state: Arc<AppState>,
}

impl WebServer {
    /// Create a new web server over the orchestrator and database.
    pub fn new(config: WebConfig, orchestrator: Arc<Orchestrator>, db: Database) -> Self {
        let state = Arc::new(AppState::new(orchestrator, db));
        Self { config, state }
    }

    /// Return the `host:port` string this server will bind to.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.config.bind_addr, self.config.port)
    }

    /// Build the Axum router with all routes registered.
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(
                self.config
                    .cors_origin
                    .parse::<HeaderValue>()
                    .unwrap_or_else(|_| HeaderValue::from_static("http://localhost:5173")),
            )
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers(tower_http::cors::Any);

        Router::new()
            // Chat.
            .route("/api/chat/messages", post(api::post_message))
            .route("/api/chat/conversations", get(api::list_conversations))
            .route("/api/chat/conversations/{id}", get(api::get_conversation))
            .route(
                "/api/chat/conversations/{id}",
                delete(api::delete_conversation),
            )
            // Responder catalog.
            .route("/api/agents", get(api::agents))
            .route(
                "/api/agents/{type}/capabilities",
                get(api::agent_capabilities),
            )
            // Identity helper.
            .route("/api/users/by-email", get(api::user_by_email))
            // Health.
            .route("/api/health", get(api::health))
            .layer(middleware::from_fn_with_state(
                Arc::clone(&self.state),
                ratelimit::rate_limit,
            ))
            .layer(cors)
            .with_state(Arc::clone(&self.state))
    }

    /// Start the server and block until it is shut down.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP listener cannot be bound.
    pub async fn start(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = self.addr();
        let router = self.router();

        tracing::info!(addr = %addr, "starting web server");

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
