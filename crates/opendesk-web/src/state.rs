//! Shared application state for the web server.
//!
//! [`AppState`] is wrapped in an `Arc` and shared across all request
//! handlers. It holds the orchestrator, the database handle (for the health
//! probe and the user helper), and the rate limiter.

use std::sync::Arc;

use opendesk_agent::Orchestrator;
use opendesk_store::{Database, UserStore};

use crate::ratelimit::RateLimiter;

/// Shared state accessible from every Axum handler.
pub struct AppState {
    /// The conversation orchestrator behind the chat routes.
    pub orchestrator: Arc<Orchestrator>,

    /// Database handle for the health probe.
    pub db: Database,

    /// User lookup for the by-email helper route.
    pub users: UserStore,

    /// Per-IP request counters.
    pub rate_limiter: RateLimiter,
}

impl AppState {
    /// Assemble the shared state.
    pub fn new(orchestrator: Arc<Orchestrator>, db: Database) -> Self {
        Self {
            orchestrator,
            users: UserStore::new(db.clone()),
            db,
            rate_limiter: RateLimiter::default(),
        }
    }
}
