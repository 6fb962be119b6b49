//! Per-IP rate limiting.
//!
//! A coarse abuse guard, not a correctness-critical resource: counters live
//! in a process-scoped `DashMap`, are never persisted, and use simple
//! read-modify-write with last-one-wins semantics under race.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use dashmap::DashMap;

use crate::error::ApiError;
use crate::state::AppState;

/// Fixed window length in seconds.
const WINDOW_SECS: i64 = 60;

/// Maximum requests per window per caller.
const MAX_REQUESTS: u32 = 100;

/// One caller's window.
#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: i64,
}

/// Process-scoped request counters keyed by caller address.
#[derive(Default, Clone)]
pub struct RateLimiter {
    windows: Arc<DashMap<String, Window>>,
}

impl RateLimiter {
    /// Record a hit for `caller`. Returns `false` when the caller is over
    /// budget for the current window.
    pub fn check(&self, caller: &str) -> bool {
        let now = Utc::now().timestamp();

        let mut entry = self
            .windows
            .entry(caller.to_string())
            .or_insert(Window {
                count: 0,
                reset_at: now + WINDOW_SECS,
            });

        if now > entry.reset_at {
            entry.count = 0;
            entry.reset_at = now + WINDOW_SECS;
        }

        if entry.count >= MAX_REQUESTS {
            return false;
        }

        entry.count += 1;
        true
    }
}

/// Axum middleware enforcing the per-IP budget on `/api/*` routes.
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let caller = caller_address(request.headers());

    if !state.rate_limiter.check(&caller) {
        tracing::warn!(%caller, "rate limit exceeded");
        return Err(ApiError::rate_limited());
    }

    Ok(next.run(request).await)
}

/// Best-effort caller address from proxy headers.
fn caller_address(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_budget() {
        let limiter = RateLimiter::default();
        for _ in 0..MAX_REQUESTS {
            assert!(limiter.check("1.2.3.4"));
        }
        assert!(!limiter.check("1.2.3.4"));
    }

    #[test]
    fn callers_are_counted_independently() {
        let limiter = RateLimiter::default();
        for _ in 0..MAX_REQUESTS {
            assert!(limiter.check("1.2.3.4"));
        }
        assert!(limiter.check("5.6.7.8"));
    }

    #[test]
    fn window_reset_restores_budget() {
        let limiter = RateLimiter::default();
        for _ in 0..MAX_REQUESTS {
            limiter.check("1.2.3.4");
        }
        assert!(!limiter.check("1.2.3.4"));

        // Force the window into the past.
        limiter.windows.get_mut("1.2.3.4").unwrap().reset_at = 0;
        assert!(limiter.check("1.2.3.4"));
    }

    #[test]
    fn caller_address_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "9.9.9.9".parse().unwrap());
        headers.insert("x-forwarded-for", "1.2.3.4".parse().unwrap());
        assert_eq!(caller_address(&headers), "1.2.3.4");

        let empty = HeaderMap::new();
        assert_eq!(caller_address(&empty), "unknown");
    }
}
