//! Rate limiting middleware.
//!
//! Sliding-window limiter keyed by the authenticated driver when present,
//! falling back to the client IP for unauthenticated routes.

use crate::auth::Identity;
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window.
    pub max_requests: u32,
    /// Window duration.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
        }
    }
}

struct WindowEntry {
    count: u32,
    window_start: Instant,
}

#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Arc<Mutex<HashMap<String, WindowEntry>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns Err(retry_after) when the caller is over budget.
    fn check(&self, key: &str) -> Result<(), Duration> {
        let mut windows = self.windows.lock();
        let now = Instant::now();

        let entry = windows.entry(key.to_string()).or_insert(WindowEntry {
            count: 0,
            window_start: now,
        });

        if now.duration_since(entry.window_start) >= self.config.window {
            entry.count = 0;
            entry.window_start = now;
        }

        entry.count += 1;
        if entry.count > self.config.max_requests {
            let reset_at = entry.window_start + self.config.window;
            Err(reset_at.saturating_duration_since(now))
        } else {
            Ok(())
        }
    }

    /// Drop windows idle for two periods. Called from a background task.
    pub fn cleanup(&self) {
        let window = self.config.window;
        let now = Instant::now();
        self.windows
            .lock()
            .retain(|_, entry| now.duration_since(entry.window_start) < window * 2);
    }
}

pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    axum::extract::State(limiter): axum::extract::State<RateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = request
        .extensions()
        .get::<Identity>()
        .map(|identity| identity.subject.clone())
        .unwrap_or_else(|| addr.ip().to_string());

    match limiter.check(&key) {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            warn!(key = %key, retry_after_secs = retry_after.as_secs(), "Rate limit exceeded");

            let body = serde_json::json!({
                "error": "rate_limit_exceeded",
                "retry_after_seconds": retry_after.as_secs(),
            });
            (
                StatusCode::TOO_MANY_REQUESTS,
                [("Retry-After", retry_after.as_secs().to_string())],
                axum::Json(body),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_under_limit_then_rejects() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 5,
            window: Duration::from_secs(60),
        });

        for _ in 0..5 {
            assert!(limiter.check("driver-1").is_ok());
        }
        assert!(limiter.check("driver-1").is_err());
        // Other callers are unaffected.
        assert!(limiter.check("driver-2").is_ok());
    }

    #[test]
    fn cleanup_retains_active_windows() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 5,
            window: Duration::from_secs(60),
        });
        limiter.check("driver-1").unwrap();
        limiter.cleanup();
        // Still within the window, so the count persists.
        for _ in 0..4 {
            assert!(limiter.check("driver-1").is_ok());
        }
        assert!(limiter.check("driver-1").is_err());
    }
}
