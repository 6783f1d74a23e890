use crate::AppState;
use axum::{
    extract::{ConnectInfo, Extension, Request},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Sliding-window limiter: at most `limit` requests per client in any `window`.
pub struct RateLimiter {
    seen: Mutex<HashMap<Option<IpAddr>, VecDeque<Instant>>>,
    limit: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
            limit: limit as usize,
            window,
        }
    }

    /// Records a request from `client`, or returns how long until one would be admitted.
    pub fn admit(&self, client: Option<IpAddr>) -> Result<(), Duration> {
        let now = Instant::now();
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        let hits = seen.entry(client).or_default();

        while hits.front().is_some_and(|at| now.duration_since(*at) >= self.window) {
            hits.pop_front();
        }

        if hits.len() >= self.limit {
            let oldest = hits.front().copied().unwrap_or(now);
            return Err(self.window.saturating_sub(now.duration_since(oldest)));
        }
        hits.push_back(now);
        Ok(())
    }

    /// Forgets clients with no request inside the window.
    pub fn prune(&self) {
        let now = Instant::now();
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        seen.retain(|_, hits| hits.back().is_some_and(|at| now.duration_since(*at) < self.window));
    }

    fn tracked_clients(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

fn client_ip(request: &Request) -> Option<IpAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

fn too_many_requests(retry_after: Duration) -> Response {
    // Round up so a client waiting exactly this long is admitted.
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, secs.to_string())],
        Json(json!({
            "success": false,
            "error": "Too many requests",
            "message": "Rate limit exceeded. Please try again later.",
            "retryAfterSecs": secs,
        })),
    )
        .into_response()
}

async fn limit(limiter: &RateLimiter, scope: &'static str, request: Request, next: Next) -> Response {
    let ip = client_ip(&request);

    if let Err(retry_after) = limiter.admit(ip) {
        tracing::warn!(client_ip = ?ip, scope, retry_after_ms = retry_after.as_millis() as u64, "rate limit exceeded");
        return too_many_requests(retry_after);
    }

    if limiter.tracked_clients() > 1024 {
        limiter.prune();
    }

    next.run(request).await
}

/// Limits the provider-backed routes (transcription and completion).
pub async fn ai_rate_limit_middleware(
    Extension(state): Extension<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    limit(&state.ai_rate_limiter, "ai", request, next).await
}

// Stricter limit for sign-in and sign-up
pub async fn auth_rate_limit_middleware(
    Extension(state): Extension<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    limit(&state.auth_rate_limiter, "auth", request, next).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::testing::{send, TestApp};
    use serde_json::json;
    use std::net::Ipv4Addr;

    fn ip(last: u8) -> Option<IpAddr> {
        Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, last)))
    }

    #[tokio::test(start_paused = true)]
    async fn requests_over_the_limit_are_refused() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.admit(ip(1)).is_ok());
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(limiter.admit(ip(1)).is_ok());

        // The first hit leaves the window 50 s from now.
        assert_eq!(limiter.admit(ip(1)), Err(Duration::from_secs(50)));
        // Other clients have their own window.
        assert!(limiter.admit(ip(2)).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn window_slides_instead_of_resetting() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.admit(ip(1)).is_ok());
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(limiter.admit(ip(1)).is_ok());

        tokio::time::advance(Duration::from_secs(30)).await;
        // Only the first hit has expired.
        assert!(limiter.admit(ip(1)).is_ok());
        assert!(limiter.admit(ip(1)).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_clients_are_pruned() {
        let limiter = RateLimiter::new(5, Duration::from_secs(60));
        limiter.admit(ip(1)).unwrap();
        limiter.admit(ip(2)).unwrap();
        tokio::time::advance(Duration::from_secs(45)).await;
        limiter.admit(ip(2)).unwrap();

        tokio::time::advance(Duration::from_secs(20)).await;
        limiter.prune();
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[tokio::test]
    async fn chat_answers_429_past_the_limit() {
        let config = AppConfig::from_lookup(|key| match key {
            "DATABASE_URL" => Some("postgres://localhost/open_speech_test".to_string()),
            "OPENAI_API_KEY" => Some("sk-test".to_string()),
            "JWT_SECRET" => Some("test-secret".to_string()),
            "BCRYPT_COST" => Some("4".to_string()),
            "RATE_LIMIT_PER_MINUTE" => Some("2".to_string()),
            _ => None,
        })
        .unwrap();
        let app = TestApp::builder().config(config).build();
        let token = app.sign_up("ada@example.com", "hunter22").await;
        let hello = json!({ "message": "Hello" });

        for _ in 0..2 {
            let (status, _) = send(&app.router, "POST", "/api/chat", Some(&token), Some(hello.clone())).await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, body) = send(&app.router, "POST", "/api/chat", Some(&token), Some(hello)).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"], "Too many requests");
        assert!(body["retryAfterSecs"].as_u64().unwrap() <= 60);
    }
}
