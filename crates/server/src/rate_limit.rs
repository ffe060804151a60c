use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::auth::CREDENTIAL_HEADER;
use crate::error::ApiError;
use crate::state::AppState;

/// Storage seam for request counters.
///
/// The in-memory store suffices for a single process; a shared store can
/// be swapped in without touching the limiter or the middleware.
pub trait CounterStore: Send + Sync {
    /// Record one request for `key` in the window beginning at
    /// `window_start` and return the count including this request.
    /// A different `window_start` than the stored one resets the count.
    fn increment(&self, key: &str, window_start: u64) -> u32;
}

#[derive(Default)]
pub struct InMemoryCounterStore {
    counters: Mutex<HashMap<String, (u64, u32)>>,
}

impl CounterStore for InMemoryCounterStore {
    fn increment(&self, key: &str, window_start: u64) -> u32 {
        let mut counters = self.counters.lock().expect("counter lock");
        let entry = counters.entry(key.to_string()).or_insert((window_start, 0));
        if entry.0 != window_start {
            *entry = (window_start, 0);
        }
        entry.1 += 1;
        entry.1
    }
}

/// Fixed-window limiter: windows are aligned to multiples of the window
/// length, and every request (allowed or rejected) counts against its
/// window.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    max_requests: u32,
    window_secs: u64,
}

pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Seconds until the current window rolls over.
    pub reset_secs: u64,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, max_requests: u32, window_secs: u64) -> Self {
        Self { store, max_requests, window_secs: window_secs.max(1) }
    }

    pub fn check(&self, key: &str, now_secs: u64) -> RateDecision {
        let window_start = now_secs - now_secs % self.window_secs;
        let count = self.store.increment(key, window_start);
        RateDecision {
            allowed: count <= self.max_requests,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(count),
            reset_secs: window_start + self.window_secs - now_secs,
        }
    }
}

pub async fn enforce(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let key = client_key(request.headers());
    let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_secs(),
        Err(error) => {
            warn!(error = %error, "system clock is before the epoch");
            0
        }
    };

    let decision = state.limiter.check(&key, now);
    if !decision.allowed {
        warn!(key = %key, "rate limit exceeded");
        return ApiError::rate_limited(decision.reset_secs).into_response();
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    insert_count_header(headers, "x-ratelimit-limit", u64::from(decision.limit));
    insert_count_header(headers, "x-ratelimit-remaining", u64::from(decision.remaining));
    insert_count_header(headers, "x-ratelimit-reset", decision.reset_secs);
    response
}

/// Callers are keyed by credential when one is present, by proxy-reported
/// address otherwise, and collapse into a single anonymous bucket when
/// neither exists.
fn client_key(headers: &HeaderMap) -> String {
    for header in [CREDENTIAL_HEADER, "x-forwarded-for"] {
        if let Some(value) = headers.get(header).and_then(|value| value.to_str().ok()) {
            let value = value.split(',').next().unwrap_or("").trim();
            if !value.is_empty() {
                return format!("{header}:{value}");
            }
        }
    }
    "anonymous".to_string()
}

fn insert_count_header(headers: &mut HeaderMap, name: &'static str, value: u64) {
    if let Ok(value) = HeaderValue::from_str(&value.to_string()) {
        headers.insert(name, value);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::{HeaderMap, HeaderValue};

    use super::{client_key, InMemoryCounterStore, RateLimiter};

    fn limiter(max_requests: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new(Arc::new(InMemoryCounterStore::default()), max_requests, window_secs)
    }

    #[test]
    fn requests_within_the_limit_are_allowed() {
        let limiter = limiter(3, 60);
        for _ in 0..3 {
            assert!(limiter.check("key", 100).allowed);
        }
        assert!(!limiter.check("key", 100).allowed);
    }

    #[test]
    fn remaining_counts_down_and_rejections_keep_counting() {
        let limiter = limiter(2, 60);
        assert_eq!(limiter.check("key", 100).remaining, 1);
        assert_eq!(limiter.check("key", 100).remaining, 0);
        assert_eq!(limiter.check("key", 100).remaining, 0);
    }

    #[test]
    fn counts_reset_when_the_window_rolls_over() {
        let limiter = limiter(1, 60);
        assert!(limiter.check("key", 100).allowed);
        assert!(!limiter.check("key", 119).allowed);
        // 120 starts the next 60s-aligned window.
        assert!(limiter.check("key", 120).allowed);
    }

    #[test]
    fn keys_are_tracked_independently() {
        let limiter = limiter(1, 60);
        assert!(limiter.check("alpha", 100).allowed);
        assert!(limiter.check("beta", 100).allowed);
        assert!(!limiter.check("alpha", 100).allowed);
    }

    #[test]
    fn reset_reports_seconds_until_the_window_boundary() {
        let limiter = limiter(5, 60);
        assert_eq!(limiter.check("key", 100).reset_secs, 20);
        assert_eq!(limiter.check("key", 120).reset_secs, 60);
    }

    #[test]
    fn credential_beats_forwarded_address_beats_anonymous() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_key(&headers), "anonymous");

        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.9, 10.0.0.1"));
        assert_eq!(client_key(&headers), "x-forwarded-for:10.0.0.9");

        headers.insert("x-api-key", HeaderValue::from_static("sk-ant-test"));
        assert_eq!(client_key(&headers), "x-api-key:sk-ant-test");
    }
}
