use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::metrics::RATE_LIMITED_TOTAL;

pub const UNKNOWN_CLIENT: &str = "unknown";

// Rate limit entry - tracks requests per client within one fixed window
#[derive(Debug, Clone)]
pub struct RateLimitEntry {
    pub count: u32,
    pub reset_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max: u32,
}

/// Outcome of one [`RateLimitStore::check`] call. Never an error: the caller
/// decides what to do with a rejection (usually a 429).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub success: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_time: DateTime<Utc>,
}

/// Fixed-window request counter keyed by client identity.
///
/// Clones share the same map. Each key lives in one dashmap shard, and the
/// increment-then-compare for a key runs while that shard's write lock is
/// held, so concurrent requests from one client are never under-counted
/// inside a process. Separate processes keep separate counts.
#[derive(Clone)]
pub struct RateLimitStore {
    config: RateLimitConfig,
    entries: Arc<DashMap<String, RateLimitEntry>>,
}

impl RateLimitStore {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            entries: Arc::new(DashMap::new()),
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn check(&self, identifier: &str) -> RateLimitDecision {
        self.check_at(identifier, Utc::now())
    }

    pub fn check_at(&self, identifier: &str, now: DateTime<Utc>) -> RateLimitDecision {
        let limit = self.config.max;
        let window = chrono::Duration::from_std(self.config.window)
            .unwrap_or(chrono::Duration::MAX);

        let mut entry = self
            .entries
            .entry(identifier.to_string())
            .or_insert_with(|| RateLimitEntry {
                count: 0,
                reset_time: now,
            });

        // first request, or the window ended -> start a new one
        if entry.count == 0 || now > entry.reset_time {
            entry.count = 1;
            entry.reset_time = now.checked_add_signed(window).unwrap_or(DateTime::<Utc>::MAX_UTC);
            return RateLimitDecision {
                success: limit >= 1,
                limit,
                remaining: limit.saturating_sub(1),
                reset_time: entry.reset_time,
            };
        }

        entry.count = entry.count.saturating_add(1);
        if entry.count > limit {
            return RateLimitDecision {
                success: false,
                limit,
                remaining: 0,
                reset_time: entry.reset_time,
            };
        }

        RateLimitDecision {
            success: true,
            limit,
            remaining: limit - entry.count,
            reset_time: entry.reset_time,
        }
    }

    /// Drops entries whose window has ended. A dropped key starts a fresh
    /// window on its next request, exactly as an expired entry would.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.reset_time >= now);
        before.saturating_sub(self.entries.len())
    }
}

// Background sweep - evicts expired windows every `every`
pub async fn sweeper(store: RateLimitStore, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let removed = store.purge_expired(Utc::now());
        if removed > 0 {
            debug!(removed, remaining = store.len(), "Purged expired rate limit entries");
        }
    }
}

/// Client identity for rate limiting: first `x-forwarded-for` hop, then
/// `x-real-ip`, then `"unknown"`.
pub fn client_identity(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}

fn apply_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    let pairs = [
        ("x-ratelimit-limit", decision.limit.to_string()),
        ("x-ratelimit-remaining", decision.remaining.to_string()),
        ("x-ratelimit-reset", decision.reset_time.timestamp().to_string()),
    ];
    for (name, value) in pairs {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
}

// Middleware - rejects with 429 once a client exhausts its window
pub async fn rate_limit_middleware(
    State(store): State<RateLimitStore>,
    request: Request,
    next: Next,
) -> Response {
    let identity = client_identity(request.headers());
    let decision = store.check(&identity);

    if !decision.success {
        RATE_LIMITED_TOTAL.inc();
        warn!(client = %identity, path = %request.uri().path(), "Rate limit exceeded");

        let retry_after = (decision.reset_time - Utc::now()).num_seconds().max(1);
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({ "error": "Too many requests" })),
        )
            .into_response();
        apply_headers(response.headers_mut(), &decision);
        if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
            response.headers_mut().insert(axum::http::header::RETRY_AFTER, value);
        }
        return response;
    }

    let mut response = next.run(request).await;
    apply_headers(response.headers_mut(), &decision);
    response
}
