#![allow(dead_code)]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, Response},
};
use pflix_status::{
    build_router,
    collector::StatusCollector,
    config::Settings,
    rate_limit::{RateLimitConfig, RateLimitStore},
    state::{AppState, SharedState},
    store::{SnapshotStore, create_pool},
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

pub fn generous_limits() -> RateLimitConfig {
    RateLimitConfig {
        window: Duration::from_secs(60),
        max: 1_000,
    }
}

/// App state over a fresh in-memory database.
pub async fn test_state(settings: Settings, limits: RateLimitConfig) -> SharedState {
    let pool = create_pool("sqlite::memory:")
        .await
        .expect("Failed to create in-memory SQLite pool");
    let client = reqwest::Client::new();

    Arc::new(AppState {
        client: client.clone(),
        store: SnapshotStore::new(pool),
        collector: StatusCollector::new(client).with_timeout(Duration::from_secs(2)),
        rate_limiter: RateLimitStore::new(limits),
        settings,
    })
}

pub fn router(state: &SharedState) -> Router {
    build_router(Arc::clone(state))
}

pub async fn send(app: Router, method: Method, uri: &str, headers: &[(&str, &str)]) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    app.oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, &[]).await
}

pub async fn json_body(res: Response<Body>) -> Value {
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
