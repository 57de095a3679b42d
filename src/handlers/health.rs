use axum::{Json, extract::State, http::StatusCode};
use chrono::Utc;
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use tracing::warn;

use crate::collector::TIMEOUT_ERROR;
use crate::state::SharedState;

pub const DATABASE_TIMEOUT: Duration = Duration::from_millis(1500);
pub const DEPENDENCY_TIMEOUT: Duration = Duration::from_secs(5);

fn elapsed(started: Instant) -> String {
    format!("{}ms", started.elapsed().as_millis())
}

// GET /api/health - liveness plus a bounded database round-trip
pub async fn health_handler(State(state): State<SharedState>) -> (StatusCode, Json<Value>) {
    let started = Instant::now();
    let result = tokio::time::timeout(DATABASE_TIMEOUT, state.store.ping()).await;

    let error = match result {
        Ok(Ok(())) => {
            return (
                StatusCode::OK,
                Json(json!({
                    "status": "ok",
                    "timestamp": Utc::now().to_rfc3339(),
                    "database": "connected",
                    "duration": elapsed(started),
                })),
            );
        }
        Ok(Err(e)) => e.to_string(),
        Err(_) => TIMEOUT_ERROR.to_string(),
    };

    warn!(error = %error, "Database health check failed");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({
            "status": "error",
            "timestamp": Utc::now().to_rfc3339(),
            "database": "disconnected",
            "error": error,
            "duration": elapsed(started),
        })),
    )
}

// HEAD /api/health - cheap probe for the client monitor, no database work
pub async fn health_head_handler() -> StatusCode {
    StatusCode::OK
}

// GET /api/health/storage
pub async fn storage_health_handler(State(state): State<SharedState>) -> (StatusCode, Json<Value>) {
    let request = state
        .settings
        .storage_url
        .as_deref()
        .map(|url| state.client.head(url));

    // object stores answer anonymous HEADs with 403; anything below 500 is reachable
    let bound = state.settings.dependency_timeout.unwrap_or(DEPENDENCY_TIMEOUT);
    probe("storage", request, bound, |status| status.as_u16() < 500).await
}

// GET /api/health/transcoder
pub async fn transcoder_health_handler(
    State(state): State<SharedState>,
) -> (StatusCode, Json<Value>) {
    let request = state
        .settings
        .transcoder_url
        .as_deref()
        .map(|url| state.client.get(url));

    let bound = state.settings.dependency_timeout.unwrap_or(DEPENDENCY_TIMEOUT);
    probe("transcoder", request, bound, |status| status.is_success()).await
}

async fn probe(
    service: &str,
    request: Option<reqwest::RequestBuilder>,
    bound: Duration,
    accept: fn(StatusCode) -> bool,
) -> (StatusCode, Json<Value>) {
    let started = Instant::now();

    let Some(request) = request else {
        return unavailable(service, "not configured".to_string(), started);
    };

    match tokio::time::timeout(bound, request.send()).await {
        Ok(Ok(res)) if accept(res.status()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "service": service,
                "statusCode": res.status().as_u16(),
                "duration": elapsed(started),
            })),
        ),
        Ok(Ok(res)) => unavailable(service, format!("HTTP {}", res.status().as_u16()), started),
        Ok(Err(e)) if e.is_timeout() => unavailable(service, TIMEOUT_ERROR.to_string(), started),
        Ok(Err(e)) => unavailable(service, e.to_string(), started),
        Err(_) => unavailable(service, TIMEOUT_ERROR.to_string(), started),
    }
}

fn unavailable(service: &str, error: String, started: Instant) -> (StatusCode, Json<Value>) {
    warn!(service, error = %error, "Dependency probe failed");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({
            "status": "error",
            "service": service,
            "error": error,
            "duration": elapsed(started),
        })),
    )
}
