//! Pflix service status: liveness probes, scheduled uptime snapshots, uptime
//! history, per-client rate limiting and a polling service monitor.

pub mod collector;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod monitor;
pub mod rate_limit;
pub mod state;
pub mod store;

use axum::{Router, middleware, routing::get};

use crate::handlers::{
    health_handler, health_head_handler, history_handler, metrics_handler, record_handler,
    storage_health_handler, summary_handler, transcoder_health_handler,
};
use crate::rate_limit::rate_limit_middleware;
use crate::state::SharedState;

/// Builds the HTTP surface. Only the uptime admin routes are rate limited;
/// the health routes are polled by monitors and the collector itself.
pub fn build_router(state: SharedState) -> Router {
    let uptime = Router::new()
        .route("/record", get(record_handler))
        .route("/history", get(history_handler))
        .route("/summary", get(summary_handler))
        .route_layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ));

    Router::new()
        .route("/api/health", get(health_handler).head(health_head_handler))
        .route("/api/health/storage", get(storage_health_handler))
        .route("/api/health/transcoder", get(transcoder_health_handler))
        .nest("/api/admin/uptime", uptime)
        .route("/metrics", get(metrics_handler)) // metrics endpoint
        .with_state(state)
}
