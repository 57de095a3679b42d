use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, header},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::metrics::SNAPSHOTS_RECORDED_TOTAL;
use crate::models::{HistoryResponse, RecordResponse, ServiceAvailability, Snapshot, UptimeSummary};
use crate::state::SharedState;

pub const DEFAULT_LIMIT: u32 = 24;
// one week of hourly snapshots
pub const MAX_LIMIT: u32 = 168;
// cron cadence the staleness check assumes
pub const EXPECTED_RECORD_INTERVAL_SECS: i64 = 3600;

#[derive(Debug, Deserialize)]
pub struct RecordQuery {
    pub secret: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    // kept as text so "abc" falls back instead of failing extraction
    pub limit: Option<String>,
}

/// Window size for history reads. Unparseable or zero -> 24, otherwise
/// clamped into 1..=168.
pub fn parse_limit(raw: Option<&str>) -> u32 {
    match raw.and_then(|v| v.trim().parse::<i64>().ok()) {
        None | Some(0) => DEFAULT_LIMIT,
        Some(n) => n.clamp(1, MAX_LIMIT as i64) as u32,
    }
}

// fixed-size digests: timing doesn't depend on the secret's length or prefix
fn secrets_match(expected: &str, provided: &str) -> bool {
    Sha256::digest(expected.as_bytes()) == Sha256::digest(provided.as_bytes())
}

fn authorize(expected: Option<&str>, query: Option<&str>, headers: &HeaderMap) -> AppResult<()> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let provided = query.or_else(|| {
        headers
            .get("x-cron-secret")
            .and_then(|v| v.to_str().ok())
    });

    match provided {
        Some(provided) if secrets_match(expected, provided) => Ok(()),
        _ => Err(AppError::Unauthorized),
    }
}

fn resolve_origin(state: &SharedState, headers: &HeaderMap) -> String {
    if let Some(url) = &state.settings.public_url {
        return url.clone();
    }

    // Host is caller-controlled; only follow it for callers that proved the secret
    let host = state
        .settings
        .cron_secret
        .as_ref()
        .and_then(|_| headers.get(header::HOST))
        .and_then(|v| v.to_str().ok());
    match host {
        Some(host) => {
            let scheme = headers
                .get("x-forwarded-proto")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("http");
            format!("{}://{}", scheme, host)
        }
        None => format!("http://127.0.0.1:{}", state.settings.port),
    }
}

// GET /api/admin/uptime/record - one collection cycle, one snapshot
pub async fn record_handler(
    State(state): State<SharedState>,
    Query(query): Query<RecordQuery>,
    headers: HeaderMap,
) -> AppResult<Json<RecordResponse>> {
    if let Err(e) = authorize(
        state.settings.cron_secret.as_deref(),
        query.secret.as_deref(),
        &headers,
    ) {
        warn!("Rejected uptime record request with bad secret");
        return Err(e);
    }

    let origin = resolve_origin(&state, &headers);
    let report = state.collector.collect(&origin).await;
    let snapshot = state.store.insert(&report).await?;

    SNAPSHOTS_RECORDED_TOTAL.inc();
    info!(
        id = snapshot.id,
        healthy = snapshot.healthy,
        total = snapshot.total,
        "Uptime snapshot recorded"
    );

    Ok(Json(RecordResponse {
        success: true,
        snapshot,
    }))
}

// GET /api/admin/uptime/history
pub async fn history_handler(
    State(state): State<SharedState>,
    Query(query): Query<LimitQuery>,
) -> AppResult<Json<HistoryResponse>> {
    let limit = parse_limit(query.limit.as_deref());
    let data = state.store.recent(limit).await?;
    let count = data.len();
    Ok(Json(HistoryResponse { data, count }))
}

// GET /api/admin/uptime/summary
pub async fn summary_handler(
    State(state): State<SharedState>,
    Query(query): Query<LimitQuery>,
) -> AppResult<Json<UptimeSummary>> {
    let limit = parse_limit(query.limit.as_deref());
    let snapshots = state.store.recent(limit).await?;
    let interval = chrono::Duration::seconds(EXPECTED_RECORD_INTERVAL_SECS);
    Ok(Json(summarize(&snapshots, Utc::now(), interval)))
}

fn percent(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 / whole as f64 * 10_000.0).round() / 100.0
}

/// Aggregates newest-first snapshots into availability figures.
///
/// The window is stale when it is empty or its newest snapshot is older than
/// twice `expected_interval`, i.e. the scheduler missed at least one run.
pub fn summarize(
    snapshots: &[Snapshot],
    now: DateTime<Utc>,
    expected_interval: chrono::Duration,
) -> UptimeSummary {
    let window = snapshots.len();
    let fully_healthy = snapshots.iter().filter(|s| s.all_healthy).count() as u32;

    let mut services: Vec<ServiceAvailability> = Vec::new();
    for check in snapshots.iter().flat_map(|s| s.services.iter()) {
        let idx = match services.iter().position(|s| s.name == check.name) {
            Some(idx) => idx,
            None => {
                services.push(ServiceAvailability {
                    name: check.name.clone(),
                    checks: 0,
                    healthy: 0,
                    availability_percent: 0.0,
                });
                services.len() - 1
            }
        };
        services[idx].checks += 1;
        if check.ok {
            services[idx].healthy += 1;
        }
    }
    for service in &mut services {
        service.availability_percent = percent(service.healthy, service.checks);
    }

    let last_recorded_at = snapshots.first().map(|s| s.created_at);
    let stale = match last_recorded_at {
        Some(at) => now - at > expected_interval * 2,
        None => true,
    };

    UptimeSummary {
        window,
        uptime_percent: percent(fully_healthy, window as u32),
        services,
        last_recorded_at,
        stale,
    }
}
