use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// One dependent service's result within a collection cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCheck {
    pub name: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSummary {
    pub healthy: u32,
    pub total: u32,
    pub all_healthy: bool,
}

impl StatusSummary {
    pub fn from_checks(checks: &[ServiceCheck]) -> Self {
        let healthy = checks.iter().filter(|c| c.ok).count() as u32;
        let total = checks.len() as u32;
        Self {
            healthy,
            total,
            // nothing checked is not "all healthy"
            all_healthy: total > 0 && healthy == total,
        }
    }
}

/// Transient output of one collection cycle, handed to the store once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub summary: StatusSummary,
    pub services: Vec<ServiceCheck>,
}

impl StatusReport {
    pub fn new(services: Vec<ServiceCheck>) -> Self {
        Self {
            summary: StatusSummary::from_checks(&services),
            services,
        }
    }
}

// Persisted snapshot (append-only)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub id: i64,
    pub healthy: u32,
    pub total: u32,
    pub all_healthy: bool,
    pub services: Vec<ServiceCheck>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub data: Vec<Snapshot>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordResponse {
    pub success: bool,
    pub snapshot: Snapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAvailability {
    pub name: String,
    pub checks: u32,
    pub healthy: u32,
    pub availability_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UptimeSummary {
    pub window: usize,
    pub uptime_percent: f64,
    pub services: Vec<ServiceAvailability>,
    pub last_recorded_at: Option<DateTime<Utc>>,
    pub stale: bool,
}
