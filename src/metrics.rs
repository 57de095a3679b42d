use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, register_counter, register_counter_vec, register_gauge,
    register_histogram,
};

lazy_static! {
    pub static ref RATE_LIMITED_TOTAL: Counter = register_counter!(
        "pflix_rate_limited_total",
        "Requests rejected by the rate limiter"
    )
    .unwrap();
    pub static ref HEALTH_CHECKS_TOTAL: CounterVec = register_counter_vec!(
        "pflix_health_checks_total",
        "Dependent service checks by service and outcome",
        &["service", "outcome"]
    )
    .unwrap();
    pub static ref SNAPSHOTS_RECORDED_TOTAL: Counter = register_counter!(
        "pflix_uptime_snapshots_recorded_total",
        "Uptime snapshots persisted"
    )
    .unwrap();
    pub static ref COLLECTION_LATENCY: Histogram = register_histogram!(
        "pflix_status_collection_latency_seconds",
        "Wall time of one status collection cycle in seconds"
    )
    .unwrap();
    pub static ref SERVICES_HEALTHY: Gauge = register_gauge!(
        "pflix_services_healthy",
        "Healthy services in the most recent collection"
    )
    .unwrap();
}
