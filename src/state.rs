use std::sync::Arc;

use crate::collector::StatusCollector;
use crate::config::Settings;
use crate::rate_limit::RateLimitStore;
use crate::store::SnapshotStore;

// app's shared state
pub struct AppState {
    pub client: reqwest::Client,
    pub store: SnapshotStore,
    pub collector: StatusCollector,
    pub rate_limiter: RateLimitStore, // guards /api/admin/uptime/*
    pub settings: Settings,
}

pub type SharedState = Arc<AppState>;
