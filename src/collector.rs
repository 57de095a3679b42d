use futures::future::join_all;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::metrics::{COLLECTION_LATENCY, HEALTH_CHECKS_TOTAL, SERVICES_HEALTHY};
use crate::models::{ServiceCheck, StatusReport};

pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(10);
pub const TIMEOUT_ERROR: &str = "Timeout";

// A dependent service: display name + health route relative to the origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTarget {
    pub name: String,
    pub path: String,
}

impl ServiceTarget {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

pub fn default_targets() -> Vec<ServiceTarget> {
    vec![
        ServiceTarget::new("database", "/api/health"),
        ServiceTarget::new("storage", "/api/health/storage"),
        ServiceTarget::new("transcoder", "/api/health/transcoder"),
    ]
}

/// Fans out to every target and folds the answers into one report.
///
/// A failing, slow or unreachable target only ever produces a failed
/// [`ServiceCheck`]; `collect` itself cannot fail.
#[derive(Clone)]
pub struct StatusCollector {
    client: reqwest::Client,
    targets: Vec<ServiceTarget>,
    timeout: Duration,
}

impl StatusCollector {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            targets: default_targets(),
            timeout: DEFAULT_CHECK_TIMEOUT,
        }
    }

    pub fn with_targets(mut self, targets: Vec<ServiceTarget>) -> Self {
        self.targets = targets;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn targets(&self) -> &[ServiceTarget] {
        &self.targets
    }

    pub async fn collect(&self, base_url: &str) -> StatusReport {
        let started = Instant::now();
        let base = base_url.trim_end_matches('/');

        // join_all keeps target order
        let checks = join_all(
            self.targets
                .iter()
                .map(|target| self.check(base, target)),
        )
        .await;

        let report = StatusReport::new(checks);

        COLLECTION_LATENCY.observe(started.elapsed().as_secs_f64());
        SERVICES_HEALTHY.set(report.summary.healthy as f64);
        info!(
            healthy = report.summary.healthy,
            total = report.summary.total,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Status collection finished"
        );

        report
    }

    async fn check(&self, base: &str, target: &ServiceTarget) -> ServiceCheck {
        let url = format!("{}{}", base, target.path);
        let started = Instant::now();

        let outcome = tokio::time::timeout(self.timeout, self.client.get(&url).send()).await;

        let (ok, status_code, error) = match outcome {
            Ok(Ok(res)) if res.status().is_success() => (true, Some(res.status().as_u16()), None),
            Ok(Ok(res)) => (
                false,
                Some(res.status().as_u16()),
                Some(format!("HTTP {}", res.status().as_u16())),
            ),
            Ok(Err(e)) if e.is_timeout() => (false, None, Some(TIMEOUT_ERROR.to_string())),
            Ok(Err(e)) => (false, None, Some(e.to_string())),
            Err(_) => (false, None, Some(TIMEOUT_ERROR.to_string())),
        };

        let outcome_label = if ok { "healthy" } else { "unhealthy" };
        HEALTH_CHECKS_TOTAL
            .with_label_values(&[target.name.as_str(), outcome_label])
            .inc();

        if let Some(ref error) = error {
            warn!(service = %target.name, url = %url, error = %error, "Service check failed");
        }

        ServiceCheck {
            name: target.name.clone(),
            ok,
            status_code,
            error,
            latency_ms: started.elapsed().as_millis() as u64,
        }
    }
}
