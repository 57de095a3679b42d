//! Client service monitor
//!
//! Polls a liveness endpoint on a fixed interval and raises a notification
//! only when the observed status flips. Steady states stay silent.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// ONLINE -> OFFLINE; shown as a persistent warning
    WentOffline,
    /// OFFLINE -> ONLINE
    Recovered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorState {
    pub is_online: bool,
    pub last_check: Option<DateTime<Utc>>,
    #[serde(skip)]
    previous_status: bool,
}

impl Default for MonitorState {
    // optimistic until the first poll lands
    fn default() -> Self {
        Self {
            is_online: true,
            last_check: None,
            previous_status: true,
        }
    }
}

impl MonitorState {
    /// Records one poll result and returns the transition, if any.
    pub fn observe(&mut self, online: bool, at: DateTime<Utc>) -> Option<Transition> {
        self.is_online = online;
        self.last_check = Some(at);

        if online == self.previous_status {
            return None;
        }
        self.previous_status = online;

        Some(if online {
            Transition::Recovered
        } else {
            Transition::WentOffline
        })
    }
}

/// Liveness check the monitor runs once per tick.
pub trait Probe: Send + Sync + 'static {
    fn probe(&self) -> impl Future<Output = bool> + Send;
}

/// Receives transitions. Called with the monitor's state lock held, so it
/// must not block.
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, transition: Transition, state: &MonitorState);
}

// HEAD <origin>/api/health
#[derive(Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            url: format!("{}/api/health", base_url.trim_end_matches('/')),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Probe for HttpProbe {
    async fn probe(&self) -> bool {
        let request = self.client.head(&self.url).send();
        match tokio::time::timeout(PROBE_TIMEOUT, request).await {
            Ok(Ok(res)) => res.status().is_success(),
            Ok(Err(e)) => {
                debug!(url = %self.url, error = %e, "Liveness probe failed");
                false
            }
            Err(_) => {
                debug!(url = %self.url, "Liveness probe timed out");
                false
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, transition: Transition, _state: &MonitorState) {
        match transition {
            Transition::WentOffline => {
                warn!("Service is unreachable. Some features may not work until it recovers.")
            }
            Transition::Recovered => info!("Service is back online"),
        }
    }
}

struct Shared {
    state: MonitorState,
    stopped: bool,
}

pub struct ServiceMonitor;

impl ServiceMonitor {
    /// Spawns the polling task: one probe right away, then one per `every`.
    pub fn start<P, N>(probe: P, notifier: N, every: Duration) -> MonitorHandle
    where
        P: Probe,
        N: Notifier,
    {
        let shared = Arc::new(Mutex::new(Shared {
            state: MonitorState::default(),
            stopped: false,
        }));
        let cancel = CancellationToken::new();

        let task = tokio::spawn(poll_loop(
            probe,
            notifier,
            every,
            Arc::clone(&shared),
            cancel.clone(),
        ));

        MonitorHandle {
            shared,
            cancel,
            task: Some(task),
        }
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    // a panicking notifier must not wedge teardown
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn poll_loop<P: Probe, N: Notifier>(
    probe: P,
    notifier: N,
    every: Duration,
    shared: Arc<Mutex<Shared>>,
    cancel: CancellationToken,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let online = tokio::select! {
            _ = cancel.cancelled() => break,
            online = async {
                ticker.tick().await;
                probe.probe().await
            } => online,
        };

        let mut guard = lock(&shared);
        // stop() may have won the race while the probe was in flight
        if guard.stopped {
            break;
        }
        if let Some(transition) = guard.state.observe(online, Utc::now()) {
            notifier.notify(transition, &guard.state);
        }
    }

    debug!("Service monitor stopped");
}

/// Owner of a running monitor. Dropping it cancels the task as well.
pub struct MonitorHandle {
    shared: Arc<Mutex<Shared>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    pub fn state(&self) -> MonitorState {
        lock(&self.shared).state
    }

    pub fn is_stopped(&self) -> bool {
        lock(&self.shared).stopped
    }

    /// Stops polling. Once this returns no further state update or
    /// notification can happen.
    pub async fn stop(mut self) {
        self.halt();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Service monitor task ended abnormally");
            }
        }
    }

    fn halt(&self) {
        lock(&self.shared).stopped = true;
        self.cancel.cancel();
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.halt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn edge_detection_only_fires_on_change() {
        let mut state = MonitorState::default();
        let now = Utc::now();

        let fired: Vec<Option<Transition>> = [true, true, false, false, true]
            .into_iter()
            .map(|online| state.observe(online, now))
            .collect();

        assert_eq!(
            fired,
            vec![
                None,
                None,
                Some(Transition::WentOffline),
                None,
                Some(Transition::Recovered)
            ]
        );
        assert!(state.is_online);
        assert_eq!(state.last_check, Some(now));
    }

    #[test]
    fn starts_online_before_first_check() {
        let state = MonitorState::default();
        assert!(state.is_online);
        assert!(state.last_check.is_none());
    }

    struct ScriptedProbe {
        results: Mutex<VecDeque<bool>>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedProbe {
        fn new(results: &[bool], calls: Arc<AtomicUsize>) -> Self {
            Self {
                results: Mutex::new(results.iter().copied().collect()),
                calls,
            }
        }
    }

    impl Probe for ScriptedProbe {
        async fn probe(&self) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.results.lock().unwrap().pop_front().unwrap_or(true)
        }
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<Transition>>>);

    impl Notifier for Recorder {
        fn notify(&self, transition: Transition, _state: &MonitorState) {
            self.0.lock().unwrap().push(transition);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn polls_immediately_then_on_interval() {
        let calls = Arc::new(AtomicUsize::new(0));
        let probe = ScriptedProbe::new(&[true, true, false, false, true], calls.clone());
        let recorder = Recorder::default();

        let handle = ServiceMonitor::start(probe, recorder.clone(), Duration::from_secs(60));

        // ticks at 0s, 60s, 120s, 180s, 240s
        tokio::time::sleep(Duration::from_secs(241)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert!(handle.state().is_online);
        assert!(handle.state().last_check.is_some());

        handle.stop().await;

        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![Transition::WentOffline, Transition::Recovered]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_fires_after_stop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let probe = ScriptedProbe::new(&[true, false, true, false], calls.clone());
        let recorder = Recorder::default();

        let handle = ServiceMonitor::start(probe, recorder.clone(), Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        handle.stop().await;
        tokio::time::sleep(Duration::from_secs(600)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(recorder.0.lock().unwrap().is_empty());
    }

    struct PanickingNotifier;

    impl Notifier for PanickingNotifier {
        fn notify(&self, _transition: Transition, _state: &MonitorState) {
            panic!("notifier blew up");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stop_returns_after_notifier_panic() {
        let calls = Arc::new(AtomicUsize::new(0));
        let probe = ScriptedProbe::new(&[false], calls.clone());

        let handle = ServiceMonitor::start(probe, PanickingNotifier, Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // poisoned lock from the panic is still readable
        assert!(!handle.state().is_online);
        handle.stop().await;

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_cancels_polling() {
        let calls = Arc::new(AtomicUsize::new(0));
        let probe = ScriptedProbe::new(&[], calls.clone());

        let handle = ServiceMonitor::start(probe, Recorder::default(), Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(1)).await;
        drop(handle);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
