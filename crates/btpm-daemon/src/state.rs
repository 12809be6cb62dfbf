//! Shared runtime state for btpm-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The poll loop is the
//! only writer of link state; handlers only read.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::warn;

use btpm_links::{LinkEvent, Links, UpdateReport};

/// Capacity of the in-memory transition log served by GET /v1/events.
pub const RECENT_EVENTS_CAP: usize = 256;

// ---------------------------------------------------------------------------
// BusMsg (SSE event bus payload)
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    LinkEvent(LinkEvent),
    Cycle(CycleSummary),
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// CycleSummary
// ---------------------------------------------------------------------------

/// Counts from one poll cycle, carried in health responses and SSE.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub polled_at: DateTime<Utc>,
    pub changed: bool,
    pub events: usize,
    pub query_failures: usize,
    pub store_failures: usize,
    pub anomalies: usize,
}

impl From<&UpdateReport> for CycleSummary {
    fn from(r: &UpdateReport) -> Self {
        Self {
            polled_at: r.polled_at,
            changed: r.changed,
            events: r.events.len(),
            query_failures: r.query_failures.len(),
            store_failures: r.store_failures.len(),
            anomalies: r.anomalies.len(),
        }
    }
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub links: Arc<Links>,
    /// Most recent transitions, oldest first, bounded by [`RECENT_EVENTS_CAP`].
    pub recent: Arc<RwLock<VecDeque<LinkEvent>>>,
    pub last_cycle: Arc<RwLock<Option<CycleSummary>>>,
}

impl AppState {
    pub fn new(links: Arc<Links>) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        Self {
            bus,
            build: BuildInfo {
                service: "btpm-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            links,
            recent: Arc::new(RwLock::new(VecDeque::with_capacity(RECENT_EVENTS_CAP))),
            last_cycle: Arc::new(RwLock::new(None)),
        }
    }

    /// Fold a finished cycle into the shared state and broadcast it.
    pub async fn record_cycle(&self, report: &UpdateReport) {
        {
            let mut recent = self.recent.write().await;
            for ev in &report.events {
                if recent.len() == RECENT_EVENTS_CAP {
                    recent.pop_front();
                }
                recent.push_back(ev.clone());
            }
        }

        let summary = CycleSummary::from(report);
        *self.last_cycle.write().await = Some(summary.clone());

        // No subscribers is fine.
        for ev in &report.events {
            let _ = self.bus.send(BusMsg::LinkEvent(ev.clone()));
        }
        let _ = self.bus.send(BusMsg::Cycle(summary));
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    })
}

/// Run one poll cycle at wall-clock time and record it.
pub async fn poll_once(state: &AppState) -> UpdateReport {
    poll_once_at(state, Utc::now()).await
}

/// Run one poll cycle as of `now` and record it.
pub async fn poll_once_at(state: &AppState, now: DateTime<Utc>) -> UpdateReport {
    let report = state.links.update_at(now).await;

    if !report.query_failures.is_empty() {
        warn!(
            failed = report.query_failures.len(),
            total = state.links.keys().len(),
            "poll cycle had query failures"
        );
    }

    state.record_cycle(&report).await;
    report
}

/// Spawn the poll loop: one `update` per tick, first tick immediately.
///
/// Ticks missed because a cycle overran are skipped, never bunched.
pub fn spawn_poll_loop(state: Arc<AppState>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            poll_once(&state).await;
        }
    })
}
