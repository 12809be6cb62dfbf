//! The `Links` registry: owns the topology, the current status of every
//! connection, and poll-cycle orchestration.
//!
//! # Cycle
//!
//! 1. Query every connection concurrently, each bounded by `query_timeout`.
//! 2. Walk the results in topology order:
//!    - failed query: keep the previous status, record a [`QueryFailure`];
//!    - otherwise classify against the prior record, write the new status
//!      through to the store on a state transition, and emit a [`LinkEvent`].
//! 3. Publish the new mapping in one swap.
//!
//! Concurrency is for I/O latency only; every observable effect happens in
//! topology order. Readers always see a whole mapping, never a partial one.

use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    check_counters, classify, classify_instant, merge_status, Connection, CounterAnomaly,
    LinkEvent, LinkMap, LinkStatus, MergedLink, QueryError, QueryFailure, SeqSample,
    SequenceSource, SnapshotStore, StoreFailure, Topology, UpdateReport,
};

/// Minimum continuous pending time before a connection is classified BAD.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(60);

/// Upper bound on a single sequence query.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Process-wide engine configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineSettings {
    pub grace_period: Duration,
    pub query_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

pub struct Links {
    topology: Topology,
    source: Arc<dyn SequenceSource>,
    store: Arc<dyn SnapshotStore>,
    settings: EngineSettings,
    /// Swapped wholesale at the end of each cycle.
    current: RwLock<Arc<LinkMap>>,
    /// Serializes `update` calls.
    cycle: Mutex<()>,
}

impl Links {
    pub fn new(
        topology: Topology,
        source: Arc<dyn SequenceSource>,
        store: Arc<dyn SnapshotStore>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            topology,
            source,
            store,
            settings,
            current: RwLock::new(Arc::new(LinkMap::new())),
            cycle: Mutex::new(()),
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn settings(&self) -> EngineSettings {
        self.settings
    }

    /// Every monitored connection, in topology order.
    pub fn keys(&self) -> &[Connection] {
        self.topology.connections()
    }

    pub fn name_of<'a>(&'a self, id: &'a str) -> &'a str {
        self.topology.name_of(id)
    }

    /// Consistent snapshot of the current mapping. Connections never polled
    /// successfully are absent.
    pub fn current(&self) -> Arc<LinkMap> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get_link(&self, src: &str, dst: &str) -> Option<LinkStatus> {
        self.current().get(&Connection::new(src, dst)).cloned()
    }

    /// Forward/backward pairs of the current mapping.
    pub fn merged(&self) -> Vec<MergedLink> {
        merge_status(&self.current())
    }

    /// Run one poll cycle at the current wall-clock time.
    pub async fn update(&self) -> UpdateReport {
        self.update_at(Utc::now()).await
    }

    /// Run one poll cycle as of `now`.
    ///
    /// The only mutating operation on the registry. Never fails as a whole:
    /// per-connection problems are collected into the report.
    pub async fn update_at(&self, now: DateTime<Utc>) -> UpdateReport {
        let _cycle = self.cycle.lock().await;

        let samples = self.fetch_all().await;
        let prev_map = self.current();
        let mut next: LinkMap = (*prev_map).clone();

        let mut report = UpdateReport {
            polled_at: now,
            changed: false,
            events: Vec::new(),
            query_failures: Vec::new(),
            store_failures: Vec::new(),
            anomalies: Vec::new(),
        };

        for (conn, fetched) in self.topology.connections().iter().zip(samples) {
            let sample = match fetched {
                Ok(sample) => sample,
                Err(error) => {
                    warn!(link = %conn, %error, "sequence query failed; keeping previous status");
                    report.query_failures.push(QueryFailure {
                        conn: conn.clone(),
                        error,
                    });
                    continue;
                }
            };

            let prior = match prev_map.get(conn) {
                Some(status) => Some(status.clone()),
                None => self.load_snapshot(conn, &mut report.store_failures).await,
            };

            let check = check_counters(prior.as_ref(), sample);
            if check.is_anomaly() {
                warn!(link = %conn, %check, "untrusted counters; classifying from fresh values");
                report.anomalies.push(CounterAnomaly {
                    conn: conn.clone(),
                    check,
                });
            }

            let status = classify(prior.as_ref(), sample, now, self.settings.grace_period);
            let before = prior.as_ref().map(|p| p.state).unwrap_or_default();

            if status.state != before {
                info!(
                    link = %conn,
                    from = %before,
                    to = %status.state,
                    pending = status.pending_count,
                    pending_secs = status.pending_duration().as_secs(),
                    "link state changed"
                );
                if let Err(error) = self.store.set(&conn.key(), &status).await {
                    error!(link = %conn, %error, "snapshot not persisted; in-memory state advanced");
                    report.store_failures.push(StoreFailure {
                        conn: conn.clone(),
                        error,
                    });
                }
                report.events.push(LinkEvent {
                    conn: conn.clone(),
                    before,
                    after: status.state,
                    status: status.clone(),
                    at: now,
                });
            }

            next.insert(conn.clone(), status);
        }

        report.changed = !report.events.is_empty();
        self.publish(next);

        debug!(
            events = report.events.len(),
            query_failures = report.query_failures.len(),
            store_failures = report.store_failures.len(),
            anomalies = report.anomalies.len(),
            "poll cycle complete"
        );
        report
    }

    /// Poll every connection without hysteresis and without touching the
    /// store or the current mapping.
    pub async fn query_status(&self) -> StatusView {
        self.query_status_at(Utc::now()).await
    }

    pub async fn query_status_at(&self, now: DateTime<Utc>) -> StatusView {
        let samples = self.fetch_all().await;
        let mut view = StatusView {
            polled_at: now,
            statuses: LinkMap::new(),
            failures: Vec::new(),
        };
        for (conn, fetched) in self.topology.connections().iter().zip(samples) {
            match fetched {
                Ok(sample) => {
                    view.statuses.insert(conn.clone(), classify_instant(sample, now));
                }
                Err(error) => {
                    warn!(link = %conn, %error, "status query failed");
                    view.failures.push(QueryFailure {
                        conn: conn.clone(),
                        error,
                    });
                }
            }
        }
        view
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// One bounded query per connection, results in topology order.
    async fn fetch_all(&self) -> Vec<Result<SeqSample, QueryError>> {
        let timeout = self.settings.query_timeout;
        let queries = self.topology.connections().iter().map(|conn| async move {
            match tokio::time::timeout(timeout, self.source.fetch(conn)).await {
                Ok(fetched) => fetched,
                Err(_) => Err(QueryError::Timeout),
            }
        });
        join_all(queries).await
    }

    async fn load_snapshot(
        &self,
        conn: &Connection,
        failures: &mut Vec<StoreFailure>,
    ) -> Option<LinkStatus> {
        match self.store.get(&conn.key()).await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                warn!(link = %conn, %error, "snapshot unreadable; assuming GOOD baseline");
                failures.push(StoreFailure {
                    conn: conn.clone(),
                    error,
                });
                None
            }
        }
    }

    fn publish(&self, next: LinkMap) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
    }
}

// ---------------------------------------------------------------------------
// StatusView
// ---------------------------------------------------------------------------

/// Read-only result of [`Links::query_status`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusView {
    pub polled_at: DateTime<Utc>,
    pub statuses: LinkMap,
    pub failures: Vec<QueryFailure>,
}

impl StatusView {
    /// Connections that answered this query.
    pub fn known_links(&self) -> BTreeSet<&Connection> {
        self.statuses.keys().collect()
    }

    pub fn get_link(&self, src: &str, dst: &str) -> Option<&LinkStatus> {
        self.statuses.get(&Connection::new(src, dst))
    }

    pub fn merged(&self) -> Vec<MergedLink> {
        merge_status(&self.statuses)
    }
}
