use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::counters::CounterCheck;
use crate::source::{QueryError, StoreError};
use crate::topology::Connection;

/// Current status of every polled connection, keyed by direction.
pub type LinkMap = BTreeMap<Connection, LinkStatus>;

// ---------------------------------------------------------------------------
// LinkState
// ---------------------------------------------------------------------------

/// Health of one directed connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LinkState {
    #[default]
    Good,
    Bad,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Good => "GOOD",
            LinkState::Bad => "BAD",
        }
    }

    pub fn is_bad(&self) -> bool {
        matches!(self, LinkState::Bad)
    }
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SeqSample
// ---------------------------------------------------------------------------

/// Raw counter pair for one direction, as reported by a sequence source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeqSample {
    pub tx_seq: u64,
    pub rx_seq: u64,
}

impl SeqSample {
    pub fn new(tx_seq: u64, rx_seq: u64) -> Self {
        Self { tx_seq, rx_seq }
    }

    /// Messages sent but not yet received. Saturates at zero when the
    /// receive counter is ahead (an anomaly, see [`crate::check_counters`]).
    pub fn pending_count(&self) -> u64 {
        self.tx_seq.saturating_sub(self.rx_seq)
    }
}

// ---------------------------------------------------------------------------
// LinkStatus
// ---------------------------------------------------------------------------

/// Point-in-time classification of one connection.
///
/// Replaced wholesale on every poll; never patched field by field.
///
/// # Invariants
///
/// - `pending_count == tx_seq - rx_seq` (saturating).
/// - `pending_since.is_some()` iff `pending_count > 0`.
/// - `state == Bad` only while `pending_count > 0`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStatus {
    pub tx_seq: u64,
    pub rx_seq: u64,
    pub pending_count: u64,
    /// Poll time at which the current unresolved pending streak started.
    pub pending_since: Option<DateTime<Utc>>,
    pub state: LinkState,
    /// Poll time this status was computed at.
    pub polled_at: DateTime<Utc>,
}

impl LinkStatus {
    pub fn is_pending(&self) -> bool {
        self.pending_count > 0
    }

    /// Elapsed time from `pending_since` to the poll that produced this status.
    /// Zero when nothing is pending.
    pub fn pending_duration(&self) -> Duration {
        match self.pending_since {
            Some(since) => (self.polled_at - since).to_std().unwrap_or(Duration::ZERO),
            None => Duration::ZERO,
        }
    }

    pub fn sample(&self) -> SeqSample {
        SeqSample::new(self.tx_seq, self.rx_seq)
    }
}

// ---------------------------------------------------------------------------
// LinkEvent
// ---------------------------------------------------------------------------

/// A state transition of one connection. Produced only when the state differs
/// from the prior record; pending-count changes alone never produce one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEvent {
    pub conn: Connection,
    pub before: LinkState,
    pub after: LinkState,
    /// The status that triggered the transition.
    pub status: LinkStatus,
    pub at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Cycle diagnostics
// ---------------------------------------------------------------------------

/// A connection whose counters could not be fetched this cycle. Its status
/// was left exactly as the previous cycle left it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryFailure {
    pub conn: Connection,
    pub error: QueryError,
}

/// A snapshot read or write that failed. The in-memory state still advanced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreFailure {
    pub conn: Connection,
    pub error: StoreError,
}

/// Untrusted counters that did not look like a healthy monotonic pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CounterAnomaly {
    pub conn: Connection,
    pub check: CounterCheck,
}

/// Outcome of one [`crate::Links::update`] cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateReport {
    pub polled_at: DateTime<Utc>,
    /// `true` iff `events` is non-empty.
    pub changed: bool,
    /// Transitions, in topology order.
    pub events: Vec<LinkEvent>,
    pub query_failures: Vec<QueryFailure>,
    pub store_failures: Vec<StoreFailure>,
    pub anomalies: Vec<CounterAnomaly>,
}

impl UpdateReport {
    pub fn is_fully_healthy_cycle(&self) -> bool {
        self.query_failures.is_empty() && self.store_failures.is_empty() && self.anomalies.is_empty()
    }
}
