//! Response types for all btpm-daemon HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded
//! by Axum and decoded by tests. No business logic lives here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use btpm_links::{Connection, LinkEvent, LinkState, LinkStatus, MergedLink, QueryFailure, Topology};

use crate::state::CycleSummary;

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
    pub uptime_secs: u64,
    /// Number of monitored connections.
    pub links: usize,
    pub grace_period_secs: u64,
    pub query_timeout_ms: u64,
    pub last_cycle: Option<CycleSummary>,
}

// ---------------------------------------------------------------------------
// Link views
// ---------------------------------------------------------------------------

/// One direction of a link with display names resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkView {
    pub src: String,
    pub dst: String,
    pub src_name: String,
    pub dst_name: String,
    pub state: LinkState,
    pub tx_seq: u64,
    pub rx_seq: u64,
    pub pending_count: u64,
    pub pending_since: Option<DateTime<Utc>>,
    pub pending_secs: u64,
    pub polled_at: DateTime<Utc>,
}

impl LinkView {
    pub fn new(topology: &Topology, conn: &Connection, status: &LinkStatus) -> Self {
        Self {
            src: conn.src.clone(),
            dst: conn.dst.clone(),
            src_name: topology.name_of(&conn.src).to_string(),
            dst_name: topology.name_of(&conn.dst).to_string(),
            state: status.state,
            tx_seq: status.tx_seq,
            rx_seq: status.rx_seq,
            pending_count: status.pending_count,
            pending_since: status.pending_since,
            pending_secs: status.pending_duration().as_secs(),
            polled_at: status.polled_at,
        }
    }
}

/// GET /v1/links
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinksResponse {
    /// Connections configured but not yet polled successfully.
    pub unpolled: Vec<Connection>,
    pub links: Vec<LinkView>,
}

/// A relay link shown as a pair, e.g. "ICON <-> BSC".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairView {
    pub label: String,
    pub forward: LinkView,
    pub backward: Option<LinkView>,
}

impl PairView {
    pub fn new(topology: &Topology, merged: &MergedLink) -> Self {
        let src = topology.name_of(&merged.conn.src);
        let dst = topology.name_of(&merged.conn.dst);
        let arrow = if merged.backward.is_some() { "<->" } else { "->" };
        Self {
            label: format!("{src} {arrow} {dst}"),
            forward: LinkView::new(topology, &merged.conn, &merged.forward),
            backward: merged
                .backward
                .as_ref()
                .map(|bw| LinkView::new(topology, &merged.conn.reverse(), bw)),
        }
    }
}

/// GET /v1/links/pairs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairsResponse {
    pub pairs: Vec<PairView>,
}

// ---------------------------------------------------------------------------
// /v1/status (fresh, grace-free query)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureView {
    pub src: String,
    pub dst: String,
    pub error: String,
}

impl From<&QueryFailure> for FailureView {
    fn from(f: &QueryFailure) -> Self {
        Self {
            src: f.conn.src.clone(),
            dst: f.conn.dst.clone(),
            error: f.error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub polled_at: DateTime<Utc>,
    pub pairs: Vec<PairView>,
    pub failures: Vec<FailureView>,
}

// ---------------------------------------------------------------------------
// /v1/events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsResponse {
    /// Oldest first.
    pub events: Vec<LinkEvent>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
