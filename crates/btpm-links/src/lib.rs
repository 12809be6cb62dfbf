//! btpm-links
//!
//! Link-state reconciliation engine for BTP relay links.
//!
//! Every network exposes a transmit and a receive sequence counter per peer.
//! The gap between them is the number of undelivered messages. This crate
//! polls those counters for every directed connection in a [`Topology`],
//! classifies each connection as GOOD or BAD with a grace period (so ordinary
//! propagation delay never raises an alarm), persists the last-known state
//! through a [`SnapshotStore`], and reports discrete [`LinkEvent`]s when
//! health changes.
//!
//! Architectural decisions:
//! - Classification is pure: [`classify`] takes the prior status, the fresh
//!   counters and the poll time, and returns a new [`LinkStatus`].
//! - Counter anomalies never fail a cycle; [`check_counters`] is the single
//!   place that decides what an untrusted counter pair means.
//! - One unreachable node never blocks reconciliation of the other links.
//! - Persistence is a capability ([`SnapshotStore`]); [`NullStore`] stands in
//!   where no durable storage exists.

mod classify;
mod counters;
mod engine;
mod merge;
mod source;
mod topology;
mod types;

pub use classify::{classify, classify_instant};
pub use counters::{check_counters, CounterCheck};
pub use engine::{EngineSettings, Links, StatusView, DEFAULT_GRACE_PERIOD, DEFAULT_QUERY_TIMEOUT};
pub use merge::{merge_status, MergedLink};
pub use source::{NullStore, QueryError, SequenceSource, SnapshotStore, StoreError};
pub use topology::{Connection, Node, Topology, TopologyDoc, TopologyError};
pub use types::*;
