//! Deterministic test doubles and fixtures for the link engine.
//!
//! Nothing here touches the network, a database or the wall clock: sources
//! answer from a script, stores live in memory, and time is supplied by the
//! test through [`at`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use btpm_links::{
    Connection, EngineSettings, Links, LinkStatus, Node, QueryError, SeqSample, SequenceSource,
    SnapshotStore, StoreError, Topology,
};

// ---------------------------------------------------------------------------
// Timeline
// ---------------------------------------------------------------------------

/// Fixed epoch for scenario timelines.
pub const EPOCH_SECS: i64 = 1_700_000_000;

/// A poll time `secs` seconds after the scenario epoch.
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(EPOCH_SECS + secs, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

// ---------------------------------------------------------------------------
// Topology fixtures
// ---------------------------------------------------------------------------

pub const ICON: &str = "0x1.icon";
pub const BSC: &str = "0x38.bsc";
pub const HAVAH: &str = "0x111.havah";

fn node(id: &str, name: &str) -> Node {
    Node::new(id, name, format!("http://{name}.invalid/api/v3").to_lowercase()).with_bmc(format!("cx{name}"))
}

/// ICON <-> BSC in both directions.
pub fn pair_topology() -> Topology {
    Topology::full_mesh(vec![node(ICON, "ICON"), node(BSC, "BSC")])
        .unwrap_or_else(|e| panic!("fixture topology invalid: {e}"))
}

/// ICON <-> BSC in both directions plus a forward-only ICON -> HAVAH link.
pub fn triangle_topology() -> Topology {
    Topology::new(
        vec![node(ICON, "ICON"), node(BSC, "BSC"), node(HAVAH, "HAVAH")],
        vec![
            Connection::new(ICON, BSC),
            Connection::new(BSC, ICON),
            Connection::new(ICON, HAVAH),
        ],
    )
    .unwrap_or_else(|e| panic!("fixture topology invalid: {e}"))
}

/// Build a registry with the given grace period and the default query timeout.
pub fn links_with(
    topology: Topology,
    source: Arc<dyn SequenceSource>,
    store: Arc<dyn SnapshotStore>,
    grace: Duration,
) -> Links {
    let settings = EngineSettings {
        grace_period: grace,
        ..EngineSettings::default()
    };
    Links::new(topology, source, store, settings)
}

// ---------------------------------------------------------------------------
// ScriptedSource
// ---------------------------------------------------------------------------

/// Sequence source answering from a per-connection script.
///
/// Connections with no script entry are `Unreachable`. A connection with a
/// delay answers only after that much (tokio) time has passed.
#[derive(Default)]
pub struct ScriptedSource {
    script: Mutex<BTreeMap<Connection, Result<SeqSample, QueryError>>>,
    delays: Mutex<BTreeMap<Connection, Duration>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, src: &str, dst: &str, tx_seq: u64, rx_seq: u64) {
        self.lock()
            .insert(Connection::new(src, dst), Ok(SeqSample::new(tx_seq, rx_seq)));
    }

    pub fn fail(&self, src: &str, dst: &str, error: QueryError) {
        self.lock().insert(Connection::new(src, dst), Err(error));
    }

    pub fn delay(&self, src: &str, dst: &str, by: Duration) {
        self.delays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(Connection::new(src, dst), by);
    }

    /// Total number of `fetch` calls served.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<Connection, Result<SeqSample, QueryError>>> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SequenceSource for ScriptedSource {
    async fn fetch(&self, conn: &Connection) -> Result<SeqSample, QueryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self
            .delays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(conn)
            .copied();
        if let Some(by) = delay {
            tokio::time::sleep(by).await;
        }
        self.lock()
            .get(conn)
            .cloned()
            .unwrap_or_else(|| Err(QueryError::Unreachable(format!("no script for {conn}"))))
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Snapshot store kept in memory; counts writes.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, LinkStatus>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record without counting it as a write.
    pub fn preload(&self, key: &str, status: LinkStatus) {
        self.lock().insert(key.to_string(), status);
    }

    pub fn record(&self, key: &str) -> Option<LinkStatus> {
        self.lock().get(key).cloned()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, LinkStatus>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<LinkStatus>, StoreError> {
        Ok(self.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, status: &LinkStatus) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.lock().insert(key.to_string(), status.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FailingStore
// ---------------------------------------------------------------------------

/// Store whose writes always fail; reads fail too when `fail_reads` is set.
#[derive(Default)]
pub struct FailingStore {
    pub fail_reads: bool,
    attempts: AtomicUsize,
}

impl FailingStore {
    pub fn new(fail_reads: bool) -> Self {
        Self {
            fail_reads,
            attempts: AtomicUsize::new(0),
        }
    }

    /// Number of write attempts seen.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<LinkStatus>, StoreError> {
        if self.fail_reads {
            Err(StoreError::Read("store offline".to_string()))
        } else {
            Ok(None)
        }
    }

    async fn set(&self, _key: &str, _status: &LinkStatus) -> Result<(), StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Write("store offline".to_string()))
    }
}
