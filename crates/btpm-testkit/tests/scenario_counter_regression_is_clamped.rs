//! Scenario: Counter Regression Is Clamped
//!
//! # Invariants under test
//!
//! 1. A counter that moves backwards is reported as an anomaly, never as a
//!    failure of the cycle.
//! 2. The status is computed from the fresh counters.
//! 3. A receive counter ahead of the transmit counter yields zero pending.
//!
//! All tests are pure in-process; no DB or network required.

use std::sync::Arc;
use std::time::Duration;

use btpm_links::{CounterCheck, LinkState};
use btpm_testkit::{at, links_with, pair_topology, MemoryStore, ScriptedSource, BSC, ICON};

#[tokio::test]
async fn node_restart_regression_is_reported_and_recomputed() {
    let source = Arc::new(ScriptedSource::new());
    let links = links_with(pair_topology(), source.clone(), Arc::new(MemoryStore::new()), Duration::from_secs(30));
    source.set(BSC, ICON, 0, 0);
    source.set(ICON, BSC, 50, 10);
    links.update_at(at(0)).await;
    links.update_at(at(30)).await;
    assert_eq!(links.get_link(ICON, BSC).unwrap().state, LinkState::Bad);

    // Remote node was reset: both counters restart from zero.
    source.set(ICON, BSC, 2, 2);
    let report = links.update_at(at(40)).await;

    assert_eq!(report.anomalies.len(), 1);
    assert_eq!(
        report.anomalies[0].check,
        CounterCheck::Regressed {
            prev_tx: 50,
            prev_rx: 10,
            tx_seq: 2,
            rx_seq: 2
        }
    );
    assert_eq!(report.events.len(), 1, "fresh counters drained the link");
    assert_eq!(report.events[0].after, LinkState::Good);
    assert_eq!(links.get_link(ICON, BSC).unwrap().tx_seq, 2);
}

#[tokio::test]
async fn rx_ahead_is_zero_pending() {
    let source = Arc::new(ScriptedSource::new());
    let links = links_with(pair_topology(), source.clone(), Arc::new(MemoryStore::new()), Duration::from_secs(30));
    source.set(ICON, BSC, 4, 9);
    source.set(BSC, ICON, 1, 1);

    let report = links.update_at(at(0)).await;
    assert_eq!(report.anomalies.len(), 1);
    assert!(matches!(report.anomalies[0].check, CounterCheck::RxAhead { .. }));

    let status = links.get_link(ICON, BSC).unwrap();
    assert_eq!(status.pending_count, 0);
    assert_eq!(status.state, LinkState::Good);
}
