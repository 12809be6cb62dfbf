//! Scenario: Debounced Failure and Immediate Recovery
//!
//! # Invariants under test
//!
//! 1. A connection pending continuously past the grace period emits exactly
//!    one GOOD -> BAD event, at the first cycle where the pending duration
//!    reaches the grace period, not earlier.
//! 2. Once the pending count returns to zero, the very next cycle emits
//!    exactly one BAD -> GOOD event regardless of elapsed time.
//! 3. Each transition is written through to the snapshot store.
//! 4. The documented timeline (60s grace; pending at t=10, BAD at t=75,
//!    GOOD at t=80) produces exactly the two expected events.
//!
//! All tests are pure in-process; no DB or network required.

use std::sync::Arc;
use std::time::Duration;

use btpm_links::{Connection, LinkState};
use btpm_testkit::{at, links_with, pair_topology, MemoryStore, ScriptedSource, BSC, ICON};

const GRACE: Duration = Duration::from_secs(60);

#[tokio::test]
async fn documented_timeline_emits_one_failure_and_one_recovery() {
    let source = Arc::new(ScriptedSource::new());
    let store = Arc::new(MemoryStore::new());
    let links = links_with(pair_topology(), source.clone(), store.clone(), GRACE);
    source.set(BSC, ICON, 7, 7);

    // t=0: settled.
    source.set(ICON, BSC, 10, 10);
    let r0 = links.update_at(at(0)).await;
    assert!(!r0.changed);

    // t=10: 5 pending, streak opens, still GOOD.
    source.set(ICON, BSC, 15, 10);
    let r1 = links.update_at(at(10)).await;
    assert!(!r1.changed);
    let s1 = links.get_link(ICON, BSC).unwrap();
    assert_eq!(s1.state, LinkState::Good);
    assert_eq!(s1.pending_since, Some(at(10)));

    // t=75: 65s pending >= 60s grace -> BAD, one event.
    let r2 = links.update_at(at(75)).await;
    assert!(r2.changed);
    assert_eq!(r2.events.len(), 1);
    let ev = &r2.events[0];
    assert_eq!(ev.conn, Connection::new(ICON, BSC));
    assert_eq!(ev.before, LinkState::Good);
    assert_eq!(ev.after, LinkState::Bad);
    assert_eq!(ev.at, at(75));
    assert_eq!(ev.status.pending_count, 5);
    assert_eq!(ev.status.pending_duration(), Duration::from_secs(65));

    // t=80: drained -> GOOD, one event.
    source.set(ICON, BSC, 15, 15);
    let r3 = links.update_at(at(80)).await;
    assert!(r3.changed);
    assert_eq!(r3.events.len(), 1);
    assert_eq!(r3.events[0].before, LinkState::Bad);
    assert_eq!(r3.events[0].after, LinkState::Good);

    assert_eq!(store.writes(), 2, "one write per transition");
    let persisted = store.record(&Connection::new(ICON, BSC).key()).unwrap();
    assert_eq!(persisted.state, LinkState::Good);
    assert_eq!(persisted.tx_seq, 15);
}

#[tokio::test]
async fn failure_is_not_reported_before_grace_elapses() {
    let source = Arc::new(ScriptedSource::new());
    let links = links_with(pair_topology(), source.clone(), Arc::new(MemoryStore::new()), GRACE);
    source.set(BSC, ICON, 0, 0);
    source.set(ICON, BSC, 3, 1);

    let mut bad_events = 0;
    let mut first_bad_at = None;
    for secs in (0..=120).step_by(15) {
        let report = links.update_at(at(secs)).await;
        for ev in &report.events {
            assert_eq!(ev.after, LinkState::Bad);
            bad_events += 1;
            first_bad_at.get_or_insert(secs);
        }
    }

    assert_eq!(bad_events, 1, "exactly one GOOD->BAD event for one streak");
    assert_eq!(first_bad_at, Some(60), "BAD at the first cycle with 60s pending");
}

#[tokio::test]
async fn recovery_after_long_outage_is_immediate() {
    let source = Arc::new(ScriptedSource::new());
    let links = links_with(pair_topology(), source.clone(), Arc::new(MemoryStore::new()), GRACE);
    source.set(BSC, ICON, 0, 0);
    source.set(ICON, BSC, 100, 1);

    links.update_at(at(0)).await;
    let failed = links.update_at(at(3_600)).await;
    assert_eq!(failed.events.len(), 1);

    source.set(ICON, BSC, 100, 100);
    let recovered = links.update_at(at(3_601)).await;
    assert_eq!(recovered.events.len(), 1);
    assert_eq!(recovered.events[0].after, LinkState::Good);
    assert_eq!(links.get_link(ICON, BSC).unwrap().pending_since, None);
}
