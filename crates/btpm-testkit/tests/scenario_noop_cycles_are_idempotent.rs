//! Scenario: No-op Cycles Are Idempotent
//!
//! # Invariants under test
//!
//! 1. Repeated cycles over unchanged counters report `changed = false` and
//!    no events once the first classification settles, for GOOD links.
//! 2. The same holds for a link that has settled into BAD.
//! 3. No-op cycles do not write to the snapshot store.
//!
//! All tests are pure in-process; no DB or network required.

use std::sync::Arc;
use std::time::Duration;

use btpm_links::LinkState;
use btpm_testkit::{at, links_with, pair_topology, MemoryStore, ScriptedSource, BSC, ICON};

#[tokio::test]
async fn unchanged_good_counters_never_change() {
    let source = Arc::new(ScriptedSource::new());
    let store = Arc::new(MemoryStore::new());
    let links = links_with(pair_topology(), source.clone(), store.clone(), Duration::from_secs(60));
    source.set(ICON, BSC, 42, 42);
    source.set(BSC, ICON, 17, 17);

    for secs in 0..10 {
        let report = links.update_at(at(secs * 30)).await;
        assert!(!report.changed);
        assert!(report.events.is_empty());
        assert!(report.is_fully_healthy_cycle());
    }
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn settled_bad_link_stays_quiet() {
    let source = Arc::new(ScriptedSource::new());
    let store = Arc::new(MemoryStore::new());
    let links = links_with(pair_topology(), source.clone(), store.clone(), Duration::from_secs(30));
    source.set(ICON, BSC, 9, 2);
    source.set(BSC, ICON, 0, 0);

    links.update_at(at(0)).await;
    let turned = links.update_at(at(30)).await;
    assert_eq!(turned.events.len(), 1);

    for secs in [60, 90, 120, 150] {
        let report = links.update_at(at(secs)).await;
        assert!(!report.changed, "settled BAD must not re-emit at t={secs}s");
    }
    assert_eq!(links.get_link(ICON, BSC).unwrap().state, LinkState::Bad);
    assert_eq!(store.writes(), 1);
}
