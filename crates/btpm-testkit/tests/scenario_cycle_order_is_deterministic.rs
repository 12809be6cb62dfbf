//! Scenario: Cycle Order Is Deterministic
//!
//! # Invariants under test
//!
//! 1. Counter queries within one cycle run concurrently: a cycle lasts about
//!    as long as its slowest query, not the sum of all of them.
//! 2. Effects are applied in topology declaration order even when answers
//!    arrive in the reverse order, so events come out in declared order.
//! 3. Declared order wins over `Connection` sort order (the triangle fixture
//!    declares BSC->ICON before ICON->HAVAH, which sorts first).

use std::sync::Arc;
use std::time::{Duration, Instant};

use btpm_links::Connection;
use btpm_testkit::{at, links_with, triangle_topology, MemoryStore, ScriptedSource, BSC, HAVAH, ICON};

const GRACE: Duration = Duration::from_secs(60);

#[tokio::test]
async fn events_follow_declared_order_while_queries_overlap() {
    let source = Arc::new(ScriptedSource::new());
    let store = Arc::new(MemoryStore::new());
    let links = links_with(triangle_topology(), source.clone(), store.clone(), GRACE);

    source.set(ICON, BSC, 10, 1);
    source.set(BSC, ICON, 10, 2);
    source.set(ICON, HAVAH, 10, 3);

    // First-declared answers last.
    source.delay(ICON, BSC, Duration::from_millis(300));
    source.delay(BSC, ICON, Duration::from_millis(200));
    source.delay(ICON, HAVAH, Duration::from_millis(100));

    let opened = links.update_at(at(0)).await;
    assert!(!opened.changed);

    let started = Instant::now();
    let report = links.update_at(at(60)).await;
    let elapsed = started.elapsed();

    assert_eq!(source.calls(), 6, "one query per connection per cycle");
    assert!(
        elapsed >= Duration::from_millis(300),
        "cycle cannot finish before its slowest query: {elapsed:?}"
    );
    assert!(
        elapsed < Duration::from_millis(550),
        "queries were serialized: {elapsed:?}"
    );

    let order: Vec<Connection> = report.events.iter().map(|e| e.conn.clone()).collect();
    assert_eq!(order, links.keys().to_vec());
    assert_eq!(
        order,
        vec![
            Connection::new(ICON, BSC),
            Connection::new(BSC, ICON),
            Connection::new(ICON, HAVAH),
        ]
    );
    assert!(report.events.iter().all(|e| e.after.is_bad() && e.status.is_pending()));
    assert_eq!(store.writes(), 3);
}
