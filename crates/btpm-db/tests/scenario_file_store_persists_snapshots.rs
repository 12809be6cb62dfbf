//! Scenario: File Store Persists Snapshots
//!
//! # Invariants under test
//!
//! 1. A missing file is an empty store.
//! 2. A written snapshot is readable by a fresh store on the same path.
//! 3. Writes to one key leave other keys intact.
//! 4. A corrupt file is a read error, not a silent empty store. The next
//!    write moves it aside to `<name>.corrupt` and persistence recovers.
//! 5. No temp file is left behind after a write.

use btpm_db::FileSnapshotStore;
use btpm_links::{classify_instant, LinkState, SeqSample, SnapshotStore, StoreError};
use chrono::{TimeZone, Utc};

fn status(tx: u64, rx: u64) -> btpm_links::LinkStatus {
    classify_instant(SeqSample::new(tx, rx), Utc.timestamp_opt(1_700_000_000, 0).unwrap())
}

#[tokio::test]
async fn missing_file_reads_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileSnapshotStore::new(dir.path().join("absent.json"));
    assert_eq!(store.get("a->b").await.unwrap(), None);
}

#[tokio::test]
async fn snapshots_survive_a_new_store_instance() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshots.json");

    let first = FileSnapshotStore::new(&path);
    first.set("a->b", &status(9, 4)).await.unwrap();
    first.set("b->a", &status(3, 3)).await.unwrap();
    first.set("a->b", &status(9, 9)).await.unwrap();

    let second = FileSnapshotStore::new(&path);
    let ab = second.get("a->b").await.unwrap().unwrap();
    assert_eq!(ab.tx_seq, 9);
    assert_eq!(ab.rx_seq, 9);
    assert_eq!(ab.state, LinkState::Good);
    assert_eq!(second.get("b->a").await.unwrap(), Some(status(3, 3)));

    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "temp file must be renamed away");
}

#[tokio::test]
async fn corrupt_file_is_quarantined_on_write() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshots.json");
    std::fs::write(&path, b"{not json").unwrap();

    let store = FileSnapshotStore::new(&path);
    assert_eq!(store.path(), path.as_path());
    assert!(matches!(store.get("a->b").await, Err(StoreError::Read(_))));

    store.set("a->b", &status(7, 2)).await.unwrap();
    assert_eq!(store.get("a->b").await.unwrap(), Some(status(7, 2)));
    assert_eq!(store.get("b->a").await.unwrap(), None);

    let aside = dir.path().join("snapshots.json.corrupt");
    assert_eq!(std::fs::read(&aside).unwrap(), b"{not json");

    // A second write keeps the quarantined copy and the fresh records.
    store.set("b->a", &status(3, 3)).await.unwrap();
    assert_eq!(store.get("a->b").await.unwrap(), Some(status(7, 2)));
    assert_eq!(std::fs::read(&aside).unwrap(), b"{not json");
}
