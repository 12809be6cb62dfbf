//! Scenario: Postgres snapshot upsert
//!
//! DB-backed test. Skips if BTPM_DATABASE_URL is not set.
//!
//! # Invariants under test
//!
//! 1. Migrations are idempotent.
//! 2. `get` on an unknown key is `None`.
//! 3. `set` twice on one key keeps only the latest status.

use btpm_db::PgSnapshotStore;
use btpm_links::{classify_instant, LinkState, SeqSample, SnapshotStore};
use chrono::Utc;

#[tokio::test]
async fn pg_store_upserts_latest_status() -> anyhow::Result<()> {
    let url = match std::env::var(btpm_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: BTPM_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = btpm_db::connect(&url).await?;
    btpm_db::migrate(&pool).await?;
    btpm_db::migrate(&pool).await?;

    let st = btpm_db::status(&pool).await?;
    assert!(st.ok);
    assert!(st.has_snapshot_table);

    // Unique key per run so leftover rows in a developer DB never collide.
    let key = format!("test.src->test.dst.{}", Utc::now().timestamp_nanos_opt().unwrap_or_default());
    let store = PgSnapshotStore::new(pool);

    assert_eq!(store.get(&key).await?, None);

    let bad = classify_instant(SeqSample::new(10, 2), Utc::now());
    store.set(&key, &bad).await?;
    let good = classify_instant(SeqSample::new(10, 10), Utc::now());
    store.set(&key, &good).await?;

    let back = store.get(&key).await?.expect("row present");
    assert_eq!(back.state, LinkState::Good);
    assert_eq!(back.rx_seq, 10);

    sqlx::query("delete from link_snapshots where link_key = $1")
        .bind(&key)
        .execute(store.pool())
        .await?;
    Ok(())
}
