use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::debug;

use btpm_links::{LinkStatus, SnapshotStore, StoreError};

mod file;

pub use file::FileSnapshotStore;

pub const ENV_DB_URL: &str = "BTPM_DATABASE_URL";

/// Connect to Postgres using BTPM_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='link_snapshots'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok,
        has_snapshot_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_snapshot_table: bool,
}

// ---------------------------------------------------------------------------
// PgSnapshotStore
// ---------------------------------------------------------------------------

/// Snapshot store backed by the `link_snapshots` table.
#[derive(Clone, Debug)]
pub struct PgSnapshotStore {
    pool: PgPool,
}

impl PgSnapshotStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn get(&self, key: &str) -> Result<Option<LinkStatus>, StoreError> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("select status from link_snapshots where link_key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::Read(e.to_string()))?;

        match row {
            None => Ok(None),
            Some((raw,)) => serde_json::from_value(raw)
                .map(Some)
                .map_err(|e| StoreError::Read(format!("snapshot {key} undecodable: {e}"))),
        }
    }

    async fn set(&self, key: &str, status: &LinkStatus) -> Result<(), StoreError> {
        let payload = serde_json::to_value(status).map_err(|e| StoreError::Write(e.to_string()))?;

        sqlx::query(
            r#"
            insert into link_snapshots (link_key, state, status, updated_at)
            values ($1, $2, $3, $4)
            on conflict (link_key) do update set
              state = excluded.state,
              status = excluded.status,
              updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(status.state.as_str())
        .bind(payload)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Write(e.to_string()))?;

        debug!(key, state = %status.state, "snapshot persisted");
        Ok(())
    }
}
