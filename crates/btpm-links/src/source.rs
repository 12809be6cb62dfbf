//! Collaborator boundaries: where counters come from and where snapshots go.
//!
//! Both traits are object-safe so the engine can hold `Arc<dyn …>` without
//! knowing the concrete transport or storage.

use std::fmt;

use async_trait::async_trait;

use crate::{Connection, LinkStatus, SeqSample};

// ---------------------------------------------------------------------------
// Sequence source
// ---------------------------------------------------------------------------

/// Why a counter query failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryError {
    /// Endpoint could not be reached or returned a transport-level failure.
    Unreachable(String),
    /// The query did not complete within its time bound.
    Timeout,
    /// The node answered with something that is not a counter pair.
    Malformed(String),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::Unreachable(msg) => write!(f, "unreachable: {msg}"),
            QueryError::Timeout => write!(f, "timed out"),
            QueryError::Malformed(msg) => write!(f, "malformed response: {msg}"),
        }
    }
}

impl std::error::Error for QueryError {}

/// Returns the current `(tx_seq, rx_seq)` pair for one direction.
///
/// Implementations must be `Send + Sync`; the engine issues queries for
/// distinct connections concurrently. The engine bounds every call with its
/// own timeout, so implementations need not (but may) time out themselves.
#[async_trait]
pub trait SequenceSource: Send + Sync {
    async fn fetch(&self, conn: &Connection) -> Result<SeqSample, QueryError>;
}

// ---------------------------------------------------------------------------
// Snapshot store
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreError {
    Read(String),
    Write(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Read(msg) => write!(f, "snapshot read failed: {msg}"),
            StoreError::Write(msg) => write!(f, "snapshot write failed: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Durable per-connection persistence of the last-known [`LinkStatus`].
///
/// Keys come from [`Connection::key`]. Each key is read and written
/// independently; no multi-key atomicity is required.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<LinkStatus>, StoreError>;
    async fn set(&self, key: &str, status: &LinkStatus) -> Result<(), StoreError>;
}

/// Store for environments without durable storage: remembers nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullStore;

#[async_trait]
impl SnapshotStore for NullStore {
    async fn get(&self, _key: &str) -> Result<Option<LinkStatus>, StoreError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _status: &LinkStatus) -> Result<(), StoreError> {
        Ok(())
    }
}
