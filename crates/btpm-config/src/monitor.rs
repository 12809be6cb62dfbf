//! Typed monitor configuration decoded from the merged config JSON.
//!
//! # Shape
//! ```yaml
//! topology:            # inline; exclusive with networks_file
//!   networks: [{ id, name, endpoint, bmc }]
//!   links: [{ src, dst }]   # optional, full mesh when absent
//! networks_file: networks.json
//! engine:
//!   grace_period_secs: 60
//!   query_timeout_ms: 10000
//! poll:
//!   interval_secs: 30
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;

use btpm_links::{EngineSettings, Topology};

use crate::LoadedConfig;

pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 60;
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct RawMonitor {
    #[serde(default)]
    topology: Option<Topology>,
    #[serde(default)]
    networks_file: Option<String>,
    #[serde(default)]
    engine: RawEngine,
    #[serde(default)]
    poll: RawPoll,
}

#[derive(Debug, Deserialize)]
struct RawEngine {
    #[serde(default = "default_grace")]
    grace_period_secs: u64,
    #[serde(default = "default_query_timeout")]
    query_timeout_ms: u64,
}

impl Default for RawEngine {
    fn default() -> Self {
        Self {
            grace_period_secs: DEFAULT_GRACE_PERIOD_SECS,
            query_timeout_ms: DEFAULT_QUERY_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawPoll {
    #[serde(default = "default_poll_interval")]
    interval_secs: u64,
}

impl Default for RawPoll {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

fn default_grace() -> u64 {
    DEFAULT_GRACE_PERIOD_SECS
}

fn default_query_timeout() -> u64 {
    DEFAULT_QUERY_TIMEOUT_MS
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub topology: Topology,
    pub engine: EngineSettings,
    pub poll_interval: Duration,
    /// Hash of the merged config documents (not of the networks file).
    pub config_hash: String,
}

impl MonitorConfig {
    /// Decode a loaded config. A `networks_file` reference is resolved
    /// relative to the working directory.
    pub fn from_loaded(loaded: &LoadedConfig) -> Result<Self> {
        let raw = decode(&loaded.config_json)?;

        let topology = match (raw.topology, raw.networks_file) {
            (Some(_), Some(_)) => {
                bail!("CONFIG_TOPOLOGY_AMBIGUOUS: set either `topology` or `networks_file`, not both")
            }
            (None, None) => bail!("CONFIG_TOPOLOGY_MISSING: set `topology` or `networks_file`"),
            (Some(t), None) => t,
            (None, Some(path)) => load_networks_file(&path)?,
        };

        if raw.poll.interval_secs == 0 {
            bail!("CONFIG_INVALID: poll.interval_secs must be > 0");
        }
        if raw.engine.query_timeout_ms == 0 {
            bail!("CONFIG_INVALID: engine.query_timeout_ms must be > 0");
        }
        if raw.engine.query_timeout_ms >= raw.poll.interval_secs.saturating_mul(1000) {
            tracing::warn!(
                query_timeout_ms = raw.engine.query_timeout_ms,
                poll_interval_secs = raw.poll.interval_secs,
                "query timeout is not shorter than the poll interval; cycles will be skipped"
            );
        }

        Ok(Self {
            topology,
            engine: EngineSettings {
                grace_period: Duration::from_secs(raw.engine.grace_period_secs),
                query_timeout: Duration::from_millis(raw.engine.query_timeout_ms),
            },
            poll_interval: Duration::from_secs(raw.poll.interval_secs),
            config_hash: loaded.config_hash.clone(),
        })
    }
}

fn decode(v: &Value) -> Result<RawMonitor> {
    serde_json::from_value(v.clone()).context("CONFIG_INVALID: monitor config does not decode")
}

/// Load a networks JSON file (`{ "networks": [...], "links": [...] }`).
pub fn load_networks_file(path: impl AsRef<Path>) -> Result<Topology> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read networks file: {}", path.display()))?;
    let topology: Topology = serde_json::from_str(&raw)
        .with_context(|| format!("invalid networks file: {}", path.display()))?;
    Ok(topology)
}
