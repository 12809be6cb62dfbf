//! Sequence counters read from BTP message center contracts over JSON-RPC.
//!
//! For a connection `(a, b)` the transmit side lives on `a` and the receive
//! side lives on `b`:
//!
//! - `tx_seq` = `a.bmc.getStatus(_link = btp://b/<b.bmc>).tx_seq`
//! - `rx_seq` = `b.bmc.getStatus(_link = btp://a/<a.bmc>).rx_seq`
//!
//! Both calls are issued concurrently. Counter values arrive as `0x` hex.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use btpm_links::{Connection, Node, QueryError, SeqSample, SequenceSource, Topology};

#[derive(Debug, Clone)]
pub struct RpcSettings {
    /// Per-HTTP-request bound. Keep it below the engine's query timeout so
    /// slow nodes surface as `Timeout` from here rather than from the engine.
    pub request_timeout: Duration,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(8),
        }
    }
}

/// `SequenceSource` that queries each network's BMC via `icx_call`.
#[derive(Debug, Clone)]
pub struct IconRpcSource {
    topology: Topology,
    http: reqwest::Client,
}

impl IconRpcSource {
    pub fn new(topology: Topology, settings: RpcSettings) -> Result<Self, QueryError> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| QueryError::Unreachable(format!("http client init failed: {e}")))?;
        Ok(Self { topology, http })
    }

    fn node(&self, id: &str) -> Result<&Node, QueryError> {
        self.topology
            .node(id)
            .ok_or_else(|| QueryError::Malformed(format!("network {id} is not configured")))
    }

    /// Call `getStatus` on `on`'s BMC for the link towards `peer`.
    async fn get_status(&self, on: &Node, peer: &Node) -> Result<BmcStatus, QueryError> {
        let bmc = on
            .bmc
            .as_deref()
            .ok_or_else(|| QueryError::Malformed(format!("network {} has no bmc address", on.id)))?;
        let link = peer
            .btp_address()
            .ok_or_else(|| QueryError::Malformed(format!("network {} has no bmc address", peer.id)))?;

        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "icx_call",
            "params": {
                "to": bmc,
                "dataType": "call",
                "data": {
                    "method": "getStatus",
                    "params": { "_link": link },
                },
            },
        });

        let resp = self
            .http
            .post(&on.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(QueryError::Unreachable(format!(
                "{} http status={}",
                on.endpoint,
                status.as_u16()
            )));
        }

        let envelope: RpcEnvelope = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                QueryError::Timeout
            } else {
                QueryError::Malformed(format!("response is not json-rpc: {e}"))
            }
        })?;

        if let Some(err) = envelope.error {
            return Err(QueryError::Malformed(format!(
                "rpc error code={} {}",
                err.code, err.message
            )));
        }
        let result = envelope
            .result
            .ok_or_else(|| QueryError::Malformed("response has neither result nor error".to_string()))?;

        debug!(network = %on.id, link = %link, "getStatus answered");
        serde_json::from_value(result).map_err(|e| QueryError::Malformed(format!("getStatus result: {e}")))
    }
}

#[async_trait]
impl SequenceSource for IconRpcSource {
    async fn fetch(&self, conn: &Connection) -> Result<SeqSample, QueryError> {
        let src = self.node(&conn.src)?;
        let dst = self.node(&conn.dst)?;

        let (tx_side, rx_side) =
            futures_util::future::join(self.get_status(src, dst), self.get_status(dst, src)).await;

        let tx_seq = parse_hex(&tx_side?.tx_seq)?;
        let rx_seq = parse_hex(&rx_side?.rx_seq)?;
        Ok(SeqSample::new(tx_seq, rx_seq))
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    #[serde(default)]
    message: String,
}

/// The subset of the BMC `getStatus` result the monitor reads.
#[derive(Debug, Clone, Deserialize)]
struct BmcStatus {
    tx_seq: String,
    rx_seq: String,
}

fn transport_error(e: reqwest::Error) -> QueryError {
    if e.is_timeout() {
        QueryError::Timeout
    } else {
        QueryError::Unreachable(e.to_string())
    }
}

/// Parse a `0x`-prefixed hex integer.
pub fn parse_hex(s: &str) -> Result<u64, QueryError> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| QueryError::Malformed(format!("{s:?} is not 0x-prefixed")))?;
    u64::from_str_radix(digits, 16).map_err(|e| QueryError::Malformed(format!("{s:?}: {e}")))
}
