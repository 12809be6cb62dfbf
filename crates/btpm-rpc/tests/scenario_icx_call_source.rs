//! BMC `getStatus` sequence source against mocked JSON-RPC nodes.
//!
//! # Invariants under test
//! - `tx_seq` comes from the source network's BMC, `rx_seq` from the
//!   destination's, each queried with the peer's BTP address as `_link`.
//! - Hex counters decode to integers.
//! - Non-2xx answers and dead endpoints are `Unreachable`.
//! - A JSON-RPC error object or a missing field is `Malformed`.
//! - A slow node is `Timeout` once the request bound elapses.
//! - A network without a BMC address is `Malformed` and sends no request.

use std::time::Duration;

use httpmock::prelude::*;

use btpm_links::{Connection, Node, QueryError, SeqSample, SequenceSource, Topology};
use btpm_rpc::{IconRpcSource, RpcSettings};

const ICON: &str = "0x1.icon";
const BSC: &str = "0x38.bsc";
const ICON_BMC: &str = "cx0000000000000000000000000000000000000001";
const BSC_BMC: &str = "0x0000000000000000000000000000000000000038";

fn topology(icon_url: String, bsc_url: String) -> Topology {
    Topology::full_mesh(vec![
        Node::new(ICON, "ICON", icon_url).with_bmc(ICON_BMC),
        Node::new(BSC, "BSC", bsc_url).with_bmc(BSC_BMC),
    ])
    .unwrap()
}

fn source(topology: Topology, timeout: Duration) -> IconRpcSource {
    IconRpcSource::new(
        topology,
        RpcSettings {
            request_timeout: timeout,
        },
    )
    .unwrap()
}

fn status_result(tx: &str, rx: &str) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": { "tx_seq": tx, "rx_seq": rx, "verifier": { "height": "0x10" } }
    })
}

#[tokio::test]
async fn counters_are_read_from_both_ends() {
    let icon = MockServer::start_async().await;
    let bsc = MockServer::start_async().await;

    let icon_mock = icon
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v3")
                .body_contains("\"method\":\"icx_call\"")
                .body_contains(ICON_BMC)
                .body_contains(&format!("btp://{BSC}/{BSC_BMC}"));
            then.status(200).json_body(status_result("0x2a", "0x7"));
        })
        .await;
    let bsc_mock = bsc
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v3")
                .body_contains(BSC_BMC)
                .body_contains(&format!("btp://{ICON}/{ICON_BMC}"));
            then.status(200).json_body(status_result("0x9", "0x28"));
        })
        .await;

    let src = source(
        topology(icon.url("/api/v3"), bsc.url("/api/v3")),
        Duration::from_secs(5),
    );

    // ICON -> BSC: tx from ICON (0x2a), rx from BSC (0x28).
    let forward = src.fetch(&Connection::new(ICON, BSC)).await.unwrap();
    assert_eq!(forward, SeqSample::new(42, 40));

    // BSC -> ICON: tx from BSC (0x9), rx from ICON (0x7).
    let backward = src.fetch(&Connection::new(BSC, ICON)).await.unwrap();
    assert_eq!(backward, SeqSample::new(9, 7));

    icon_mock.assert_hits_async(2).await;
    bsc_mock.assert_hits_async(2).await;
}

#[tokio::test]
async fn http_error_status_is_unreachable() {
    let icon = MockServer::start_async().await;
    let bsc = MockServer::start_async().await;
    icon.mock_async(|when, then| {
        when.method(POST);
        then.status(200).json_body(status_result("0x1", "0x1"));
    })
    .await;
    bsc.mock_async(|when, then| {
        when.method(POST);
        then.status(502).body("bad gateway");
    })
    .await;

    let src = source(topology(icon.url("/"), bsc.url("/")), Duration::from_secs(5));
    let err = src.fetch(&Connection::new(ICON, BSC)).await.unwrap_err();
    assert!(matches!(err, QueryError::Unreachable(_)), "{err}");
}

#[tokio::test]
async fn dead_endpoint_is_unreachable() {
    let icon = MockServer::start_async().await;
    icon.mock_async(|when, then| {
        when.method(POST);
        then.status(200).json_body(status_result("0x1", "0x1"));
    })
    .await;

    // Port 9 (discard) on localhost is closed in test environments.
    let src = source(
        topology(icon.url("/"), "http://127.0.0.1:9/".to_string()),
        Duration::from_secs(5),
    );
    let err = src.fetch(&Connection::new(ICON, BSC)).await.unwrap_err();
    assert!(matches!(err, QueryError::Unreachable(_)), "{err}");
}

#[tokio::test]
async fn rpc_error_object_is_malformed() {
    let icon = MockServer::start_async().await;
    let bsc = MockServer::start_async().await;
    icon.mock_async(|when, then| {
        when.method(POST);
        then.status(200).json_body(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -30032, "message": "NotFound: link" }
        }));
    })
    .await;
    bsc.mock_async(|when, then| {
        when.method(POST);
        then.status(200).json_body(status_result("0x1", "0x1"));
    })
    .await;

    let src = source(topology(icon.url("/"), bsc.url("/")), Duration::from_secs(5));
    let err = src.fetch(&Connection::new(ICON, BSC)).await.unwrap_err();
    match err {
        QueryError::Malformed(msg) => assert!(msg.contains("-30032"), "{msg}"),
        other => panic!("expected Malformed, got {other}"),
    }
}

#[tokio::test]
async fn missing_or_bad_counter_is_malformed() {
    let icon = MockServer::start_async().await;
    let bsc = MockServer::start_async().await;
    icon.mock_async(|when, then| {
        when.method(POST);
        then.status(200).json_body(serde_json::json!({
            "jsonrpc": "2.0", "id": 1, "result": { "tx_seq": "0x5" }
        }));
    })
    .await;
    bsc.mock_async(|when, then| {
        when.method(POST);
        then.status(200).json_body(status_result("seven", "0x5"));
    })
    .await;

    let src = source(topology(icon.url("/"), bsc.url("/")), Duration::from_secs(5));

    // ICON's answer lacks rx_seq entirely.
    let err = src.fetch(&Connection::new(ICON, BSC)).await.unwrap_err();
    assert!(matches!(err, QueryError::Malformed(_)), "{err}");
}

#[tokio::test]
async fn slow_node_times_out() {
    let icon = MockServer::start_async().await;
    let bsc = MockServer::start_async().await;
    icon.mock_async(|when, then| {
        when.method(POST);
        then.status(200)
            .json_body(status_result("0x1", "0x1"))
            .delay(Duration::from_secs(3));
    })
    .await;
    bsc.mock_async(|when, then| {
        when.method(POST);
        then.status(200).json_body(status_result("0x1", "0x1"));
    })
    .await;

    let src = source(topology(icon.url("/"), bsc.url("/")), Duration::from_millis(200));
    let err = src.fetch(&Connection::new(ICON, BSC)).await.unwrap_err();
    assert_eq!(err, QueryError::Timeout);
}

#[tokio::test]
async fn network_without_bmc_is_malformed_without_requests() {
    let icon = MockServer::start_async().await;
    let hits = icon
        .mock_async(|when, then| {
            when.method(POST);
            then.status(200).json_body(status_result("0x1", "0x1"));
        })
        .await;

    let topology = Topology::full_mesh(vec![
        Node::new(ICON, "ICON", icon.url("/")).with_bmc(ICON_BMC),
        Node::new(BSC, "BSC", "http://127.0.0.1:9/"),
    ])
    .unwrap();
    let src = source(topology, Duration::from_secs(5));

    let err = src.fetch(&Connection::new(ICON, BSC)).await.unwrap_err();
    assert!(matches!(err, QueryError::Malformed(_)), "{err}");
    hits.assert_hits_async(0).await;
}
