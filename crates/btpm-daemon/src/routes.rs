//! Axum router and all HTTP handlers for btpm-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Every route is read-only.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use btpm_links::Connection;

use crate::{
    api_types::{
        ErrorResponse, EventsResponse, FailureView, HealthResponse, LinkView, LinksResponse,
        PairView, PairsResponse, StatusResponse,
    },
    state::{uptime_secs, AppState, BusMsg},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/links", get(links_handler))
        .route("/v1/links/pairs", get(pairs_handler))
        .route("/v1/links/:src/:dst", get(link_handler))
        .route("/v1/status", get(status_handler))
        .route("/v1/events", get(events_handler))
        .route("/v1/stream", get(stream))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let last_cycle = st.last_cycle.read().await.clone();
    let settings = st.links.settings();
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
            uptime_secs: uptime_secs(),
            links: st.links.keys().len(),
            grace_period_secs: settings.grace_period.as_secs(),
            query_timeout_ms: settings.query_timeout.as_millis() as u64,
            last_cycle,
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/links
// ---------------------------------------------------------------------------

/// Current mapping in topology order.
pub(crate) async fn links_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let current = st.links.current();
    let topology = st.links.topology();

    let mut links = Vec::with_capacity(current.len());
    let mut unpolled = Vec::new();
    for conn in st.links.keys() {
        match current.get(conn) {
            Some(status) => links.push(LinkView::new(topology, conn, status)),
            None => unpolled.push(conn.clone()),
        }
    }

    (StatusCode::OK, Json(LinksResponse { unpolled, links }))
}

// ---------------------------------------------------------------------------
// GET /v1/links/pairs
// ---------------------------------------------------------------------------

pub(crate) async fn pairs_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let topology = st.links.topology();
    let pairs = st
        .links
        .merged()
        .iter()
        .map(|m| PairView::new(topology, m))
        .collect();
    (StatusCode::OK, Json(PairsResponse { pairs }))
}

// ---------------------------------------------------------------------------
// GET /v1/links/:src/:dst
// ---------------------------------------------------------------------------

pub(crate) async fn link_handler(
    State(st): State<Arc<AppState>>,
    Path((src, dst)): Path<(String, String)>,
) -> Response {
    let conn = Connection::new(src, dst);
    match st.links.get_link(&conn.src, &conn.dst) {
        Some(status) => (
            StatusCode::OK,
            Json(LinkView::new(st.links.topology(), &conn, &status)),
        )
            .into_response(),
        None => {
            let error = if st.links.topology().contains(&conn) {
                format!("link {conn} has not been polled yet")
            } else {
                format!("link {conn} is not monitored")
            };
            (StatusCode::NOT_FOUND, Json(ErrorResponse { error })).into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

/// Fresh grace-free query. Never touches the stored or current link state.
pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let view = st.links.query_status().await;
    debug!(
        polled = view.statuses.len(),
        failed = view.failures.len(),
        "status query served"
    );

    let topology = st.links.topology();
    let pairs = view.merged().iter().map(|m| PairView::new(topology, m)).collect();
    let failures = view.failures.iter().map(FailureView::from).collect();

    (
        StatusCode::OK,
        Json(StatusResponse {
            polled_at: view.polled_at,
            pairs,
            failures,
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/events
// ---------------------------------------------------------------------------

pub(crate) async fn events_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let events = st.recent.read().await.iter().cloned().collect();
    (StatusCode::OK, Json(EventsResponse { events }))
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let event_name = match &m {
                    BusMsg::Heartbeat { .. } => "heartbeat",
                    BusMsg::LinkEvent(_) => "link_event",
                    BusMsg::Cycle(_) => "cycle",
                };
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(event_name).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
