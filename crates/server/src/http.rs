// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport: one `/mcp` endpoint
//!
//! POST carries JSON-RPC request/response; GET opens a server-sent
//! events stream with `Last-Event-ID` replay. Binds loopback only,
//! checks `Origin` against a localhost allow-list, and requires the
//! pre-shared bearer token when one is configured.

use crate::dispatch::dispatch;
use crate::state::ServerState;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::stream::Stream;
use serde_json::Value;
use sm_rpc::{error_codes, JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpServeError {
    #[error("refusing to bind non-loopback address {0}")]
    NotLoopback(IpAddr),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub host: IpAddr,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { host: IpAddr::from([127, 0, 0, 1]), port: 8173 }
    }
}

/// Build the router (exposed for tests).
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/mcp", post(handle_post).get(handle_sse))
        .with_state(state)
}

/// Serve `/mcp` until the process exits. Loopback only.
pub async fn serve_http(state: Arc<ServerState>, config: HttpConfig) -> Result<(), HttpServeError> {
    if !config.host.is_loopback() {
        return Err(HttpServeError::NotLoopback(config.host));
    }
    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "control server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

const ALLOWED_ORIGINS: &[&str] = &["http://localhost", "http://127.0.0.1", "http://[::1]"];

/// Origin must be absent (non-browser client) or a localhost origin.
fn origin_allowed(headers: &HeaderMap) -> bool {
    match headers.get("origin").and_then(|v| v.to_str().ok()) {
        None => true,
        Some(origin) => ALLOWED_ORIGINS.iter().any(|allowed| {
            origin == *allowed || origin.starts_with(&format!("{allowed}:"))
        }),
    }
}

fn bearer_ok(state: &ServerState, headers: &HeaderMap) -> bool {
    let Some(expected) = &state.auth_token else {
        return true;
    };
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| token == expected)
        .unwrap_or(false)
}

fn check_access(state: &ServerState, headers: &HeaderMap) -> Result<(), JsonRpcResponse> {
    if !origin_allowed(headers) {
        return Err(JsonRpcResponse::failure(
            None,
            JsonRpcError::new(error_codes::UNAUTHORIZED, "origin not allowed"),
        ));
    }
    if !bearer_ok(state, headers) {
        return Err(JsonRpcResponse::failure(None, JsonRpcError::unauthorized()));
    }
    Ok(())
}

async fn handle_post(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    if let Err(response) = check_access(&state, &headers) {
        return (StatusCode::UNAUTHORIZED, Json(serde_json::to_value(response).unwrap_or_default()));
    }

    let request: JsonRpcRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(e) => {
            let response = JsonRpcResponse::failure(
                None,
                JsonRpcError::new(error_codes::PARSE_ERROR, format!("parse error: {e}")),
            );
            return (
                StatusCode::OK,
                Json(serde_json::to_value(response).unwrap_or_default()),
            );
        }
    };

    match dispatch(&state, request).await {
        Some(response) => (
            StatusCode::OK,
            Json(serde_json::to_value(response).unwrap_or_default()),
        ),
        None => (StatusCode::ACCEPTED, Json(Value::Null)),
    }
}

async fn handle_sse(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    if check_access(&state, &headers).is_err() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let last_id = headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);

    // Subscribe before replaying so nothing published in between is lost;
    // the id filter below drops duplicates.
    let rx = state.hub.subscribe();
    let replay = state.hub.replay_since(last_id);
    let start_cursor = replay.last().map(|e| e.id).unwrap_or(last_id);

    let replayed = futures_util::stream::iter(
        replay.into_iter().map(|envelope| Ok(to_sse_event(&envelope))),
    );
    let live = futures_util::stream::unfold((rx, start_cursor), move |(mut rx, mut seen)| async move {
        loop {
            match rx.recv().await {
                Ok(envelope) => {
                    if envelope.id <= seen {
                        continue;
                    }
                    seen = envelope.id;
                    return Some((Ok(to_sse_event(&envelope)), (rx, seen)));
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "sse subscriber lagged");
                    continue;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    let stream = futures_util::StreamExt::chain(replayed, live);
    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new().interval(Duration::from_secs(15)).text("keep-alive"),
    ))
}

fn to_sse_event(envelope: &sm_rpc::StreamEnvelope) -> Event {
    Event::default()
        .id(envelope.id.to_string())
        .event(envelope.notification.method.clone())
        .data(serde_json::to_string(&envelope.notification.params).unwrap_or_default())
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
