//! HTTP query engine (C7): `GET /`, `GET /api`, `GET /tags`.
//!
//! Router/handler shape grounded on the teacher's axum server in
//! `Lowband21-ferrex/server/src/main.rs` (`AppState` + `Router::with_state`
//! + `TraceLayer`/`CorsLayer`); the request algorithm itself is grounded on
//! `internal/api/core.go`'s `Handle`/`Run`.

pub mod context;
pub mod query;
pub mod tags;

use std::sync::Arc;

use axum::extract::{RawQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::context::QueryContext;
use crate::api::query::{handle, parse_raw_query, Sink};
use crate::api::tags::TagTracker;
use crate::server::Server;

const API_VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn build_context(server: &Server) -> QueryContext {
    QueryContext::new(
        server.config.global.output.clone(),
        server.config.api.limit,
        server.converters.clone(),
        server.config.api.start_scan,
        server.config.api.end_scan,
        API_VERSION,
        &server.hostname,
    )
}

pub fn router(server: Arc<Server>) -> Router {
    Router::new()
        .route("/", get(data_handler))
        .route("/api", get(api_handler))
        .route("/tags", get(tags_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(server)
}

fn wrap(ctx: &QueryContext, body: Vec<u8>) -> Response {
    let mut full = Vec::with_capacity(ctx.meta_header.len() + body.len() + ctx.meta_footer.len());
    full.extend_from_slice(ctx.meta_header.as_bytes());
    full.extend_from_slice(&body);
    full.extend_from_slice(ctx.meta_footer.as_bytes());
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        full,
    )
        .into_response()
}

async fn data_handler(State(server): State<Arc<Server>>, RawQuery(query): RawQuery) -> Response {
    let result = tokio::task::spawn_blocking(move || {
        let ctx = build_context(&server);
        let params = parse_raw_query(query.as_deref().unwrap_or(""));
        let mut chunks = Vec::new();
        let body = handle(&ctx, &server.config.api.handlers, params, Sink::Data(&mut chunks));
        (ctx, body)
    })
    .await;

    match result {
        Ok((ctx, body)) => wrap(&ctx, body),
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn tags_handler(State(server): State<Arc<Server>>, RawQuery(query): RawQuery) -> Response {
    let result = tokio::task::spawn_blocking(move || {
        let ctx = build_context(&server);
        let params = parse_raw_query(query.as_deref().unwrap_or(""));
        let mut tracker = TagTracker::new();
        let body = handle(&ctx, &server.config.api.handlers, params, Sink::Tags(&mut tracker));
        (ctx, body)
    })
    .await;

    match result {
        Ok((ctx, body)) => wrap(&ctx, body),
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn api_handler(State(server): State<Arc<Server>>) -> Response {
    let ctx = build_context(&server);
    let body = format!("{{\"started\": \"{}\"}}", server.api_started).into_bytes();
    wrap(&ctx, body)
}
