//! HTTP surface for Lumen audits.
//!
//! `build_router` is the single entry point. The `lumen serve` subcommand
//! wraps it with CORS and request tracing; tests in `tests/` drive the bare
//! router in-process.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use lumen_runtime::{AuditService, ServiceError};

pub const BANNER: &str = concat!("Lumen accessibility audit server ", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Default, Deserialize)]
pub struct UrlQuery {
    pub url: Option<String>,
}

/// Build the router wired to `service`.
///
/// Every evaluator is served at `/<evaluator id>`; aliases such as
/// `/link_accessibility` resolve through the evaluator id parser.
pub fn build_router(service: AuditService) -> Router {
    Router::new()
        .route("/", get(banner))
        .route("/health", get(health))
        .route("/audit", get(full_audit))
        .route("/:evaluator", get(check))
        .with_state(service)
}

async fn banner() -> &'static str {
    BANNER
}

async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "ok": true,
            "service": "lumen",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

async fn full_audit(State(service): State<AuditService>, Query(query): Query<UrlQuery>) -> Response {
    respond(service.run_full_audit(query.url.as_deref()).await)
}

async fn check(
    State(service): State<AuditService>,
    Path(evaluator): Path<String>,
    Query(query): Query<UrlQuery>,
) -> Response {
    respond(service.run_check(&evaluator, query.url.as_deref()).await)
}

fn respond(result: Result<JsonValue, ServiceError>) -> Response {
    match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => {
            let status =
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            if status.is_server_error() {
                tracing::warn!(error = %e, "Request failed");
            }
            (status, Json(e.to_json())).into_response()
        }
    }
}
