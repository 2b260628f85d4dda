//! Health handler.
//!
//! - GET /health -> liveness with worker identity; never cached

use crate::state::AppState;
use axum::{
    Json,
    extract::State,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

/// `GET /health`
///
/// Always returns 200 OK. This endpoint is cheap and never touches the
/// object store or the edge cache.
pub async fn health(State(state): State<AppState>) -> Response {
    let body = HealthResponse {
        status: "ok",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        worker: state.worker.clone(),
        region: state.region.clone(),
    };

    let mut response = (StatusCode::OK, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
    worker: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    region: Option<String>,
}
