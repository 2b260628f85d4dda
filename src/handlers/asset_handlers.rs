//! HTTP handler for `GET`/`HEAD` on stored objects.

use crate::{
    errors::AppError,
    models::{envelope::ResponseEnvelope, object::ObjectKey},
    services::{delivery_pipeline::DeliveryRequest, transform_resolver},
    state::AppState,
};
use axum::{
    extract::{
        Path, Query, State,
        rejection::{PathRejection, QueryRejection},
    },
    http::{HeaderMap, Method, header},
};
use std::collections::HashMap;

/// `GET|HEAD /{*key}`: serve an object, optionally transformed or ranged.
///
/// Query: `w`, `h`, `q`, `fit`, `f`. Header: `Range: bytes=<start>-<end>?`.
pub async fn serve_asset(
    State(state): State<AppState>,
    method: Method,
    key: Result<Path<String>, PathRejection>,
    headers: HeaderMap,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> Result<ResponseEnvelope, AppError> {
    // `/` carries no key segment; it resolves to the empty key.
    let key = key
        .map(|Path(key)| ObjectKey::from_path(&key))
        .unwrap_or_else(|_| ObjectKey::from_path(""));

    // An undecodable query string carries no usable transform hints.
    let query = query.map(|Query(q)| q).unwrap_or_default();
    let transform = transform_resolver::resolve(&key, &query);

    let range_header = headers
        .get(header::RANGE)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());

    state
        .pipeline
        .deliver(DeliveryRequest {
            key,
            transform,
            is_head: method == Method::HEAD,
            range_header,
        })
        .await
}
