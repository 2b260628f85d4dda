//! Defines the routes of the edge delivery service.
//!
//! ## Structure
//! - `GET  /health`: liveness; bypasses rate limiting and the edge cache
//! - `GET  /{*key}`: deliver an object (transform via `w,h,q,fit,f`; `Range` supported)
//! - `HEAD /{*key}`: object metadata only
//!
//! Asset requests pass through, outermost first: rate limiter → edge cache → handler.

use crate::{
    handlers::{asset_handlers::serve_asset, health_handlers::health},
    services::{
        edge_cache::{EdgeCacheCoordinator, edge_cache},
        rate_limiter::{RateLimiter, rate_limit},
    },
    state::AppState,
};
use axum::{Router, middleware::from_fn_with_state, routing::get};
use std::sync::Arc;

/// Build the router. The rate limiter layer is only installed when a limiter is given.
pub fn routes(
    state: AppState,
    cache: EdgeCacheCoordinator,
    limiter: Option<Arc<dyn RateLimiter>>,
) -> Router {
    let mut assets = Router::new()
        .route("/", get(serve_asset).head(serve_asset))
        .route("/{*key}", get(serve_asset).head(serve_asset))
        .layer(from_fn_with_state(cache, edge_cache));

    if let Some(limiter) = limiter {
        assets = assets.layer(from_fn_with_state(limiter, rate_limit));
    }

    Router::new()
        .route("/health", get(health))
        .merge(assets)
        .with_state(state)
}
