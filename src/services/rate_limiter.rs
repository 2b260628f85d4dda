//! Rate limiting in front of the asset routes.
//!
//! Only the limiter's verdict is consumed here. A limiter that errors lets the
//! request through.

use crate::errors::AppError;
use anyhow::anyhow;
use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};
use tracing::{debug, warn};

#[async_trait]
pub trait RateLimiter: Send + Sync + 'static {
    /// `Ok(true)` when the request identified by `key` may proceed.
    async fn limit(&self, key: &str) -> anyhow::Result<bool>;
}

/// Allows `max_requests` per key within each fixed window.
pub struct FixedWindowLimiter {
    max_requests: u32,
    window: Duration,
    counters: Mutex<HashMap<String, (Instant, u32)>>,
}

impl FixedWindowLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            counters: Mutex::new(HashMap::new()),
        }
    }

    pub fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }
}

#[async_trait]
impl RateLimiter for FixedWindowLimiter {
    async fn limit(&self, key: &str) -> anyhow::Result<bool> {
        let now = Instant::now();
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| anyhow!("rate limiter lock poisoned"))?;

        let window = self.window;
        counters.retain(|_, (started, _)| now.duration_since(*started) < window);

        let (_, count) = counters.entry(key.to_string()).or_insert((now, 0));
        if *count >= self.max_requests {
            return Ok(false);
        }
        *count += 1;
        Ok(true)
    }
}

/// Identify the client by the first forwarding header present.
pub fn client_key(headers: &HeaderMap) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    header("cf-connecting-ip")
        .or_else(|| header("x-forwarded-for").and_then(|v| v.split(',').next()).map(str::trim))
        .or_else(|| header("x-real-ip"))
        .unwrap_or("anonymous")
        .to_string()
}

pub async fn rate_limit(
    State(limiter): State<Arc<dyn RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let key = client_key(request.headers());
    match limiter.limit(&key).await {
        Ok(true) => next.run(request).await,
        Ok(false) => {
            debug!("rate limited client {}", key);
            AppError::rate_limited().into_response()
        }
        Err(err) => {
            warn!(error = %err, "rate limiter failed, allowing request");
            next.run(request).await
        }
    }
}
