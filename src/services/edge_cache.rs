//! Edge cache: a cache-aside layer in front of the delivery pipeline.
//!
//! The key varies with every request dimension that changes the body bytes:
//! the absolute URL, the `Range` header and `Accept-Encoding`. Hits are served
//! verbatim. Successful misses are written back in the background once the
//! response has been built. Concurrent misses for the same key are not
//! coalesced; each computes the response and the last write wins.
//!
//! Only `GET` goes through the cache. `HEAD` responses pass straight through
//! and carry no `X-Cache-Status`.

use crate::{
    errors::AppError,
    models::envelope::{CacheStatus, X_CACHE_STATUS},
    services::deferred::DeferredTasks,
};
use anyhow::anyhow;
use async_trait::async_trait;
use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
    time::{Duration, Instant},
};
use tracing::{debug, error, warn};

/// Identity of a cached response.
///
/// `range` and `accept_encoding` are only set when the request carried the
/// header, so requests without them share one key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub url: String,
    pub range: Option<String>,
    pub accept_encoding: Option<String>,
}

impl CacheKey {
    pub fn from_request(uri: &Uri, headers: &HeaderMap) -> Self {
        Self {
            url: absolute_url(uri, headers),
            range: header_text(headers, header::RANGE),
            accept_encoding: header_text(headers, header::ACCEPT_ENCODING),
        }
    }
}

fn header_text(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
}

fn absolute_url(uri: &Uri, headers: &HeaderMap) -> String {
    let path_and_query = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    if let (Some(scheme), Some(authority)) = (uri.scheme_str(), uri.authority()) {
        return format!("{}://{}{}", scheme, authority, path_and_query);
    }
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{}{}", host, path_and_query)
}

/// A response as persisted in the edge cache.
#[derive(Clone, Debug)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CachedResponse {
    fn into_response(self, cache_status: CacheStatus) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response.headers_mut().insert(
            X_CACHE_STATUS,
            HeaderValue::from_static(cache_status.as_str()),
        );
        response
    }
}

/// Expirable response store. Eviction beyond expiry is up to the implementation.
#[async_trait]
pub trait EdgeCache: Send + Sync + 'static {
    async fn lookup(&self, key: &CacheKey) -> anyhow::Result<Option<CachedResponse>>;
    async fn store(&self, key: CacheKey, entry: CachedResponse, ttl: Duration)
    -> anyhow::Result<()>;
}

struct Entry {
    response: CachedResponse,
    expires_at: Instant,
}

/// Process-local edge cache with per-entry expiry and an entry cap.
///
/// Expired entries are swept on every write. Once `max_entries` live entries
/// are held, writes for new keys are refused until something expires.
pub struct MemoryEdgeCache {
    entries: RwLock<HashMap<CacheKey, Entry>>,
    max_entries: usize,
}

impl MemoryEdgeCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }
}

#[async_trait]
impl EdgeCache for MemoryEdgeCache {
    async fn lookup(&self, key: &CacheKey) -> anyhow::Result<Option<CachedResponse>> {
        let now = Instant::now();
        {
            let entries = self
                .entries
                .read()
                .map_err(|_| anyhow!("edge cache lock poisoned"))?;
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => {
                    return Ok(Some(entry.response.clone()));
                }
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Expired: drop it so the map doesn't keep dead bodies around.
        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow!("edge cache lock poisoned"))?;
        if entries.get(key).is_some_and(|e| e.expires_at <= now) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn store(
        &self,
        key: CacheKey,
        entry: CachedResponse,
        ttl: Duration,
    ) -> anyhow::Result<()> {
        let now = Instant::now();
        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow!("edge cache lock poisoned"))?;

        entries.retain(|_, e| e.expires_at > now);
        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            return Err(anyhow!(
                "edge cache full ({} entries), not storing {}",
                self.max_entries,
                key.url
            ));
        }

        entries.insert(
            key,
            Entry {
                response: entry,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }
}

/// Shared state of the cache middleware.
#[derive(Clone)]
pub struct EdgeCacheCoordinator {
    cache: Arc<dyn EdgeCache>,
    tasks: DeferredTasks,
    ttl: Duration,
}

impl EdgeCacheCoordinator {
    pub fn new(cache: Arc<dyn EdgeCache>, tasks: DeferredTasks, ttl: Duration) -> Self {
        Self { cache, tasks, ttl }
    }

    fn schedule_store(&self, key: CacheKey, entry: CachedResponse) {
        let cache = self.cache.clone();
        let ttl = self.ttl;
        self.tasks.defer("edge-cache-write", async move {
            cache.store(key, entry, ttl).await
        });
    }
}

/// Cache-aside middleware. Only `GET` is cached; everything else passes through.
pub async fn edge_cache(
    State(coordinator): State<EdgeCacheCoordinator>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() != Method::GET {
        return next.run(request).await;
    }

    let key = CacheKey::from_request(request.uri(), request.headers());
    match coordinator.cache.lookup(&key).await {
        Ok(Some(hit)) => {
            debug!("edge cache hit for {}", key.url);
            return hit.into_response(CacheStatus::Hit);
        }
        Ok(None) => debug!("edge cache miss for {}", key.url),
        Err(err) => warn!(error = %err, "edge cache lookup failed, treating as miss"),
    }

    let response = next.run(request).await;
    if !response.status().is_success() {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let body = match to_bytes(body, usize::MAX).await {
        Ok(body) => body,
        Err(err) => {
            error!(error = %err, "failed to buffer response for edge cache");
            return AppError::internal().into_response();
        }
    };
    parts.headers.insert(
        X_CACHE_STATUS,
        HeaderValue::from_static(CacheStatus::Miss.as_str()),
    );

    coordinator.schedule_store(
        key,
        CachedResponse {
            status: parts.status,
            headers: parts.headers.clone(),
            body: body.clone(),
        },
    );

    Response::from_parts(parts, Body::from(body))
}
