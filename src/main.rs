use anyhow::Result;
use axum::Router;
use services::{
    deferred::DeferredTasks,
    delivery_pipeline::DeliveryPipeline,
    edge_cache::{EdgeCacheCoordinator, MemoryEdgeCache},
    rate_limiter::{FixedWindowLimiter, RateLimiter},
    storage_service::DiskObjectStore,
    transformer::{DisabledTransformer, HttpTransformer, Transformer},
};
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::{net::TcpListener, signal};
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting edge-delivery with config: {:?}", cfg);

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Capabilities ---
    let store = Arc::new(DiskObjectStore::new(&cfg.storage_dir));
    let transformer: Arc<dyn Transformer> = match &cfg.transform_url {
        Some(url) => {
            tracing::info!("Transformations delegated to {}", url);
            Arc::new(HttpTransformer::new(url.as_str()))
        }
        None => {
            tracing::warn!("No transform URL configured; transformed requests serve originals");
            Arc::new(DisabledTransformer)
        }
    };
    let limiter = cfg.rate_limit_per_minute.map(|per_minute| {
        tracing::info!("Rate limiting to {} requests per minute per client", per_minute);
        Arc::new(FixedWindowLimiter::per_minute(per_minute)) as Arc<dyn RateLimiter>
    });

    let tasks = DeferredTasks::new();
    let cache = EdgeCacheCoordinator::new(
        Arc::new(MemoryEdgeCache::new(cfg.cache_max_entries)),
        tasks.clone(),
        cfg.cache_ttl(),
    );
    let state = state::AppState {
        pipeline: DeliveryPipeline::new(store, transformer, cfg.upstream_timeout()),
        worker: cfg.worker_name.clone(),
        region: cfg.region.clone(),
    };

    // --- Build router ---
    let app: Router = routes::routes::routes(state, cache, limiter);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Pending cache writes outlive their responses; let them land.
    tracing::info!("Draining {} deferred task(s)", tasks.pending());
    tasks.drain().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
