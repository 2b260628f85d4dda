use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr, time::Duration};
use uuid::Uuid;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    /// Base URL of the image transformation service. Without it every
    /// transform attempt falls back to the original object.
    pub transform_url: Option<String>,
    pub cache_ttl_secs: u64,
    /// Upper bound on live edge cache entries.
    pub cache_max_entries: usize,
    pub upstream_timeout_secs: u64,
    pub rate_limit_per_minute: Option<u32>,
    pub region: Option<String>,
    pub worker_name: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Edge delivery proxy for stored objects")]
pub struct Args {
    /// Host to bind to (overrides EDGE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides EDGE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory objects are served from (overrides EDGE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Transformation service base URL (overrides EDGE_TRANSFORM_URL)
    #[arg(long)]
    pub transform_url: Option<String>,

    /// Edge cache lifetime in seconds (overrides EDGE_CACHE_TTL_SECS)
    #[arg(long)]
    pub cache_ttl_secs: Option<u64>,

    /// Maximum number of cached responses held in memory (overrides EDGE_CACHE_MAX_ENTRIES)
    #[arg(long)]
    pub cache_max_entries: Option<usize>,

    /// Deadline for object store and transformer calls (overrides EDGE_UPSTREAM_TIMEOUT_SECS)
    #[arg(long)]
    pub upstream_timeout_secs: Option<u64>,

    /// Requests per client per minute; unset disables limiting (overrides EDGE_RATE_LIMIT_PER_MINUTE)
    #[arg(long)]
    pub rate_limit_per_minute: Option<u32>,

    /// Region reported by /health (overrides EDGE_REGION)
    #[arg(long)]
    pub region: Option<String>,

    /// Worker name reported by /health (overrides EDGE_WORKER_NAME)
    #[arg(long)]
    pub worker_name: Option<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::merge(Args::parse())
    }

    fn merge(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env::var("EDGE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_number::<u16>("EDGE_PORT")?.unwrap_or(8787);
        let env_storage = env::var("EDGE_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_ttl = env_number::<u64>("EDGE_CACHE_TTL_SECS")?.unwrap_or(31_536_000);
        let env_max_entries = env_number::<usize>("EDGE_CACHE_MAX_ENTRIES")?.unwrap_or(10_000);
        let env_timeout = env_number::<u64>("EDGE_UPSTREAM_TIMEOUT_SECS")?.unwrap_or(30);
        let env_rate = env_number::<u32>("EDGE_RATE_LIMIT_PER_MINUTE")?;

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            transform_url: args.transform_url.or_else(|| env_text("EDGE_TRANSFORM_URL")),
            cache_ttl_secs: args.cache_ttl_secs.unwrap_or(env_ttl),
            cache_max_entries: args.cache_max_entries.unwrap_or(env_max_entries),
            upstream_timeout_secs: args.upstream_timeout_secs.unwrap_or(env_timeout),
            rate_limit_per_minute: args.rate_limit_per_minute.or(env_rate).filter(|n| *n > 0),
            region: args.region.or_else(|| env_text("EDGE_REGION")),
            worker_name: args
                .worker_name
                .or_else(|| env_text("EDGE_WORKER_NAME"))
                .unwrap_or_else(|| format!("edge-delivery-{}", Uuid::new_v4())),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}

fn env_text(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_number<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
