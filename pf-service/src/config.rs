//! Process configuration (§2 ambient stack): CLI flags layered over
//! environment variables, the way `node/src/command.rs` and the
//! data-extension worker's `DataExtensionWorkerConfiguration` both use
//! `clap::Parser` to assemble a typed config from the process's argv/env.

use std::time::Duration;

use clap::Parser;

/// Tunables for every subsystem this binary composes: FX TTL (§4.2),
/// worker pool size and per-job deadline (§4.7), cleanup interval
/// (§4.11), HMAC secret (§4.5), session/job lifetimes (§3).
#[derive(Debug, Clone, Parser)]
#[command(name = "pf-service", about = "Personal-finance backend: import pipeline, auth, and gold engine")]
pub struct Config {
    /// Postgres connection string for the durable store (C12, C4 durable tier).
    #[arg(long, env = "PF_DATABASE_URL")]
    pub database_url: String,

    /// Redis connection string for the fast tiers (C4 cache, C6 job queue).
    #[arg(long, env = "PF_REDIS_URL")]
    pub redis_url: String,

    /// Base URL of the FX rate provider (C2, §6).
    #[arg(long, env = "PF_FX_PROVIDER_URL")]
    pub fx_provider_url: String,

    /// Base URL of the external identity verification endpoint (C5, §6).
    #[arg(long, env = "PF_IDENTITY_PROVIDER_URL")]
    pub identity_provider_url: String,

    /// Base URL of the gold market-price feed (C3, §6). Optional — a
    /// deployment that only stores user-entered purchases need not
    /// configure one.
    #[arg(long, env = "PF_GOLD_MARKET_URL")]
    pub gold_market_url: Option<String>,

    /// Shared HMAC secret used to sign/verify session tokens (§4.5).
    #[arg(long, env = "PF_TOKEN_SECRET")]
    pub token_secret: String,

    /// Session lifetime in hours (§3 Session.expires_at).
    #[arg(long, env = "PF_SESSION_TTL_HOURS", default_value_t = 24 * 30)]
    pub session_ttl_hours: i64,

    /// Import job record lifetime in hours (§3 ImportJob.expires_at).
    #[arg(long, env = "PF_JOB_TTL_HOURS", default_value_t = 24)]
    pub job_ttl_hours: i64,

    /// Number of worker-pool consumers (§4.7).
    #[arg(long, env = "PF_WORKER_POOL_SIZE", default_value_t = 4)]
    pub worker_pool_size: usize,

    /// Per-job execution deadline in seconds (§4.7, default 5 minutes).
    #[arg(long, env = "PF_JOB_DEADLINE_SECS", default_value_t = 300)]
    pub job_deadline_secs: u64,

    /// How long a blocking dequeue waits before a worker loops (§4.7).
    #[arg(long, env = "PF_DEQUEUE_TIMEOUT_SECS", default_value_t = 5)]
    pub dequeue_timeout_secs: u64,

    /// Fixed backoff after a non-queue dequeue error (§4.7).
    #[arg(long, env = "PF_ERROR_BACKOFF_SECS", default_value_t = 2)]
    pub error_backoff_secs: u64,

    /// Interval between cleanup sweeper passes in seconds (§4.11).
    #[arg(long, env = "PF_CLEANUP_INTERVAL_SECS", default_value_t = 60 * 15)]
    pub cleanup_interval_secs: u64,

    /// FX rate cache TTL in minutes (§4.2).
    #[arg(long, env = "PF_FX_CACHE_TTL_MINUTES", default_value_t = 15)]
    pub fx_cache_ttl_minutes: u64,

    /// Gold market-price cache TTL in minutes (§4.3).
    #[arg(long, env = "PF_GOLD_CACHE_TTL_MINUTES", default_value_t = 5)]
    pub gold_cache_ttl_minutes: u64,

    /// Max Postgres pool connections.
    #[arg(long, env = "PF_DB_MAX_CONNECTIONS", default_value_t = 10)]
    pub db_max_connections: u32,
}

impl Config {
    pub fn job_deadline(&self) -> Duration {
        Duration::from_secs(self.job_deadline_secs)
    }

    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_secs(self.dequeue_timeout_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn fx_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.fx_cache_ttl_minutes * 60)
    }

    pub fn gold_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.gold_cache_ttl_minutes * 60)
    }
}
