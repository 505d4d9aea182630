//! Runtime tunables, loaded the way the teacher's `Config::from_env` loads
//! its settings: `dotenv().ok()` then one `env::var(...).parse().unwrap_or`
//! per field, each falling back to the documented default.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Clone)]
pub struct Config {
    pub base_dir: PathBuf,
    pub check_interval_secs: u64,
    pub quote_ttl_secs: u64,
    pub max_quote_workers: usize,
    pub broker_session_ttl_secs: u64,
    pub broker_session_max: usize,
    pub lock_timeout_secs: u64,
    pub cond_eps: f64,
    pub retention_days: i64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            base_dir: std::env::var("TOE_BASE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./users")),
            check_interval_secs: std::env::var("TOE_CHECK_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            quote_ttl_secs: std::env::var("TOE_QUOTE_TTL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            max_quote_workers: std::env::var("TOE_MAX_QUOTE_WORKERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            broker_session_ttl_secs: std::env::var("TOE_BROKER_SESSION_TTL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1800),
            broker_session_max: std::env::var("TOE_BROKER_SESSION_MAX")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(50),
            lock_timeout_secs: std::env::var("TOE_LOCK_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            cond_eps: std::env::var("TOE_COND_EPS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.01),
            retention_days: std::env::var("TOE_RETENTION_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        }
    }

    /// Applies CLI overrides on top of whatever `from_env` produced, so
    /// integration tests can point the binary at a scratch directory
    /// without juggling environment variables.
    pub fn with_cli_overrides(mut self, cli: &Cli) -> Self {
        if let Some(dir) = &cli.base_dir {
            self.base_dir = dir.clone();
        }
        if let Some(v) = cli.check_interval {
            self.check_interval_secs = v;
        }
        self
    }
}

#[derive(Debug, Parser)]
#[command(name = "trigger-engine", about = "Multi-tenant conditional-order engine")]
pub struct Cli {
    /// Overrides TOE_BASE_DIR — the root of the per-tenant store.
    #[arg(long)]
    pub base_dir: Option<PathBuf>,

    /// Overrides TOE_CHECK_INTERVAL (seconds between scheduler rounds).
    #[arg(long)]
    pub check_interval: Option<u64>,
}
