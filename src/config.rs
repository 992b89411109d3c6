//! Runtime Configuration
//!
//! Every knob is read from the environment once at startup with a sensible
//! default, so a bare `cargo run` brings up a working development node.

use crate::wallet::types::Credits;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Root directory for uploaded task artifacts (one subdirectory per task).
    pub data_dir: PathBuf,
    /// Maximum accepted HTTP body size.
    pub max_body_bytes: usize,
    /// A worker with no heartbeat inside this window is treated as offline.
    pub worker_timeout_ms: u64,
    /// Bucket leases expire this long after assignment (or last refresh).
    pub lease_ttl_ms: u64,
    /// Default planning limit on the number of buckets per task.
    pub default_max_buckets: u32,
    /// Default planning limit on the serialised byte size of one bucket.
    pub default_bucket_bytes: u64,
    /// Default platform fee, in percent of the per-bucket cost.
    pub platform_fee_percent: f64,
    /// Opt-in override that skips the budget and wallet gates in `next_bucket`.
    pub disable_budget_checks: bool,
    /// Allows manual wallet deposits/withdrawals without an external payment.
    pub wallet_sandbox_enabled: bool,
    /// Seed balance for users created on the fly from an unknown session.
    pub dev_initial_wallet: Credits,
    /// Secret key for the external checkout provider; unset means 501.
    pub stripe_secret_key: Option<String>,
    /// Base URL used for checkout redirect targets.
    pub public_base_url: String,
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|value| matches!(value.trim(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        let bind_addr = env_parse("BIND_ADDR", "127.0.0.1:8080".parse().expect("valid default"));

        Self {
            bind_addr,
            data_dir: PathBuf::from(
                std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
            ),
            max_body_bytes: env_parse("MAX_BODY_BYTES", 20 * 1024 * 1024),
            worker_timeout_ms: env_parse("WORKER_TIMEOUT_MS", 20 * 60 * 1000),
            lease_ttl_ms: env_parse("LEASE_TTL_MS", 20 * 60 * 1000),
            default_max_buckets: env_parse("DEFAULT_MAX_BUCKETS", 10),
            default_bucket_bytes: env_parse("DEFAULT_BUCKET_BYTES", 1024 * 1024),
            platform_fee_percent: env_parse("PLATFORM_FEE_PERCENT", 10.0),
            disable_budget_checks: env_flag("DISABLE_BUDGET_CHECKS", false),
            wallet_sandbox_enabled: env_flag("WALLET_SANDBOX_ENABLED", false),
            dev_initial_wallet: Credits::from_major(env_parse("DEV_INITIAL_WALLET", 100.0)),
            stripe_secret_key: std::env::var("STRIPE_SECRET_KEY")
                .ok()
                .filter(|key| !key.is_empty()),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".parse().expect("valid default"),
            data_dir: PathBuf::from("./data"),
            max_body_bytes: 20 * 1024 * 1024,
            worker_timeout_ms: 20 * 60 * 1000,
            lease_ttl_ms: 20 * 60 * 1000,
            default_max_buckets: 10,
            default_bucket_bytes: 1024 * 1024,
            platform_fee_percent: 10.0,
            disable_budget_checks: false,
            wallet_sandbox_enabled: false,
            dev_initial_wallet: Credits::from_major(100.0),
            stripe_secret_key: None,
            public_base_url: "http://localhost:8080".to_string(),
        }
    }
}
