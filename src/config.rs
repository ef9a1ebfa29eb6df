use crate::trade::CommissionPolicy;
use crate::types::Amount;
use anyhow::{format_err, Context, Result};
use std::{env, fmt::Display, net::SocketAddr, str::FromStr, time::Duration};
use tracing::warn;

const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_DB_POOL_SIZE: u32 = 8;
const DEFAULT_COMMISSION_RATE_BPS: u32 = 500;
const DEFAULT_COMMISSION_MIN_FEE: Amount = 0;
const DEFAULT_SCHEDULER_TICK_MS: u64 = 1000;
const DEFAULT_BID_RETRY_LIMIT: u32 = 5;
const DEFAULT_AUCTION_EXTENSION_SECS: u64 = 120;
/// Longest extension window accepted, a week
const MAX_AUCTION_EXTENSION_SECS: u64 = 7 * 24 * 60 * 60;
const DEFAULT_EVENT_POLL_MS: u64 = 200;

#[derive(Clone, Debug)]
pub struct Config {
    pub http_addr: SocketAddr,
    /// PostgreSQL connection string; in-memory persistence when not set
    pub database_url: Option<String>,
    pub db_pool_size: u32,
    pub commission: CommissionPolicy,
    pub scheduler_tick: Duration,
    pub engine: EngineConfig,
    /// How often the PostgreSQL event log is polled for new events
    pub event_poll_interval: Duration,
}

/// Settings of the auction engine
#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    /// How many times a bid lost to a concurrent update is retried
    pub bid_retry_limit: u32,
    /// Bids this close to the end push the end back by as much; zero disables
    pub extension_window: chrono::Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bid_retry_limit: DEFAULT_BID_RETRY_LIMIT,
            extension_window: chrono::Duration::seconds(DEFAULT_AUCTION_EXTENSION_SECS as i64),
        }
    }
}

impl Config {
    /// Read the configuration from `EVM_*` environment variables
    ///
    /// Unset variables fall back to their defaults; malformed ones are an error.
    pub fn from_env_or_default() -> Result<Self> {
        let http_addr = env_or("EVM_HTTP_ADDR", DEFAULT_HTTP_ADDR.to_owned())?
            .parse()
            .context("EVM_HTTP_ADDR is not a socket address")?;
        let database_url = env::var("EVM_DATABASE_URL").ok().filter(|s| !s.is_empty());
        if database_url.is_none() {
            warn!("EVM_DATABASE_URL is not set, data will be kept in memory only");
        }
        Ok(Self {
            http_addr,
            database_url,
            db_pool_size: env_or("EVM_DB_POOL_SIZE", DEFAULT_DB_POOL_SIZE)?,
            commission: CommissionPolicy {
                rate_bps: env_or("EVM_COMMISSION_RATE_BPS", DEFAULT_COMMISSION_RATE_BPS)?,
                min_fee: env_or("EVM_COMMISSION_MIN_FEE", DEFAULT_COMMISSION_MIN_FEE)?,
            },
            scheduler_tick: Duration::from_millis(env_or(
                "EVM_SCHEDULER_TICK_MS",
                DEFAULT_SCHEDULER_TICK_MS,
            )?),
            engine: EngineConfig {
                bid_retry_limit: env_or("EVM_BID_RETRY_LIMIT", DEFAULT_BID_RETRY_LIMIT)?,
                extension_window: extension_window(env_or(
                    "EVM_AUCTION_EXTENSION_SECS",
                    DEFAULT_AUCTION_EXTENSION_SECS,
                )?)?,
            },
            event_poll_interval: Duration::from_millis(env_or(
                "EVM_EVENT_POLL_MS",
                DEFAULT_EVENT_POLL_MS,
            )?),
        })
    }
}

pub(crate) fn extension_window(secs: u64) -> Result<chrono::Duration> {
    if MAX_AUCTION_EXTENSION_SECS < secs {
        return Err(format_err!(
            "EVM_AUCTION_EXTENSION_SECS cannot exceed {MAX_AUCTION_EXTENSION_SECS}, got {secs}"
        ));
    }
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or_else(|| format_err!("EVM_AUCTION_EXTENSION_SECS is out of range: {secs}"))
}

fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr + Display,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{name} has an invalid value: {value}")),
        Err(_) => {
            warn!("{name} is not set, using the default: {default}");
            Ok(default)
        }
    }
}
