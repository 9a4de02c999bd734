//! Daemon configuration from SYNCQ_* environment variables

use anyhow::{bail, Context, Result};
use std::str::FromStr;
use std::time::Duration;
use syncq_api_rpc::DEFAULT_RPC_PORT;
use syncq_core::application::QueueConfig;
use syncq_core::port::MaintenanceConfig;

const DEFAULT_DB_PATH: &str = "~/.syncq/queue.db";
const DEFAULT_PROBE_TARGETS: &str = "1.1.1.1:443,8.8.8.8:53";
const DEFAULT_PROBE_INTERVAL_MS: u64 = 5_000;
const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_RETRY_INTERVAL_SECS: u64 = 60;
const DEFAULT_HTTP_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_RATE_LIMIT_BURST: u32 = 50;
const DEFAULT_RATE_LIMIT_RATE: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub db_path: String,
    pub rpc_port: u16,
    pub queue: QueueConfig,
    pub probe_targets: Vec<String>,
    pub probe_interval: Duration,
    /// None disables periodic retries while online
    pub retry_interval: Option<Duration>,
    pub http_timeout: Duration,
    pub maintenance: MaintenanceConfig,
    pub rate_limit_burst: u32,
    pub rate_limit_rate: u32,
    pub log_format: LogFormat,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any variable source
    ///
    /// Unset variables take defaults; set but unparsable ones are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = lookup("SYNCQ_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        let db_path = shellexpand::tilde(&db_path).into_owned();

        let defaults = QueueConfig::default();
        let operation_timeout_ms = parse_or(
            &lookup,
            "SYNCQ_OPERATION_TIMEOUT_MS",
            DEFAULT_OPERATION_TIMEOUT_MS,
        )?;
        let queue = QueueConfig {
            capacity: parse_or(&lookup, "SYNCQ_QUEUE_CAPACITY", defaults.capacity)?,
            max_attempts: parse_or(&lookup, "SYNCQ_MAX_ATTEMPTS", defaults.max_attempts)?,
            operation_timeout: (operation_timeout_ms > 0)
                .then(|| Duration::from_millis(operation_timeout_ms)),
            ..defaults
        };
        queue
            .validate()
            .context("Invalid queue configuration")?;

        let probe_targets = lookup("SYNCQ_PROBE_TARGETS")
            .unwrap_or_else(|| DEFAULT_PROBE_TARGETS.to_string())
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect();

        let retry_interval_secs =
            parse_or(&lookup, "SYNCQ_RETRY_INTERVAL_SECS", DEFAULT_RETRY_INTERVAL_SECS)?;

        let log_format = match lookup("SYNCQ_LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => bail!("SYNCQ_LOG_FORMAT must be 'json' or 'pretty', got '{}'", other),
        };

        let mut maintenance = MaintenanceConfig::default();
        maintenance.dead_letter_retention_days = parse_or(
            &lookup,
            "SYNCQ_DEAD_LETTER_RETENTION_DAYS",
            maintenance.dead_letter_retention_days,
        )?;

        Ok(Self {
            db_path,
            rpc_port: parse_or(&lookup, "SYNCQ_RPC_PORT", DEFAULT_RPC_PORT)?,
            queue,
            probe_targets,
            probe_interval: positive_millis(
                &lookup,
                "SYNCQ_PROBE_INTERVAL_MS",
                DEFAULT_PROBE_INTERVAL_MS,
            )?,
            retry_interval: (retry_interval_secs > 0)
                .then(|| Duration::from_secs(retry_interval_secs)),
            http_timeout: positive_millis(&lookup, "SYNCQ_HTTP_TIMEOUT_MS", DEFAULT_HTTP_TIMEOUT_MS)?,
            maintenance,
            rate_limit_burst: parse_or(&lookup, "SYNCQ_RATE_LIMIT_BURST", DEFAULT_RATE_LIMIT_BURST)?,
            rate_limit_rate: parse_or(&lookup, "SYNCQ_RATE_LIMIT_RATE", DEFAULT_RATE_LIMIT_RATE)?,
            log_format,
        })
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {}='{}': {}", key, raw, e)),
    }
}

/// Millisecond duration that must be non-zero
fn positive_millis<F>(lookup: &F, key: &str, default: u64) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let millis: u64 = parse_or(lookup, key, default)?;
    if millis == 0 {
        bail!("{} must be greater than 0", key);
    }
    Ok(Duration::from_millis(millis))
}
