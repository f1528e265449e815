//! Startup configuration read from `ROWBRIDGE_*` environment variables.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::service::ConsumerConfig;
use crate::store::{ConnectionIdentity, PoolConfig, StoreConfig};
use crate::submission::{CREATE_TOPIC, DELETE_TOPIC, URL_UPDATE_TOPIC};

const PREFIX: &str = "ROWBRIDGE_";

/// Everything the bridge binary needs to start.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub store: StoreConfig,
    pub upload_sequence: String,
    pub submission_sequence: String,
    /// Block size written when a sequence row is first created.
    pub block_size: i64,
    pub topics: Vec<String>,
    pub consumer: ConsumerConfig,
    pub health_addr: SocketAddr,
}

impl BridgeConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from any variable source. `lookup` receives
    /// the full variable name, prefix included.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{PREFIX}{name}"));

        let mut identity =
            ConnectionIdentity::new(var("DB_PATH").unwrap_or_else(|| "rowbridge.db".to_string()));
        identity.username = var("DB_USERNAME");
        identity.password = var("DB_PASSWORD");

        let defaults = PoolConfig::default();
        let pool = PoolConfig {
            min_idle: parse("POOL_MIN", var("POOL_MIN"), defaults.min_idle)?,
            max_size: parse("POOL_MAX", var("POOL_MAX"), defaults.max_size)?,
            acquire_timeout: parse_millis(
                "POOL_ACQUIRE_TIMEOUT_MS",
                var("POOL_ACQUIRE_TIMEOUT_MS"),
                defaults.acquire_timeout,
            )?,
            busy_timeout: parse_millis(
                "DB_BUSY_TIMEOUT_MS",
                var("DB_BUSY_TIMEOUT_MS"),
                defaults.busy_timeout,
            )?,
            begin_mode: defaults.begin_mode,
            redact_values: parse_bool("REDACT_VALUES", var("REDACT_VALUES"), defaults.redact_values)?,
        };

        let block_size = parse("ID_BLOCK_SIZE", var("ID_BLOCK_SIZE"), 100i64)?;
        if block_size <= 0 {
            return Err(Error::Config(format!(
                "{PREFIX}ID_BLOCK_SIZE must be positive, found {block_size}"
            )));
        }

        let topics = match var("TOPICS") {
            Some(raw) => split_list(&raw),
            None => vec![
                CREATE_TOPIC.to_string(),
                DELETE_TOPIC.to_string(),
                URL_UPDATE_TOPIC.to_string(),
            ],
        };
        if topics.is_empty() {
            return Err(Error::Config(format!("{PREFIX}TOPICS is empty")));
        }

        let max_attempts = parse("MAX_ATTEMPTS", var("MAX_ATTEMPTS"), 3u32)?.max(1);
        let error_topic = match var("ERROR_TOPIC") {
            Some(raw) if raw.trim().is_empty() => None,
            Some(raw) => Some(raw.trim().to_string()),
            None => Some("rowbridge.error".to_string()),
        };
        let consumer = ConsumerConfig {
            poll_interval: parse_millis(
                "POLL_INTERVAL_MS",
                var("POLL_INTERVAL_MS"),
                Duration::from_millis(50),
            )?,
            max_attempts,
            error_topic,
        };

        let health_addr = parse(
            "HEALTH_ADDR",
            Some(var("HEALTH_ADDR").unwrap_or_else(|| "127.0.0.1:3000".to_string())),
            SocketAddr::from(([127, 0, 0, 1], 3000)),
        )?;

        Ok(Self {
            store: StoreConfig { identity, pool },
            upload_sequence: var("ID_SEQ_UPLOAD").unwrap_or_else(|| "upload_id_seq".to_string()),
            submission_sequence: var("ID_SEQ_SUBMISSION")
                .unwrap_or_else(|| "submission_id_seq".to_string()),
            block_size,
            topics,
            consumer,
            health_addr,
        })
    }
}

/// Parses an optional value with fallback default.
fn parse<T>(name: &str, value: Option<String>, default_value: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|err| Error::Config(format!("invalid {PREFIX}{name} value {raw:?}: {err}"))),
        None => Ok(default_value),
    }
}

fn parse_millis(name: &str, value: Option<String>, default_value: Duration) -> Result<Duration> {
    let millis = parse(name, value, default_value.as_millis() as u64)?;
    Ok(Duration::from_millis(millis))
}

fn parse_bool(name: &str, value: Option<String>, default_value: bool) -> Result<bool> {
    match value.as_deref().map(str::trim) {
        None => Ok(default_value),
        Some("1") | Some("true") | Some("yes") | Some("on") => Ok(true),
        Some("0") | Some("false") | Some("no") | Some("off") => Ok(false),
        Some(raw) => Err(Error::Config(format!(
            "invalid {PREFIX}{name} value {raw:?}: expected a boolean"
        ))),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}
