//! Liveness checks over the store and the consumer loop.
//!
//! With the `http` feature, `router` / `serve` expose them as
//! `GET /health`.

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::{router, serve};

use serde::Serialize;
use tracing::warn;

use crate::error::{Error, Result};
use crate::service::ConsumerProbe;
use crate::store::ConnectionPool;

/// Result of one health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub ok: bool,
    pub database: bool,
    /// `None` when no consumer is attached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumer: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<String>,
}

/// Checks the pool (acquire + `select 1`) and, when attached, the consumer.
#[derive(Debug, Clone)]
pub struct HealthCheck {
    pool: ConnectionPool,
    consumer: Option<ConsumerProbe>,
    topics: Vec<String>,
}

impl HealthCheck {
    pub fn new(pool: ConnectionPool) -> Self {
        Self {
            pool,
            consumer: None,
            topics: Vec::new(),
        }
    }

    pub fn with_consumer(mut self, probe: ConsumerProbe, topics: Vec<String>) -> Self {
        self.consumer = Some(probe);
        self.topics = topics;
        self
    }

    pub fn check(&self) -> HealthReport {
        let database = match self.ping() {
            Ok(value) => value == 1,
            Err(err) => {
                warn!(error = %err, "database health check failed");
                false
            }
        };
        let consumer = self.consumer.as_ref().map(ConsumerProbe::is_alive);

        HealthReport {
            ok: database && consumer.unwrap_or(true),
            database,
            consumer,
            topics: self.topics.clone(),
        }
    }

    /// `select 1` on a bare pooled connection. No transaction is opened, so
    /// the check never takes the write lock.
    fn ping(&self) -> Result<i64> {
        let conn = self.pool.acquire()?;
        conn.query_row("select 1", [], |row| row.get(0))
            .map_err(|source| Error::QueryExecutionFailed {
                statement: "select 1".to_string(),
                values: None,
                source,
            })
    }
}
