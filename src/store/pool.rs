use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::{debug, info, warn};

use super::context::TxContext;
use crate::error::{Error, Result};

pub(crate) type Connection = PooledConnection<SqliteConnectionManager>;

/// The inputs that decide whether two pools can share connections.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ConnectionIdentity {
    /// Path of the database file (or `:memory:`).
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ConnectionIdentity {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            username: None,
            password: None,
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }
}

impl fmt::Debug for ConnectionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionIdentity")
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Statement used to open a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginMode {
    Deferred,
    /// Takes the write lock up front, so a read-then-update cannot be
    /// interleaved with another writer.
    Immediate,
    Exclusive,
}

impl BeginMode {
    pub(crate) fn statement(self) -> &'static str {
        match self {
            BeginMode::Deferred => "BEGIN DEFERRED",
            BeginMode::Immediate => "BEGIN IMMEDIATE",
            BeginMode::Exclusive => "BEGIN EXCLUSIVE",
        }
    }
}

/// Pool sizing and per-connection behavior.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub min_idle: u32,
    pub max_size: u32,
    /// How long `begin` waits for a free connection.
    pub acquire_timeout: Duration,
    /// How long a statement waits on a locked database file.
    pub busy_timeout: Duration,
    pub begin_mode: BeginMode,
    /// Keep bound values out of logs and error reports.
    pub redact_values: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_idle: 0,
            max_size: 10,
            acquire_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
            begin_mode: BeginMode::Immediate,
            redact_values: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub identity: ConnectionIdentity,
    pub pool: PoolConfig,
}

impl StoreConfig {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            identity: ConnectionIdentity::new(database),
            pool: PoolConfig::default(),
        }
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.pool.max_size == 0 {
            return Err(Error::Config("pool max_size must be at least 1".into()));
        }
        if self.pool.min_idle > self.pool.max_size {
            return Err(Error::Config(format!(
                "pool min_idle ({}) exceeds max_size ({})",
                self.pool.min_idle, self.pool.max_size
            )));
        }
        if self.identity.database.is_empty() {
            return Err(Error::Config("database path is empty".into()));
        }
        Ok(())
    }
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolState {
    pub connections: u32,
    pub idle_connections: u32,
}

struct PoolInfo {
    identity: ConnectionIdentity,
    config: PoolConfig,
}

/// A bounded set of connections to one store.
///
/// Cloning is cheap and yields another handle to the same connections.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Pool<SqliteConnectionManager>,
    info: Arc<PoolInfo>,
}

impl ConnectionPool {
    /// Open a pool. Blocks until `min_idle` connections are established.
    pub fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let StoreConfig { identity, pool } = config;

        if identity.database == ":memory:" && pool.max_size > 1 {
            warn!(
                max_size = pool.max_size,
                "every pooled :memory: connection opens a separate database"
            );
        }

        let busy_timeout = pool.busy_timeout;
        let manager = SqliteConnectionManager::file(&identity.database)
            .with_init(move |conn| conn.busy_timeout(busy_timeout));

        let inner = Pool::builder()
            .min_idle(Some(pool.min_idle))
            .max_size(pool.max_size)
            .connection_timeout(pool.acquire_timeout)
            .build(manager)
            .map_err(|source| Error::ConnectionAcquisitionFailed {
                database: identity.database.clone(),
                source,
            })?;

        info!(
            database = %identity.database,
            min_idle = pool.min_idle,
            max_size = pool.max_size,
            "connection pool opened"
        );

        Ok(Self {
            inner,
            info: Arc::new(PoolInfo {
                identity,
                config: pool,
            }),
        })
    }

    pub fn identity(&self) -> &ConnectionIdentity {
        &self.info.identity
    }

    pub fn config(&self) -> &PoolConfig {
        &self.info.config
    }

    pub fn state(&self) -> PoolState {
        let state = self.inner.state();
        PoolState {
            connections: state.connections,
            idle_connections: state.idle_connections,
        }
    }

    /// A fresh, unopened transactional context on this pool.
    pub fn context(&self) -> TxContext {
        TxContext::new(self.clone())
    }

    /// Run `f` inside one transaction.
    ///
    /// Commits when `f` returns `Ok`, rolls back otherwise; the connection
    /// is released on every path.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut TxContext) -> Result<T>,
    {
        let mut ctx = self.context();
        let outcome = ctx.begin().and_then(|()| f(&mut ctx));
        let outcome = match outcome {
            Ok(value) => ctx.commit().map(|()| value),
            Err(err) => Err(err),
        };
        if outcome.is_err() {
            ctx.rollback();
        }
        ctx.end();
        outcome
    }

    pub(crate) fn acquire(&self) -> Result<Connection> {
        debug!(database = %self.info.identity.database, "acquiring connection");
        self.inner
            .get()
            .map_err(|source| Error::ConnectionAcquisitionFailed {
                database: self.info.identity.database.clone(),
                source,
            })
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("identity", &self.info.identity)
            .field("state", &self.state())
            .finish()
    }
}

/// Explicit cache of pools, one per [`ConnectionIdentity`].
///
/// Lazily opens a pool for an identity it has not seen and hands out clones
/// of the same pool for repeated lookups.
#[derive(Default)]
pub struct PoolRegistry {
    pools: Mutex<HashMap<ConnectionIdentity, ConnectionPool>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the pool for `config.identity`, opening it on first use.
    /// The pool settings of later calls for a known identity are ignored.
    pub fn get_or_open(&self, config: &StoreConfig) -> Result<ConnectionPool> {
        let mut pools = self
            .pools
            .lock()
            .map_err(|_| Error::Poisoned("pool registry lookup"))?;
        if let Some(pool) = pools.get(&config.identity) {
            debug!(database = %config.identity.database, "reusing connection pool");
            return Ok(pool.clone());
        }
        let pool = ConnectionPool::open(config.clone())?;
        pools.insert(config.identity.clone(), pool.clone());
        Ok(pool)
    }

    pub fn get(&self, identity: &ConnectionIdentity) -> Result<Option<ConnectionPool>> {
        let pools = self
            .pools
            .lock()
            .map_err(|_| Error::Poisoned("pool registry lookup"))?;
        Ok(pools.get(identity).cloned())
    }

    pub fn len(&self) -> usize {
        self.pools.lock().map(|pools| pools.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
