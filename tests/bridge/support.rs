//! Shared fixtures: temporary databases, seeded sequences, event envelopes.

use std::thread;
use std::time::{Duration, Instant};

use rowbridge::bus::Event;
use rowbridge::idgen::IdSequence;
use rowbridge::store::{ConnectionPool, PoolConfig, StoreConfig};
use serde_json::{json, Value};
use tempfile::TempDir;

pub struct TestDb {
    // Keeps the directory alive for the test's duration.
    _dir: TempDir,
    pub path: String,
}

impl TestDb {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.db").to_string_lossy().into_owned();
        Self { _dir: dir, path }
    }

    pub fn pool(&self) -> ConnectionPool {
        self.pool_with(PoolConfig::default())
    }

    pub fn pool_with(&self, pool: PoolConfig) -> ConnectionPool {
        ConnectionPool::open(StoreConfig::new(self.path.as_str()).with_pool(pool)).unwrap()
    }
}

pub fn seed_sequence(pool: &ConnectionPool, name: &str, start: i64, block_size: i64) {
    pool.transaction(|ctx| {
        IdSequence::create_table(ctx)?;
        IdSequence::install(ctx, name, start, block_size)
    })
    .unwrap();
}

pub fn read_sequence(pool: &ConnectionPool, name: &str) -> IdSequence {
    pool.transaction(|ctx| IdSequence::load(ctx, name)).unwrap()
}

pub fn scalar(pool: &ConnectionPool, sql: &str) -> i64 {
    let rows = pool.transaction(|ctx| ctx.query(sql, None)).unwrap();
    rows[0][0].as_i64().unwrap()
}

pub fn envelope(topic: &str, payload: Value) -> Value {
    json!({
        "topic": topic,
        "originator": "submission-api",
        "timestamp": "2018-02-16T00:00:00",
        "mime-type": "application/json",
        "payload": payload
    })
}

pub fn event(id: &str, topic: &str, payload: Value) -> Event {
    Event::json(id, topic, &envelope(topic, payload)).unwrap()
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
