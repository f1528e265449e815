//! Transactional context lifecycle against a single-connection pool.

use std::thread;
use std::time::Duration;

use rowbridge::sql::{Params, SqlValue};
use rowbridge::store::{PoolConfig, PoolRegistry, StoreConfig, TxState};
use rowbridge::Error;

use crate::support::TestDb;

fn single_connection() -> PoolConfig {
    PoolConfig {
        max_size: 1,
        acquire_timeout: Duration::from_millis(200),
        ..PoolConfig::default()
    }
}

#[test]
fn failed_query_then_rollback_releases_the_connection() {
    let db = TestDb::new();
    let pool = db.pool_with(single_connection());
    pool.transaction(|ctx| ctx.execute_batch("create table t (id integer primary key)"))
        .unwrap();

    let mut ctx = pool.context();
    ctx.begin().unwrap();
    ctx.query("insert into t (id) values (1)", None).unwrap();
    assert!(ctx.query("insert into nowhere values (1)", None).is_err());
    ctx.rollback();
    ctx.end();
    assert_eq!(ctx.state(), TxState::Ended);

    let mut fresh = pool.context();
    fresh.begin().unwrap();
    let rows = fresh.query("select count(*) from t", None).unwrap();
    assert_eq!(rows, vec![vec![SqlValue::Integer(0)]]);
    fresh.commit().unwrap();
    fresh.end();
}

#[test]
fn exhausted_pool_times_out() {
    let db = TestDb::new();
    let pool = db.pool_with(single_connection());

    let mut holder = pool.context();
    holder.begin().unwrap();

    let mut waiter = pool.context();
    let err = waiter.begin().unwrap_err();
    assert!(matches!(err, Error::ConnectionAcquisitionFailed { .. }));
    assert_eq!(waiter.state(), TxState::Aborted);
    waiter.rollback();
    waiter.end();

    holder.commit().unwrap();
    holder.end();
    assert_eq!(pool.state().idle_connections, pool.state().connections);
}

#[test]
fn panicking_thread_returns_its_connection() {
    let db = TestDb::new();
    let pool = db.pool_with(single_connection());
    pool.transaction(|ctx| ctx.execute_batch("create table t (id integer primary key)"))
        .unwrap();

    let worker_pool = pool.clone();
    let result = thread::spawn(move || {
        let mut ctx = worker_pool.context();
        ctx.begin().unwrap();
        ctx.query("insert into t (id) values (7)", None).unwrap();
        panic!("worker died mid-transaction");
    })
    .join();
    assert!(result.is_err());

    let rows = pool
        .transaction(|ctx| ctx.query("select count(*) from t", None))
        .unwrap();
    assert_eq!(rows, vec![vec![SqlValue::Integer(0)]]);
}

#[test]
fn unredacted_pool_reports_bound_values() {
    let db = TestDb::new();
    let pool = db.pool_with(PoolConfig {
        redact_values: false,
        ..PoolConfig::default()
    });

    let err = pool
        .transaction(|ctx| {
            ctx.query(
                "select * from missing where id = @id@ and name = @name@",
                Some(&Params::new().bind("id", 3).bind("name", "x")),
            )
        })
        .unwrap_err();
    match err {
        Error::QueryExecutionFailed { values, .. } => {
            let values = values.expect("values are reported");
            assert!(values.contains('3'));
            assert!(values.contains('x'));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn registry_reuses_pools_per_identity() {
    let first = TestDb::new();
    let second = TestDb::new();
    let registry = PoolRegistry::new();

    let a = registry.get_or_open(&StoreConfig::new(first.path.as_str())).unwrap();
    let b = registry.get_or_open(&StoreConfig::new(first.path.as_str())).unwrap();
    let c = registry.get_or_open(&StoreConfig::new(second.path.as_str())).unwrap();

    assert_eq!(registry.len(), 2);
    assert_eq!(a.identity(), b.identity());
    assert_ne!(a.identity(), c.identity());

    a.transaction(|ctx| ctx.execute_batch("create table shared (x integer)"))
        .unwrap();
    b.transaction(|ctx| ctx.query("insert into shared (x) values (1)", None))
        .unwrap();
}
