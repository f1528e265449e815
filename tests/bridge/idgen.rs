//! Block allocator tests against a file-backed store.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rowbridge::idgen::{IdGenerator, IdGenerators};
use rowbridge::store::PoolConfig;
use rowbridge::Error;

use crate::support::{read_sequence, seed_sequence, TestDb};

// ============================================================================
// Uniqueness
// ============================================================================

#[test]
fn concurrent_callers_never_share_an_id() {
    let db = TestDb::new();
    let pool = db.pool_with(PoolConfig {
        max_size: 4,
        ..PoolConfig::default()
    });
    seed_sequence(&pool, "upload_id_seq", 1, 7);
    let generator = Arc::new(IdGenerator::new(pool.clone(), "upload_id_seq"));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let generator = Arc::clone(&generator);
            thread::spawn(move || {
                (0..50)
                    .map(|_| generator.next_id().unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut all = HashSet::new();
    for handle in handles {
        let ids = handle.join().unwrap();
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        for id in ids {
            assert!(all.insert(id), "id {} granted twice", id);
        }
    }
    assert_eq!(all.len(), 400);
    assert_eq!(*all.iter().min().unwrap(), 1);
    assert_eq!(*all.iter().max().unwrap(), 400);

    let stats = generator.stats().unwrap();
    assert_eq!(stats.granted, 400);
    // 400 ids in blocks of 7
    assert_eq!(stats.refills, 58);
}

#[test]
fn one_refill_per_block() {
    let db = TestDb::new();
    let pool = db.pool();
    seed_sequence(&pool, "s", 1, 5);
    let generator = IdGenerator::new(pool.clone(), "s");

    let first: Vec<i64> = (0..5).map(|_| generator.next_id().unwrap()).collect();
    assert_eq!(first, vec![1, 2, 3, 4, 5]);
    assert_eq!(generator.stats().unwrap().refills, 1);
    assert_eq!(read_sequence(&pool, "s").next_block_start, 6);

    assert_eq!(generator.next_id().unwrap(), 6);
    assert_eq!(generator.stats().unwrap().refills, 2);
    assert_eq!(read_sequence(&pool, "s").next_block_start, 11);
}

#[test]
fn separate_pools_draw_disjoint_blocks() {
    let db = TestDb::new();
    let first_pool = db.pool();
    let second_pool = db.pool();
    seed_sequence(&first_pool, "s", 100, 5);

    let a = IdGenerator::new(first_pool, "s");
    let b = IdGenerator::new(second_pool, "s");

    let mut from_a = HashSet::new();
    let mut from_b = HashSet::new();
    for _ in 0..12 {
        from_a.insert(a.next_id().unwrap());
        from_b.insert(b.next_id().unwrap());
    }

    assert_eq!(from_a.len(), 12);
    assert_eq!(from_b.len(), 12);
    assert!(from_a.is_disjoint(&from_b));
    assert!(from_a.contains(&100));
    assert!(from_b.contains(&105));
}

#[test]
fn registry_shares_one_generator_per_sequence() {
    let db = TestDb::new();
    let pool = db.pool();
    seed_sequence(&pool, "uploads", 1, 3);
    seed_sequence(&pool, "submissions", 1000, 3);
    let ids = IdGenerators::new(pool);

    assert_eq!(ids.next_id("uploads").unwrap(), 1);
    assert_eq!(ids.next_id("submissions").unwrap(), 1000);
    assert_eq!(ids.next_id("uploads").unwrap(), 2);
    assert!(Arc::ptr_eq(
        &ids.get("uploads").unwrap(),
        &ids.get("uploads").unwrap()
    ));

    let mut names = ids.sequences();
    names.sort();
    assert_eq!(names, vec!["submissions", "uploads"]);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn failed_refill_restores_window_and_row() {
    let db = TestDb::new();
    let pool = db.pool();
    seed_sequence(&pool, "s", 1, 2);
    let generator = IdGenerator::new(pool.clone(), "s");

    assert_eq!(generator.next_id().unwrap(), 1);
    assert_eq!(generator.next_id().unwrap(), 2);

    pool.transaction(|ctx| {
        ctx.execute_batch(
            "create trigger block_advance before update on id_sequences
             begin select raise(abort, 'sequence frozen'); end;",
        )
    })
    .unwrap();

    for _ in 0..2 {
        let err = generator.next_id().unwrap_err();
        assert!(
            matches!(err, Error::QueryExecutionFailed { .. }),
            "unexpected error: {err}"
        );
    }
    assert_eq!(read_sequence(&pool, "s").next_block_start, 3);
    assert_eq!(generator.stats().unwrap().granted, 2);

    pool.transaction(|ctx| ctx.execute_batch("drop trigger block_advance"))
        .unwrap();

    assert_eq!(generator.next_id().unwrap(), 3);
    assert_eq!(generator.next_id().unwrap(), 4);
    assert_eq!(read_sequence(&pool, "s").next_block_start, 5);
    assert_eq!(generator.stats().unwrap().refills, 2);
}

#[test]
fn missing_sequence_is_reported() {
    let db = TestDb::new();
    let pool = db.pool();
    seed_sequence(&pool, "present", 1, 5);
    let generator = IdGenerator::new(pool, "absent");

    let err = generator.next_id().unwrap_err();
    assert!(matches!(err, Error::SequenceNotFound(ref name) if name == "absent"));
}

#[test]
fn non_positive_block_size_fails_refill() {
    let db = TestDb::new();
    let pool = db.pool();
    seed_sequence(&pool, "zero", 1, 0);
    seed_sequence(&pool, "negative", 1, -3);

    for name in ["zero", "negative"] {
        let generator = IdGenerator::new(pool.clone(), name);
        let err = generator.next_id().unwrap_err();
        assert!(matches!(err, Error::RefillFailed { .. }), "{name}: {err}");
        assert_eq!(read_sequence(&pool, name).next_block_start, 1);
    }
}

#[test]
fn unreachable_store_fails_refill_and_recovers() {
    let db = TestDb::new();
    let pool = db.pool_with(PoolConfig {
        max_size: 1,
        acquire_timeout: Duration::from_millis(50),
        ..PoolConfig::default()
    });
    seed_sequence(&pool, "s", 1, 5);
    let generator = IdGenerator::new(pool.clone(), "s");

    let mut held = pool.context();
    held.begin().unwrap();
    let err = generator.next_id().unwrap_err();
    assert!(
        matches!(err, Error::RefillFailed { ref sequence, .. } if sequence == "s"),
        "unexpected error: {err}"
    );
    held.end();

    assert_eq!(generator.next_id().unwrap(), 1);
    assert_eq!(generator.next_id().unwrap(), 2);
    assert_eq!(generator.stats().unwrap().refills, 1);
}

#[test]
fn block_start_at_integer_floor_fails_refill() {
    let db = TestDb::new();
    let pool = db.pool();
    seed_sequence(&pool, "floor", i64::MIN, 5);
    let generator = IdGenerator::new(pool.clone(), "floor");

    let err = generator.next_id().unwrap_err();
    assert!(matches!(err, Error::RefillFailed { .. }), "{err}");
    assert_eq!(read_sequence(&pool, "floor").next_block_start, i64::MIN);
    assert_eq!(generator.stats().unwrap().granted, 0);
}
