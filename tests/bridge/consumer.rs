//! Consumer loop end to end: queue → submission handlers → SQLite.

use std::sync::Arc;
use std::time::Duration;

use rowbridge::bus::{Event, InMemoryQueue, Publisher, ERROR_HEADER};
use rowbridge::service::{ConsumerConfig, ConsumerStats, ConsumerThread};
use rowbridge::submission::{self, SubmissionStore, CREATE_TOPIC, DELETE_TOPIC, URL_UPDATE_TOPIC};
use serde_json::json;

use crate::support::{event, scalar, wait_until, TestDb};

fn topics() -> Vec<&'static str> {
    vec![CREATE_TOPIC, DELETE_TOPIC, URL_UPDATE_TOPIC]
}

fn config() -> ConsumerConfig {
    ConsumerConfig {
        poll_interval: Duration::from_millis(5),
        max_attempts: 3,
        error_topic: Some("rowbridge.error".into()),
    }
}

fn settled(stats: &ConsumerStats) -> usize {
    stats.handled + stats.skipped + stats.retried + stats.dead_lettered + stats.failed
}

fn new_submission(id: &str, resource_id: i64) -> Event {
    event(
        id,
        CREATE_TOPIC,
        json!({
            "id": id,
            "challengeId": 30005521,
            "memberId": 124916,
            "resourceId": resource_id,
            "submissionPhaseId": 95245,
            "url": format!("https://example.com/{id}.zip"),
            "type": "Contest Submission",
            "created": "2018-02-16T00:00:00"
        }),
    )
}

#[test]
fn replays_submission_lifecycle_into_store() {
    let db = TestDb::new();
    let pool = db.pool();
    submission::bootstrap(&pool, "upload_id_seq", "submission_id_seq", 2).unwrap();
    let service = submission::service(SubmissionStore::new(
        pool.clone(),
        "upload_id_seq",
        "submission_id_seq",
    ));

    let queue = InMemoryQueue::new();
    let consumer = ConsumerThread::spawn(
        Arc::new(service),
        queue.subscribe(topics()),
        queue.clone(),
        config(),
    );

    queue
        .publish_batch(vec![
            new_submission("a", 1),
            new_submission("b", 1),
            new_submission("c", 2),
            event(
                "u",
                URL_UPDATE_TOPIC,
                json!({ "legacySubmissionId": 3, "url": "https://example.com/c2.zip" }),
            ),
            event("d", DELETE_TOPIC, json!({ "legacySubmissionId": 3 })),
        ])
        .unwrap();

    assert!(wait_until(Duration::from_secs(10), || settled(&consumer.stats()) == 5));
    let stats = consumer.stop();
    assert_eq!(stats.handled, 5);
    assert_eq!(stats.failed, 0);

    assert_eq!(scalar(&pool, "select count(*) from upload"), 3);
    // "a" was superseded by "b" for resource 1, "c" was deleted
    assert_eq!(
        scalar(&pool, "select count(*) from submission where submission_status_id = 1"),
        1
    );
    assert_eq!(
        scalar(&pool, "select submission_id from submission where submission_status_id = 1"),
        2
    );
    let url = pool
        .transaction(|ctx| ctx.query("select url from upload where upload_id = 3", None))
        .unwrap();
    assert_eq!(url[0][0].as_str(), Some("https://example.com/c2.zip"));

    // Blocks of two: three ids per sequence need two refills each
    assert_eq!(
        scalar(&pool, "select next_block_start from id_sequences where name = 'upload_id_seq'"),
        5
    );
    assert_eq!(queue.acknowledged(), vec!["a", "b", "c", "u", "d"]);
}

#[test]
fn invalid_events_are_skipped_and_acknowledged() {
    let db = TestDb::new();
    let pool = db.pool();
    submission::bootstrap(&pool, "upload_id_seq", "submission_id_seq", 10).unwrap();
    let service = submission::service(SubmissionStore::new(
        pool.clone(),
        "upload_id_seq",
        "submission_id_seq",
    ));

    let queue = InMemoryQueue::new();
    let consumer = ConsumerThread::spawn(
        Arc::new(service),
        queue.subscribe(topics()),
        queue.clone(),
        config(),
    );

    let mut wrong_topic = new_submission("w", 1);
    wrong_topic.topic = DELETE_TOPIC.into();
    queue
        .publish_batch(vec![
            Event::new("empty", CREATE_TOPIC, Vec::new()),
            Event::with_string_payload("garbage", CREATE_TOPIC, "abc"),
            Event::with_string_payload("empty-json", CREATE_TOPIC, "{}"),
            wrong_topic,
            Event::with_string_payload("elsewhere", "different-topic", "message"),
        ])
        .unwrap();

    assert!(wait_until(Duration::from_secs(10), || consumer.stats().skipped == 4));
    let stats = consumer.stop();
    assert_eq!(stats.skipped, 4);
    assert_eq!(stats.handled, 0);
    assert_eq!(queue.acknowledged().len(), 4);
    assert_eq!(scalar(&pool, "select count(*) from upload"), 0);
}

#[test]
fn missing_submission_is_retried_then_dead_lettered() {
    let db = TestDb::new();
    let pool = db.pool();
    submission::bootstrap(&pool, "upload_id_seq", "submission_id_seq", 10).unwrap();
    let service = submission::service(SubmissionStore::new(
        pool.clone(),
        "upload_id_seq",
        "submission_id_seq",
    ));

    let queue = InMemoryQueue::new();
    let consumer = ConsumerThread::spawn(
        Arc::new(service),
        queue.subscribe(topics()),
        queue.clone(),
        config(),
    );

    queue
        .publish(event("d", DELETE_TOPIC, json!({ "legacySubmissionId": 42 })))
        .unwrap();

    assert!(wait_until(Duration::from_secs(10), || {
        consumer.stats().dead_lettered == 1
    }));
    let stats = consumer.stop();
    assert_eq!(stats.retried, 2);

    let attempts: Vec<String> = queue.events_on(DELETE_TOPIC).into_iter().map(|e| e.id).collect();
    assert_eq!(attempts, vec!["d", "d#2", "d#3"]);

    let dead = queue.events_on("rowbridge.error");
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].attempt, 3);
    assert!(dead[0].metadata_value(ERROR_HEADER).unwrap().contains("submission 42"));
}

#[test]
fn store_outage_fails_without_acknowledging() {
    let db = TestDb::new();
    let pool = db.pool();
    // No bootstrap: the sequence table does not exist
    let service = submission::service(SubmissionStore::new(
        pool.clone(),
        "upload_id_seq",
        "submission_id_seq",
    ));

    let queue = InMemoryQueue::new();
    let consumer = ConsumerThread::spawn(
        Arc::new(service),
        queue.subscribe(topics()),
        queue.clone(),
        ConsumerConfig {
            error_topic: None,
            max_attempts: 1,
            ..config()
        },
    );

    queue.publish(new_submission("a", 1)).unwrap();

    assert!(wait_until(Duration::from_secs(10), || consumer.stats().failed == 1));
    consumer.stop();
    assert!(queue.acknowledged().is_empty());
    assert_eq!(queue.rejected().len(), 1);
    assert_eq!(queue.rejected()[0].0, "a");
}
