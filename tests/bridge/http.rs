//! Health endpoint over HTTP.
//!
//! Starts an axum server and exercises it with reqwest.

use std::sync::Arc;

use rowbridge::bus::InMemoryQueue;
use rowbridge::health::{self, HealthCheck};
use rowbridge::service::{ConsumerConfig, ConsumerThread, EventService};

use crate::support::TestDb;

/// Bind to port 0 and return the actual address.
async fn start_server(check: HealthCheck) -> String {
    let app = health::router(Arc::new(check));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn healthy_store_returns_ok() {
    let db = TestDb::new();
    let base = start_server(HealthCheck::new(db.pool())).await;

    let resp = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(body["database"], true);
    assert!(body.get("consumer").is_none());
}

#[tokio::test]
async fn stopped_consumer_returns_unavailable() {
    let db = TestDb::new();
    let queue = InMemoryQueue::new();
    let consumer = ConsumerThread::spawn(
        Arc::new(EventService::new(())),
        queue.new_subscriber(),
        queue.clone(),
        ConsumerConfig::default(),
    );
    let check = HealthCheck::new(db.pool()).with_consumer(consumer.probe(), vec!["t".into()]);
    consumer.stop();

    let base = start_server(check).await;
    let resp = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(resp.status(), 503);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["ok"], false);
    assert_eq!(body["consumer"], false);
    assert_eq!(body["topics"], serde_json::json!(["t"]));
}
