//! Replays newline-delimited JSON events through the consumer loop into the
//! store.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rowbridge::bus::{Event, InMemoryQueue, Publisher};
use rowbridge::health::HealthCheck;
use rowbridge::service::{ConsumerStats, ConsumerThread};
use rowbridge::store::ConnectionPool;
use rowbridge::submission::{self, SubmissionStore};
use rowbridge::BridgeConfig;

#[derive(Parser, Debug)]
#[command(author, version, about = "Replay submission events into the legacy store")]
struct Args {
    /// File of newline-delimited JSON events; reads stdin when omitted
    #[arg(long)]
    input: Option<PathBuf>,
    /// How long to wait for the consumer to settle every event
    #[arg(long, default_value_t = 30_000)]
    drain_timeout_ms: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("rowbridge=info,warn")),
        )
        .init();

    let config = BridgeConfig::from_env().context("loading configuration")?;
    info!(
        database = %config.store.identity.database,
        topics = ?config.topics,
        "starting rowbridge"
    );

    let pool = ConnectionPool::open(config.store.clone()).context("opening connection pool")?;
    submission::bootstrap(
        &pool,
        &config.upload_sequence,
        &config.submission_sequence,
        config.block_size,
    )
    .context("bootstrapping schema")?;

    let service = Arc::new(submission::service(SubmissionStore::new(
        pool.clone(),
        config.upload_sequence.clone(),
        config.submission_sequence.clone(),
    )));

    let queue = InMemoryQueue::new();
    let subscriber = queue.subscribe(config.topics.clone());
    let consumer = ConsumerThread::spawn(
        service,
        subscriber,
        queue.clone(),
        config.consumer.clone(),
    );

    let health = HealthCheck::new(pool.clone()).with_consumer(consumer.probe(), config.topics.clone());
    #[cfg(feature = "http")]
    spawn_health_server(health.clone(), config.health_addr);

    let published = publish_input(&queue, args.input.as_ref(), &config.topics)?;
    info!(published, "input published");

    let deadline = Instant::now() + Duration::from_millis(args.drain_timeout_ms);
    while !drained(&queue, &config.topics, &consumer.stats()) {
        if Instant::now() >= deadline {
            warn!("drain timeout reached with events still pending");
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }

    let report = health.check();
    let stats = consumer.stop();
    info!(
        handled = stats.handled,
        skipped = stats.skipped,
        retried = stats.retried,
        dead_lettered = stats.dead_lettered,
        failed = stats.failed,
        database_ok = report.database,
        "replay finished"
    );
    println!(
        "handled={} skipped={} retried={} dead_lettered={} failed={}",
        stats.handled, stats.skipped, stats.retried, stats.dead_lettered, stats.failed
    );
    Ok(())
}

fn publish_input(queue: &InMemoryQueue, input: Option<&PathBuf>, topics: &[String]) -> Result<usize> {
    let reader: Box<dyn BufRead> = match input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("opening {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let fallback_topic = topics.first().cloned().unwrap_or_default();
    let mut published = 0;
    for (index, line) in reader.lines().enumerate() {
        let line = line.context("reading input")?;
        if line.trim().is_empty() {
            continue;
        }
        // Route by the envelope's own topic; unparseable lines still go
        // through the consumer so they are counted as skipped.
        let topic = serde_json::from_str::<serde_json::Value>(&line)
            .ok()
            .and_then(|value| value.get("topic")?.as_str().map(String::from))
            .unwrap_or_else(|| fallback_topic.clone());
        queue
            .publish(Event::with_string_payload(format!("line-{}", index + 1), topic, line))
            .context("publishing event")?;
        published += 1;
    }
    Ok(published)
}

/// Every event on a consumed topic has an outcome.
fn drained(queue: &InMemoryQueue, topics: &[String], stats: &ConsumerStats) -> bool {
    let consumed = queue
        .events()
        .iter()
        .filter(|event| topics.contains(&event.topic))
        .count();
    let settled =
        stats.handled + stats.skipped + stats.retried + stats.dead_lettered + stats.failed;
    settled >= consumed
}

#[cfg(feature = "http")]
fn spawn_health_server(health: HealthCheck, addr: std::net::SocketAddr) {
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                warn!(error = %err, "failed to start health runtime");
                return;
            }
        };
        let addr = addr.to_string();
        info!(addr = %addr, "health endpoint listening");
        if let Err(err) = runtime.block_on(rowbridge::health::serve(Arc::new(health), &addr)) {
            warn!(error = %err, "health endpoint stopped");
        }
    });
}
