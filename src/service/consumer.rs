//! Background consumer loop.
//!
//! `ConsumerThread` polls a subscriber, decodes and validates each event,
//! dispatches it to an `EventService`, and acknowledges it only once the
//! handler succeeded. Failed events are republished with an incremented
//! attempt counter until `max_attempts` is reached, then forwarded to the
//! error topic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::envelope::EventEnvelope;
use super::error::HandlerError;
use super::event_service::EventService;
use crate::bus::{Event, Publisher, Subscriber};

/// Retry and polling policy for the consumer loop.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// How long one poll blocks waiting for an event.
    pub poll_interval: Duration,
    /// Total deliveries allowed per event, including the first.
    pub max_attempts: u32,
    /// Where events go once they can no longer be retried. Without one they
    /// are rejected on the subscriber.
    pub error_topic: Option<String>,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            max_attempts: 3,
            error_topic: None,
        }
    }
}

/// Statistics from the consumer loop.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Events handled and acknowledged.
    pub handled: usize,
    /// Events that could not be retried or forwarded and were rejected.
    pub failed: usize,
    /// Events republished for another attempt.
    pub retried: usize,
    /// Events forwarded to the error topic.
    pub dead_lettered: usize,
    /// Empty, malformed or misrouted events acknowledged without handling.
    pub skipped: usize,
    /// Number of poll cycles completed.
    pub polls: usize,
}

/// What happened to one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Handled,
    Skipped(String),
    Retried { attempt: u32 },
    DeadLettered,
    Failed(String),
}

impl ConsumerStats {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Handled => self.handled += 1,
            Outcome::Skipped(_) => self.skipped += 1,
            Outcome::Retried { .. } => self.retried += 1,
            Outcome::DeadLettered => self.dead_lettered += 1,
            Outcome::Failed(_) => self.failed += 1,
        }
    }
}

/// Decode, dispatch and settle a single event.
///
/// The event is acknowledged when it was handled, skipped, republished or
/// forwarded; it is rejected only when none of that was possible.
pub fn process_event<R, S, P>(
    service: &EventService<R>,
    subscriber: &S,
    publisher: &P,
    config: &ConsumerConfig,
    event: &Event,
) -> Outcome
where
    R: Send + Sync + 'static,
    S: Subscriber + ?Sized,
    P: Publisher + ?Sized,
{
    let outcome = match EventEnvelope::decode(event) {
        Err(err) => {
            warn!(event_id = %event.id, topic = %event.topic, error = %err, "skipped invalid event");
            Outcome::Skipped(err.to_string())
        }
        Ok(envelope) if envelope.topic != event.topic => {
            warn!(
                event_id = %event.id,
                topic = %event.topic,
                envelope_topic = %envelope.topic,
                "skipped event whose topic does not match its envelope"
            );
            Outcome::Skipped(format!("envelope topic {} != {}", envelope.topic, event.topic))
        }
        Ok(envelope) => match service.handle(&envelope) {
            Ok(()) => {
                debug!(event_id = %event.id, topic = %event.topic, "event handled");
                Outcome::Handled
            }
            Err(HandlerError::UnknownTopic(topic)) => {
                warn!(event_id = %event.id, topic = %topic, "skipped event without handler");
                Outcome::Skipped(format!("no handler for {}", topic))
            }
            Err(err) => {
                error!(
                    event_id = %event.id,
                    topic = %event.topic,
                    attempt = event.attempt,
                    error = %err,
                    "failed to handle event"
                );
                return settle_failure(subscriber, publisher, config, event, &err);
            }
        },
    };

    if let Err(err) = subscriber.ack(&event.id) {
        error!(event_id = %event.id, error = %err, "failed to acknowledge event");
    }
    outcome
}

fn settle_failure<S, P>(
    subscriber: &S,
    publisher: &P,
    config: &ConsumerConfig,
    event: &Event,
    cause: &HandlerError,
) -> Outcome
where
    S: Subscriber + ?Sized,
    P: Publisher + ?Sized,
{
    let reason = cause.to_string();
    let (next, outcome) = if cause.is_retryable() && event.attempt < config.max_attempts {
        let next = event.next_attempt();
        let attempt = next.attempt;
        (Some(next), Outcome::Retried { attempt })
    } else if let Some(topic) = &config.error_topic {
        (Some(event.forwarded(topic, &reason)), Outcome::DeadLettered)
    } else {
        (None, Outcome::Failed(reason.clone()))
    };

    let published = match next {
        Some(next) => {
            let target = next.topic.clone();
            match publisher.publish(next) {
                Ok(()) => {
                    info!(event_id = %event.id, topic = %target, "event republished");
                    true
                }
                Err(err) => {
                    error!(event_id = %event.id, topic = %target, error = %err, "failed to republish event");
                    false
                }
            }
        }
        None => false,
    };

    if published {
        if let Err(err) = subscriber.ack(&event.id) {
            error!(event_id = %event.id, error = %err, "failed to acknowledge event");
        }
        outcome
    } else {
        if let Err(err) = subscriber.nack(&event.id, &reason) {
            error!(event_id = %event.id, error = %err, "failed to reject event");
        }
        Outcome::Failed(reason)
    }
}

/// Shared liveness flag of a running consumer, for health checks.
#[derive(Clone, Debug)]
pub struct ConsumerProbe {
    alive: Arc<AtomicBool>,
}

impl ConsumerProbe {
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

/// A background thread that polls a subscriber and dispatches events to an
/// `EventService`.
///
/// ## Example
///
/// ```ignore
/// let queue = InMemoryQueue::new();
/// let consumer = ConsumerThread::spawn(
///     Arc::new(service),
///     queue.subscribe(["submission.notification.create"]),
///     queue.clone(),
///     ConsumerConfig::default(),
/// );
/// // ... publish events ...
/// let stats = consumer.stop();
/// ```
pub struct ConsumerThread {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<ConsumerStats>>,
    stats: Arc<Mutex<ConsumerStats>>,
    alive: Arc<AtomicBool>,
}

impl ConsumerThread {
    pub fn spawn<R, S, P>(
        service: Arc<EventService<R>>,
        subscriber: S,
        publisher: P,
        config: ConsumerConfig,
    ) -> Self
    where
        R: Send + Sync + 'static,
        S: Subscriber + 'static,
        P: Publisher + 'static,
    {
        let (stop_tx, stop_rx) = channel();
        let stats = Arc::new(Mutex::new(ConsumerStats::default()));
        let alive = Arc::new(AtomicBool::new(true));
        let shared_stats = Arc::clone(&stats);
        let shared_alive = Arc::clone(&alive);

        let handle = thread::spawn(move || {
            let _alive = AliveGuard(shared_alive);
            info!(topics = ?service.topics(), "consumer started");
            let mut local = ConsumerStats::default();
            let poll_ms = config.poll_interval.as_millis() as u64;

            loop {
                match stop_rx.try_recv() {
                    Ok(()) | Err(TryRecvError::Disconnected) => break,
                    Err(TryRecvError::Empty) => {}
                }

                local.polls += 1;

                match subscriber.poll(poll_ms) {
                    Ok(Some(event)) => {
                        let outcome =
                            process_event(&*service, &subscriber, &publisher, &config, &event);
                        local.record(&outcome);
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(error = %err, "poll failed");
                        thread::sleep(config.poll_interval);
                    }
                }

                if let Ok(mut snapshot) = shared_stats.lock() {
                    *snapshot = local.clone();
                }
            }

            info!(handled = local.handled, failed = local.failed, "consumer stopped");
            local
        });

        Self {
            stop_tx,
            handle: Some(handle),
            stats,
            alive,
        }
    }

    /// Statistics as of the last completed poll cycle.
    pub fn stats(&self) -> ConsumerStats {
        self.stats
            .lock()
            .map(|stats| stats.clone())
            .unwrap_or_default()
    }

    pub fn probe(&self) -> ConsumerProbe {
        ConsumerProbe {
            alive: Arc::clone(&self.alive),
        }
    }

    /// Signal the consumer to stop and wait for it to finish.
    /// Returns the final statistics, or the last snapshot if the thread
    /// panicked.
    pub fn stop(mut self) -> ConsumerStats {
        let _ = self.stop_tx.send(());
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                error!("consumer thread panicked");
                self.stats()
            }),
            None => self.stats(),
        }
    }

    /// Signal the consumer to stop without waiting.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(());
    }
}

/// Clears the liveness flag when the consumer thread exits, unwinding
/// included.
struct AliveGuard(Arc<AtomicBool>);

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Drop for ConsumerThread {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
    }
}
