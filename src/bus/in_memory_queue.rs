//! In-memory queue for testing and single-process scenarios.
//!
//! A thread-safe, topic-aware append-only log that implements both
//! `Publisher` and `Subscriber`. Each subscriber handle keeps its own read
//! position and topic filter, and records what it acknowledged.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use super::{Event, PublishError, Publisher, Subscriber};

/// In-memory queue for testing and single-process scenarios.
///
/// ```
/// use rowbridge::bus::{Event, InMemoryQueue, Publisher, Subscriber};
///
/// let queue = InMemoryQueue::new();
/// let submissions = queue.subscribe(["submission.created"]);
///
/// queue.publish(Event::with_string_payload("evt-1", "other.topic", "{}")).unwrap();
/// queue.publish(Event::with_string_payload("evt-2", "submission.created", "{}")).unwrap();
///
/// let event = submissions.poll(10).unwrap().unwrap();
/// assert_eq!(event.id, "evt-2");
/// ```
#[derive(Clone)]
pub struct InMemoryQueue {
    /// Shared event log
    log: Arc<RwLock<Vec<Event>>>,
    /// Topics this handle polls; empty means every topic
    topics: Arc<HashSet<String>>,
    /// Per-subscriber read position
    position: Arc<Mutex<usize>>,
    acked: Arc<Mutex<Vec<String>>>,
    nacked: Arc<Mutex<Vec<(String, String)>>>,
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryQueue {
    /// Create a new queue. This handle polls every topic.
    pub fn new() -> Self {
        Self::with_log(Arc::new(RwLock::new(Vec::new())), HashSet::new())
    }

    fn with_log(log: Arc<RwLock<Vec<Event>>>, topics: HashSet<String>) -> Self {
        Self {
            log,
            topics: Arc::new(topics),
            position: Arc::new(Mutex::new(0)),
            acked: Arc::new(Mutex::new(Vec::new())),
            nacked: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a subscriber over the same log, limited to `topics`, with its
    /// own position starting at the beginning.
    pub fn subscribe<I, S>(&self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_log(
            Arc::clone(&self.log),
            topics.into_iter().map(Into::into).collect(),
        )
    }

    /// Create a subscriber over the same log that sees every topic.
    pub fn new_subscriber(&self) -> Self {
        Self::with_log(Arc::clone(&self.log), HashSet::new())
    }

    /// Get all events in the log.
    pub fn events(&self) -> Vec<Event> {
        self.log.read().map(|log| log.clone()).unwrap_or_default()
    }

    /// All events published to `topic`, in order.
    pub fn events_on(&self, topic: &str) -> Vec<Event> {
        self.log
            .read()
            .map(|log| log.iter().filter(|e| e.topic == topic).cloned().collect())
            .unwrap_or_default()
    }

    /// Get the total number of events in the log.
    pub fn len(&self) -> usize {
        self.log.read().map(|log| log.len()).unwrap_or(0)
    }

    /// Check if the log is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of events on this handle's topics not yet polled.
    pub fn pending(&self) -> usize {
        let Ok(log) = self.log.read() else { return 0 };
        let Ok(pos) = self.position.lock() else { return 0 };
        log[(*pos).min(log.len())..]
            .iter()
            .filter(|e| self.accepts(e))
            .count()
    }

    /// Get acknowledged event IDs.
    pub fn acknowledged(&self) -> Vec<String> {
        self.acked.lock().map(|a| a.clone()).unwrap_or_default()
    }

    /// Get rejected event IDs with their reasons.
    pub fn rejected(&self) -> Vec<(String, String)> {
        self.nacked.lock().map(|n| n.clone()).unwrap_or_default()
    }

    fn accepts(&self, event: &Event) -> bool {
        self.topics.is_empty() || self.topics.contains(&event.topic)
    }
}

impl Publisher for InMemoryQueue {
    fn publish(&self, event: Event) -> Result<(), PublishError> {
        self.log
            .write()
            .map_err(|_| PublishError::Poisoned)?
            .push(event);
        Ok(())
    }

    fn publish_batch(&self, events: Vec<Event>) -> Result<(), PublishError> {
        let mut log = self.log.write().map_err(|_| PublishError::Poisoned)?;
        log.extend(events);
        Ok(())
    }
}

impl Subscriber for InMemoryQueue {
    fn poll(&self, timeout_ms: u64) -> Result<Option<Event>, PublishError> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);

        loop {
            {
                let log = self.log.read().map_err(|_| PublishError::Poisoned)?;
                let mut pos = self.position.lock().map_err(|_| PublishError::Poisoned)?;

                while *pos < log.len() {
                    let event = &log[*pos];
                    *pos += 1;
                    if self.accepts(event) {
                        return Ok(Some(event.clone()));
                    }
                }
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }

            // Small sleep to avoid busy-waiting
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn ack(&self, event_id: &str) -> Result<(), PublishError> {
        self.acked
            .lock()
            .map_err(|_| PublishError::Poisoned)?
            .push(event_id.to_string());
        Ok(())
    }

    fn nack(&self, event_id: &str, reason: &str) -> Result<(), PublishError> {
        // No redelivery; the rejection is only recorded
        self.nacked
            .lock()
            .map_err(|_| PublishError::Poisoned)?
            .push((event_id.to_string(), reason.to_string()));
        Ok(())
    }
}
