//! Core subscriber trait for the event bus.

use super::publisher::{Event, PublishError};

/// Pull-based subscription to one or more topics.
///
/// Acknowledging an event is the consumer's commit: it happens only after
/// the event has been fully handled (or deliberately skipped).
pub trait Subscriber: Send + Sync {
    /// Poll for the next event, blocking until one is available or timeout.
    fn poll(&self, timeout_ms: u64) -> Result<Option<Event>, PublishError>;

    /// Acknowledge that an event has been processed.
    fn ack(&self, event_id: &str) -> Result<(), PublishError>;

    /// Reject an event (will be redelivered or sent to dead letter queue).
    fn nack(&self, event_id: &str, reason: &str) -> Result<(), PublishError>;
}
