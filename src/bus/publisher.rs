//! Core publisher types for the event bus.

use thiserror::Error;

/// Metadata key carrying the delivery attempt on republished events.
pub const ATTEMPT_HEADER: &str = "x-attempt";
/// Metadata key carrying the failure that sent an event to the error topic.
pub const ERROR_HEADER: &str = "x-error";

/// A message on the bus.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// Unique identifier for this delivery.
    pub id: String,
    /// Topic the event was published to.
    pub topic: String,
    /// Raw payload, normally a JSON event envelope.
    pub payload: Vec<u8>,
    /// Delivery attempt, starting at 1.
    pub attempt: u32,
    /// Optional headers (correlation ids, failure reasons, ...).
    pub metadata: Option<Vec<(String, String)>>,
}

impl Event {
    pub fn new(id: impl Into<String>, topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            topic: topic.into(),
            payload,
            attempt: 1,
            metadata: None,
        }
    }

    /// Create an event with a string payload.
    pub fn with_string_payload(
        id: impl Into<String>,
        topic: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self::new(id, topic, payload.into().into_bytes())
    }

    /// Create an event whose payload is `value` serialized as JSON.
    pub fn json<T: serde::Serialize>(
        id: impl Into<String>,
        topic: impl Into<String>,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(id, topic, serde_json::to_vec(value)?))
    }

    /// Add metadata to the event.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata
            .get_or_insert_with(Vec::new)
            .push((key.into(), value.into()));
        self
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .as_ref()?
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Get the payload as a string (if valid UTF-8).
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// The same event, scheduled for its next delivery attempt on the same
    /// topic.
    pub fn next_attempt(&self) -> Event {
        let attempt = self.attempt + 1;
        let mut event = self.clone();
        event.id = format!("{}#{}", base_id(&self.id), attempt);
        event.attempt = attempt;
        event.with_metadata(ATTEMPT_HEADER, attempt.to_string())
    }

    /// The same event, redirected to `topic` with the failure recorded.
    pub fn forwarded(&self, topic: &str, reason: &str) -> Event {
        let mut event = self.clone();
        event.topic = topic.to_string();
        event.with_metadata(ERROR_HEADER, reason)
    }
}

fn base_id(id: &str) -> &str {
    match id.rsplit_once('#') {
        Some((base, suffix)) if suffix.chars().all(|c| c.is_ascii_digit()) => base,
        _ => id,
    }
}

/// Error type for bus operations.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("serialization failed: {0}")]
    SerializationFailed(String),
    #[error("event rejected: {0}")]
    Rejected(String),
    #[error("publish timeout")]
    Timeout,
    #[error("bus lock poisoned")]
    Poisoned,
}

impl From<serde_json::Error> for PublishError {
    fn from(err: serde_json::Error) -> Self {
        PublishError::SerializationFailed(err.to_string())
    }
}

/// Trait for publishing events to a message bus.
///
/// Used by the consumer loop to republish retries and to forward failed
/// events to the error topic.
pub trait Publisher: Send + Sync {
    /// Publish a single event to the bus.
    fn publish(&self, event: Event) -> Result<(), PublishError>;

    /// Publish multiple events to the bus.
    ///
    /// Default implementation publishes events sequentially.
    fn publish_batch(&self, events: Vec<Event>) -> Result<(), PublishError> {
        for event in events {
            self.publish(event)?;
        }
        Ok(())
    }
}
