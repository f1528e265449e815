//! Error types for event handlers.

use thiserror::Error;

use crate::bus::PublishError;

/// Error type for event handler operations.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// No handler registered for this topic.
    #[error("no handler for topic: {0}")]
    UnknownTopic(String),
    /// Envelope or payload decode failed.
    #[error("decode failed: {0}")]
    DecodeFailed(String),
    /// The event is well-formed but cannot be applied.
    #[error("rejected: {0}")]
    Rejected(String),
    /// A referenced record does not exist in the store.
    #[error("not found: {0}")]
    NotFound(String),
    /// Store, transaction or id allocation failure.
    #[error("store error: {0}")]
    Store(#[from] crate::Error),
    /// Bus publish error.
    #[error("publish error: {0}")]
    Publish(#[from] PublishError),
}

impl HandlerError {
    /// Whether delivering the same event again could succeed.
    ///
    /// Store and bus failures are transient; malformed or inapplicable
    /// events fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HandlerError::Store(_) | HandlerError::Publish(_) | HandlerError::NotFound(_)
        )
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::DecodeFailed(err.to_string())
    }
}
