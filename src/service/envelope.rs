//! The JSON envelope every inbound event carries.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::HandlerError;
use crate::bus::Event;

/// Decoded event: routing header plus an opaque JSON payload.
///
/// ```json
/// {
///   "topic": "submission.notification.create",
///   "originator": "submission-api",
///   "timestamp": "2018-02-16T00:00:00",
///   "mime-type": "application/json",
///   "payload": { "id": "a1", "resource": "submission" }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub topic: String,
    pub originator: String,
    pub timestamp: String,
    #[serde(rename = "mime-type")]
    pub mime_type: String,
    pub payload: Value,
}

impl EventEnvelope {
    /// Decode and validate the envelope carried by `event`.
    pub fn decode(event: &Event) -> Result<Self, HandlerError> {
        if event.payload.iter().all(u8::is_ascii_whitespace) {
            return Err(HandlerError::DecodeFailed("empty event".into()));
        }
        let envelope: EventEnvelope = serde_json::from_slice(&event.payload)?;
        envelope.validate()?;
        Ok(envelope)
    }

    fn validate(&self) -> Result<(), HandlerError> {
        for (field, value) in [
            ("topic", &self.topic),
            ("originator", &self.originator),
            ("timestamp", &self.timestamp),
            ("mime-type", &self.mime_type),
        ] {
            if value.trim().is_empty() {
                return Err(HandlerError::DecodeFailed(format!("`{}` is empty", field)));
            }
        }
        if !self.payload.is_object() {
            return Err(HandlerError::DecodeFailed("`payload` must be an object".into()));
        }
        Ok(())
    }

    /// Deserialize the payload into a typed struct.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        serde_json::from_value(self.payload.clone()).map_err(HandlerError::from)
    }
}
