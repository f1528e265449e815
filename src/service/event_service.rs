//! Topic-routed event handlers.
//!
//! An `EventService<R>` holds shared resources `R` (pools, id generators,
//! ...) and a map of topic → handler closure. Each handler receives `&R` and
//! the decoded envelope and returns `Result<(), HandlerError>`.
//!
//! ## Example
//!
//! ```
//! use rowbridge::service::EventService;
//!
//! let service = EventService::new(())
//!     .on("submission.notification.create", |_resources, envelope| {
//!         let _payload = &envelope.payload;
//!         Ok(())
//!     });
//! assert_eq!(service.topics(), vec!["submission.notification.create"]);
//! ```

use std::collections::HashMap;

use super::envelope::EventEnvelope;
use super::error::HandlerError;

type Handler<R> = Box<dyn Fn(&R, &EventEnvelope) -> Result<(), HandlerError> + Send + Sync>;

/// Maps topics to handler closures.
///
/// `handle` never acknowledges anything; acknowledgement belongs to the
/// consumer loop and happens only after `handle` returns `Ok`.
pub struct EventService<R> {
    resources: R,
    handlers: HashMap<String, Handler<R>>,
}

impl<R: Send + Sync + 'static> EventService<R> {
    pub fn new(resources: R) -> Self {
        Self {
            resources,
            handlers: HashMap::new(),
        }
    }

    /// Register the handler for `topic`. Builder style; a later registration
    /// for the same topic replaces the earlier one.
    pub fn on<F>(mut self, topic: &str, handler: F) -> Self
    where
        F: Fn(&R, &EventEnvelope) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.handlers.insert(topic.to_string(), Box::new(handler));
        self
    }

    /// Dispatch one decoded event to the handler for its topic.
    pub fn handle(&self, envelope: &EventEnvelope) -> Result<(), HandlerError> {
        let handler = self
            .handlers
            .get(&envelope.topic)
            .ok_or_else(|| HandlerError::UnknownTopic(envelope.topic.clone()))?;
        handler(&self.resources, envelope)
    }

    /// Registered topics, sorted.
    pub fn topics(&self) -> Vec<&str> {
        let mut topics: Vec<&str> = self.handlers.keys().map(|s| s.as_str()).collect();
        topics.sort_unstable();
        topics
    }

    pub fn resources(&self) -> &R {
        &self.resources
    }
}
