//! Event service: topic routing and the consumer loop.
//!
//! This module provides `EventService<R>`, a registry of topic handlers
//! backed by shared resources, and `ConsumerThread`, which polls a
//! subscriber in the background, dispatches each event and settles it:
//! acknowledge on success, republish with the next attempt on a retryable
//! failure, forward to the error topic once attempts run out.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use rowbridge::bus::InMemoryQueue;
//! use rowbridge::service::{ConsumerConfig, ConsumerThread, EventService};
//!
//! let service = EventService::new(resources)
//!     .on("submission.notification.create", |resources, envelope| {
//!         // allocate ids, open a transaction, apply the change
//!         Ok(())
//!     });
//!
//! let queue = InMemoryQueue::new();
//! let consumer = ConsumerThread::spawn(
//!     Arc::new(service),
//!     queue.subscribe(["submission.notification.create"]),
//!     queue.clone(),
//!     ConsumerConfig::default(),
//! );
//! ```

mod consumer;
mod envelope;
mod error;
mod event_service;

pub use consumer::{
    process_event, ConsumerConfig, ConsumerProbe, ConsumerStats, ConsumerThread, Outcome,
};
pub use envelope::EventEnvelope;
pub use error::HandlerError;
pub use event_service::EventService;
