//! Event bus abstractions consumed by the bridge.
//!
//! ```text
//! ┌───────────────┐  poll / ack / nack   ┌────────────────┐
//! │  Subscriber   │ ───────────────────▶ │ ConsumerThread │
//! └───────────────┘                      └────────────────┘
//!         ▲                                      │ retry / error topic
//!         │            ┌───────────────┐         │
//!         └────────────│   Publisher   │◀────────┘
//!                      └───────────────┘
//!   InMemoryQueue implements both; broker adapters (Kafka, ...) live
//!   outside this crate.
//! ```

mod in_memory_queue;
mod publisher;
mod subscriber;

pub use in_memory_queue::InMemoryQueue;
pub use publisher::{Event, PublishError, Publisher, ATTEMPT_HEADER, ERROR_HEADER};
pub use subscriber::Subscriber;
