//! Bridge integration tests.
//!
//! - Block allocation over a real SQLite file, across threads and pools
//! - Transactional context lifecycle against the pool
//! - Consumer loop end to end with the submission handlers

mod support;
mod idgen;
mod store;
mod consumer;
#[cfg(feature = "http")]
mod http;
