//! Event-stream to relational-store bridge: named-parameter statements,
//! pooled transactional contexts, a hi/lo id allocator and a retrying
//! consumer loop.

pub mod bus;
pub mod config;
mod error;
pub mod health;
pub mod idgen;
pub mod service;
pub mod sql;
pub mod store;
pub mod submission;

pub use config::BridgeConfig;
pub use error::{Error, Result};
pub use idgen::{IdGenerator, IdGenerators};
pub use store::{ConnectionPool, TxContext};
