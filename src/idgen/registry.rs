use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::generator::IdGenerator;
use crate::error::{Error, Result};
use crate::store::ConnectionPool;

/// One [`IdGenerator`] per sequence name, created on first use.
///
/// Every lookup of the same name returns the same `Arc`, so all callers in
/// the process share one reservation window (and one mutex) per sequence.
/// Different names never share a mutex.
pub struct IdGenerators {
    pool: ConnectionPool,
    generators: Mutex<HashMap<String, Arc<IdGenerator>>>,
}

impl IdGenerators {
    pub fn new(pool: ConnectionPool) -> Self {
        Self {
            pool,
            generators: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, sequence: &str) -> Result<Arc<IdGenerator>> {
        let mut generators = self
            .generators
            .lock()
            .map_err(|_| Error::Poisoned("id generator registry lookup"))?;
        Ok(generators
            .entry(sequence.to_string())
            .or_insert_with(|| Arc::new(IdGenerator::new(self.pool.clone(), sequence)))
            .clone())
    }

    /// Shorthand for `get(sequence)?.next_id()`.
    pub fn next_id(&self, sequence: &str) -> Result<i64> {
        self.get(sequence)?.next_id()
    }

    pub fn sequences(&self) -> Vec<String> {
        self.generators
            .lock()
            .map(|generators| generators.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}
