use std::sync::Mutex;

use tracing::{debug, info, warn};

use super::sequence::IdSequence;
use crate::error::{Error, Result};
use crate::store::ConnectionPool;

/// In-memory part of the hi/lo scheme: the last granted id and how many
/// values remain in the current block (counting the next grant).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Window {
    next_id: i64,
    available: i64,
    granted: u64,
    refills: u64,
}

/// Counters for one generator.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorStats {
    /// Ids handed out by this instance.
    pub granted: u64,
    /// Blocks claimed from the store.
    pub refills: u64,
}

/// Block-based unique id generator for one named sequence.
///
/// Each instance holds a reservation window of `block_size` ids claimed from
/// the `id_sequences` row in a single transaction, and grants ids from it
/// without touching the store. The window mutex is held across the whole
/// refill-and-grant step so two callers can never both refill.
///
/// ```no_run
/// use rowbridge::idgen::IdGenerator;
/// use rowbridge::store::{ConnectionPool, StoreConfig};
///
/// # fn main() -> rowbridge::Result<()> {
/// let pool = ConnectionPool::open(StoreConfig::new("bridge.db"))?;
/// let uploads = IdGenerator::new(pool, "upload_id_seq");
/// let first = uploads.next_id()?;
/// assert!(uploads.next_id()? > first);
/// # Ok(())
/// # }
/// ```
pub struct IdGenerator {
    pool: ConnectionPool,
    sequence: String,
    window: Mutex<Window>,
}

impl IdGenerator {
    pub fn new(pool: ConnectionPool, sequence: impl Into<String>) -> Self {
        Self {
            pool,
            sequence: sequence.into(),
            window: Mutex::new(Window::default()),
        }
    }

    pub fn sequence(&self) -> &str {
        &self.sequence
    }

    /// Grant the next id, claiming a new block from the store when the
    /// current one is used up.
    ///
    /// On failure the window is left exactly as it was, so a retry neither
    /// skips nor repeats a value.
    pub fn next_id(&self) -> Result<i64> {
        let mut window = self
            .window
            .lock()
            .map_err(|_| Error::Poisoned("id window access"))?;

        window.available -= 1;
        if window.available <= 0 {
            match self.claim_block().and_then(|block| self.window_start(&block)) {
                Ok((last, size)) => {
                    window.next_id = last;
                    window.available = size;
                    window.refills += 1;
                }
                Err(err) => {
                    window.available += 1;
                    warn!(sequence = %self.sequence, error = %err, "failed to refill id block");
                    return Err(err);
                }
            }
        }

        window.next_id += 1;
        window.granted += 1;
        Ok(window.next_id)
    }

    pub fn stats(&self) -> Result<GeneratorStats> {
        let window = self
            .window
            .lock()
            .map_err(|_| Error::Poisoned("id window access"))?;
        Ok(GeneratorStats {
            granted: window.granted,
            refills: window.refills,
        })
    }

    fn claim_block(&self) -> Result<IdSequence> {
        debug!(sequence = %self.sequence, "claiming id block");
        let block = self
            .pool
            .transaction(|ctx| IdSequence::claim(ctx, &self.sequence))
            .map_err(|err| match err {
                Error::TransactionStartFailed(source) | Error::CommitFailed(source) => {
                    Error::RefillFailed {
                        sequence: self.sequence.clone(),
                        reason: source.to_string(),
                    }
                }
                Error::ConnectionAcquisitionFailed { source, .. } => Error::RefillFailed {
                    sequence: self.sequence.clone(),
                    reason: format!("store unreachable: {source}"),
                },
                other => other,
            })?;
        info!(
            sequence = %self.sequence,
            start = block.next_block_start,
            size = block.block_size,
            "claimed id block"
        );
        Ok(block)
    }

    /// The id just before a claimed block, and the block's size.
    fn window_start(&self, block: &IdSequence) -> Result<(i64, i64)> {
        let last = block
            .next_block_start
            .checked_sub(1)
            .ok_or_else(|| Error::RefillFailed {
                sequence: self.sequence.clone(),
                reason: format!("block start {} out of range", block.next_block_start),
            })?;
        Ok((last, block.block_size))
    }
}

impl std::fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdGenerator")
            .field("sequence", &self.sequence)
            .finish()
    }
}
