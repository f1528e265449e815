//! Hi/lo unique id allocation backed by the `id_sequences` table.
//!
//! The store keeps only a coarse high-water mark per sequence. A generator
//! claims a block of `block_size` ids in one short transaction and hands them
//! out from memory until the block is used up.
//!
//! ```text
//!   id_sequences                       IdGenerator (per name)
//!  ┌──────────────┬───────┬──────┐    ┌──────────────────────┐
//!  │ name         │ start │ size │    │ Mutex<Window>        │
//!  │ upload_id_seq│  101  │ 100  │◀───│  next_id, available  │
//!  └──────────────┴───────┴──────┘    └──────────────────────┘
//!        claim: read (start, size), write start + size, commit
//! ```

mod generator;
mod registry;
mod sequence;

pub use generator::{GeneratorStats, IdGenerator};
pub use registry::IdGenerators;
pub use sequence::IdSequence;
