use crate::error::{Error, Result};
use crate::sql::Params;
use crate::store::TxContext;

const CREATE_TABLE: &str = "create table if not exists id_sequences (
    name text primary key not null,
    next_block_start integer not null,
    block_size integer not null
)";

const SELECT_SEQUENCE: &str =
    "select next_block_start, block_size from id_sequences where name = @seqName@";

const ADVANCE_SEQUENCE: &str =
    "update id_sequences set next_block_start = @nextStart@ where name = @seqName@";

const INSERT_SEQUENCE: &str = "insert or ignore into id_sequences (name, next_block_start, block_size)
    values (@seqName@, @nextStart@, @blockSize@)";

/// The persisted high-water mark of one named sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdSequence {
    pub name: String,
    pub next_block_start: i64,
    pub block_size: i64,
}

impl IdSequence {
    pub fn create_table(ctx: &mut TxContext) -> Result<()> {
        ctx.execute_batch(CREATE_TABLE)
    }

    /// Insert a sequence row unless one with the same name exists.
    pub fn install(
        ctx: &mut TxContext,
        name: &str,
        next_block_start: i64,
        block_size: i64,
    ) -> Result<()> {
        ctx.query(
            INSERT_SEQUENCE,
            Some(
                &Params::new()
                    .bind("seqName", name)
                    .bind("nextStart", next_block_start)
                    .bind("blockSize", block_size),
            ),
        )?;
        Ok(())
    }

    pub fn load(ctx: &mut TxContext, name: &str) -> Result<IdSequence> {
        let rows = ctx.query(SELECT_SEQUENCE, Some(&Params::new().bind("seqName", name)))?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| Error::SequenceNotFound(name.to_string()))?;

        let column = |idx: usize, label: &str| {
            row.get(idx)
                .and_then(|value| value.as_i64())
                .ok_or_else(|| Error::RefillFailed {
                    sequence: name.to_string(),
                    reason: format!("{} is not an integer", label),
                })
        };

        Ok(IdSequence {
            name: name.to_string(),
            next_block_start: column(0, "next_block_start")?,
            block_size: column(1, "block_size")?,
        })
    }

    pub fn advance_to(&self, ctx: &mut TxContext, next_start: i64) -> Result<()> {
        ctx.query(
            ADVANCE_SEQUENCE,
            Some(
                &Params::new()
                    .bind("seqName", self.name.as_str())
                    .bind("nextStart", next_start),
            ),
        )?;
        Ok(())
    }

    /// Read the row and move its high-water mark past the block it holds.
    ///
    /// Must run inside an open transaction; the claim only counts once that
    /// transaction commits. Returns the claimed block.
    pub fn claim(ctx: &mut TxContext, name: &str) -> Result<IdSequence> {
        let sequence = IdSequence::load(ctx, name)?;
        if sequence.block_size <= 0 {
            return Err(Error::RefillFailed {
                sequence: name.to_string(),
                reason: format!("block_size must be positive, found {}", sequence.block_size),
            });
        }
        let next_start = sequence
            .next_block_start
            .checked_sub(1)
            .and_then(|_| sequence.next_block_start.checked_add(sequence.block_size))
            .ok_or_else(|| Error::RefillFailed {
                sequence: name.to_string(),
                reason: "sequence exhausted the integer range".into(),
            })?;
        sequence.advance_to(ctx, next_start)?;
        Ok(sequence)
    }
}
