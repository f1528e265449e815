//! Legacy tables touched by the submission handlers, and their bootstrap.

use tracing::info;

use crate::error::Result;
use crate::idgen::IdSequence;
use crate::store::{ConnectionPool, TxContext};

pub const UPLOAD_STATUS_ACTIVE: i64 = 1;
pub const UPLOAD_STATUS_DELETED: i64 = 2;
pub const SUBMISSION_STATUS_ACTIVE: i64 = 1;
pub const SUBMISSION_STATUS_DELETED: i64 = 5;
pub const UPLOAD_TYPE_SUBMISSION: i64 = 1;
pub const UPLOAD_TYPE_FINAL_FIX: i64 = 3;

const CREATE_TABLES: &str = "
create table if not exists upload (
    upload_id        integer primary key,
    project_id       integer not null,
    project_phase_id integer not null,
    resource_id      integer not null,
    upload_type_id   integer not null,
    upload_status_id integer not null,
    parameter        text,
    url              text,
    create_user      text,
    create_date      text,
    modify_user      text,
    modify_date      text
);
create table if not exists submission (
    submission_id        integer primary key,
    upload_id            integer not null references upload (upload_id),
    submission_status_id integer not null,
    submission_type_id   integer not null,
    create_user          text,
    create_date          text,
    modify_user          text,
    modify_date          text
);
create table if not exists resource_submission (
    resource_id   integer not null,
    submission_id integer not null references submission (submission_id),
    create_user   text,
    create_date   text,
    modify_user   text,
    modify_date   text,
    primary key (resource_id, submission_id)
);
";

/// Map a submission type name to its legacy id.
pub fn submission_type_id(name: &str) -> Option<i64> {
    match name {
        "Contest Submission" => Some(1),
        "Specification Submission" => Some(2),
        "Checkpoint Submission" => Some(3),
        "Studio Final Fix Submission" => Some(4),
        _ => None,
    }
}

/// Create the `upload`, `submission` and `resource_submission` tables.
pub fn create_schema(ctx: &mut TxContext) -> Result<()> {
    ctx.execute_batch(CREATE_TABLES)
}

/// Create every table the bridge needs and seed the two id sequences.
///
/// Existing sequence rows are left alone, so restarts never rewind a
/// high-water mark.
pub fn bootstrap(
    pool: &ConnectionPool,
    upload_sequence: &str,
    submission_sequence: &str,
    block_size: i64,
) -> Result<()> {
    pool.transaction(|ctx| {
        IdSequence::create_table(ctx)?;
        create_schema(ctx)?;
        IdSequence::install(ctx, upload_sequence, 1, block_size)?;
        IdSequence::install(ctx, submission_sequence, 1, block_size)
    })?;
    info!(
        upload_sequence,
        submission_sequence, block_size, "schema bootstrapped"
    );
    Ok(())
}
