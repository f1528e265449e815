use thiserror::Error;

use crate::store::TxState;

/// Errors raised by the statement renderer, the connection pool, the
/// transactional context and the id generators.
#[derive(Debug, Error)]
pub enum Error {
    /// A `@name@` placeholder has no entry in the supplied parameters.
    #[error("template parameter `{name}` not found for template: {template}")]
    TemplateParameterMissing { name: String, template: String },

    /// A context operation was called in a state that does not allow it.
    #[error("cannot {operation} a transactional context that is {state}")]
    InvalidState {
        operation: &'static str,
        state: TxState,
    },

    /// No pooled connection became available before the acquire timeout.
    #[error("failed to acquire a connection for {database}: {source}")]
    ConnectionAcquisitionFailed {
        database: String,
        #[source]
        source: r2d2::Error,
    },

    #[error("failed to start transaction: {0}")]
    TransactionStartFailed(#[source] rusqlite::Error),

    /// The driver rejected a statement. `statement` is the rendered text;
    /// `values` is absent when the pool redacts bound values.
    #[error("query failed: {source}; statement: {statement}{}", render_values(.values))]
    QueryExecutionFailed {
        statement: String,
        values: Option<String>,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to commit transaction: {0}")]
    CommitFailed(#[source] rusqlite::Error),

    #[error("id sequence `{0}` not found")]
    SequenceNotFound(String),

    #[error("failed to refill id sequence `{sequence}`: {reason}")]
    RefillFailed { sequence: String, reason: String },

    /// A mutex guarding shared state was poisoned by a panicking holder.
    #[error("lock poisoned during {0}")]
    Poisoned(&'static str),

    #[error("invalid configuration: {0}")]
    Config(String),
}

fn render_values(values: &Option<String>) -> String {
    match values {
        Some(values) => format!("; values: {}", values),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, Error>;
