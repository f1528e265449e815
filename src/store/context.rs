//! Single-connection, single-transaction execution context.
//!
//! ```text
//! Unopened ──begin──▶ Open ──commit──▶ Committed ──┐
//!    │                 │ └──rollback──▶ RolledBack ─┼──end──▶ Ended
//!    └─(begin fails)─▶ Aborted ◀─(commit fails)     │
//!                         └──────rollback / end─────┘
//! ```
//!
//! Every successful `begin` must be followed by exactly one `commit` or
//! `rollback`, and by `end`. `end` also runs on drop, so an abandoned context
//! still rolls back its transaction and returns its connection to the pool.

use std::fmt;

use tracing::{debug, error, warn};

use super::pool::{Connection, ConnectionPool};
use crate::error::{Error, Result};
use crate::sql::{render, Params, Rendered, Row, SqlValue};

/// Lifecycle state of a [`TxContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Unopened,
    Open,
    Committed,
    RolledBack,
    /// `begin` or `commit` failed; call `rollback` and `end`.
    Aborted,
    Ended,
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TxState::Unopened => "unopened",
            TxState::Open => "open",
            TxState::Committed => "committed",
            TxState::RolledBack => "rolled back",
            TxState::Aborted => "aborted",
            TxState::Ended => "ended",
        };
        f.write_str(name)
    }
}

/// A borrowed connection plus at most one open transaction.
pub struct TxContext {
    pool: ConnectionPool,
    conn: Option<Connection>,
    state: TxState,
}

impl TxContext {
    pub(crate) fn new(pool: ConnectionPool) -> Self {
        Self {
            pool,
            conn: None,
            state: TxState::Unopened,
        }
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == TxState::Open
    }

    /// Acquire a connection and start a transaction.
    pub fn begin(&mut self) -> Result<()> {
        self.expect_state("begin", TxState::Unopened)?;

        let conn = match self.pool.acquire() {
            Ok(conn) => conn,
            Err(err) => {
                self.state = TxState::Aborted;
                return Err(err);
            }
        };
        let begin = self.pool.config().begin_mode.statement();
        let conn = self.conn.insert(conn);
        if let Err(err) = conn.execute_batch(begin) {
            self.state = TxState::Aborted;
            return Err(Error::TransactionStartFailed(err));
        }

        debug!(database = %self.pool.identity().database, "transaction started");
        self.state = TxState::Open;
        Ok(())
    }

    /// Execute one statement inside the open transaction.
    ///
    /// With `params` the statement is rendered from its `@name@` template;
    /// without, `sql` runs as given. Statements that produce columns return
    /// their rows; others return an empty vec. All values are normalized on
    /// the way out.
    pub fn query(&mut self, sql: &str, params: Option<&Params>) -> Result<Vec<Row>> {
        self.expect_state("query", TxState::Open)?;

        let rendered = match params {
            Some(params) => render(sql, params)?,
            None => Rendered {
                sql: sql.to_string(),
                values: Vec::new(),
            },
        };

        let redact = self.pool.config().redact_values;
        if redact {
            debug!(statement = %rendered.sql, "executing statement");
        } else {
            debug!(statement = %rendered.sql, values = %rendered.describe_values(), "executing statement");
        }

        let conn = self.connection()?;
        run_statement(conn, &rendered.sql, &rendered.values).map_err(|source| {
            Error::QueryExecutionFailed {
                values: (!redact).then(|| rendered.describe_values()),
                statement: rendered.sql.clone(),
                source,
            }
        })
    }

    /// Execute several raw statements separated by `;`.
    pub fn execute_batch(&mut self, sql: &str) -> Result<()> {
        self.expect_state("execute", TxState::Open)?;
        let conn = self.connection()?;
        conn.execute_batch(sql)
            .map_err(|source| Error::QueryExecutionFailed {
                statement: sql.to_string(),
                values: None,
                source,
            })
    }

    pub fn commit(&mut self) -> Result<()> {
        self.expect_state("commit", TxState::Open)?;
        let conn = self.connection()?;
        match conn.execute_batch("COMMIT") {
            Ok(()) => {
                debug!("transaction committed");
                self.state = TxState::Committed;
                Ok(())
            }
            Err(err) => {
                self.state = TxState::Aborted;
                Err(Error::CommitFailed(err))
            }
        }
    }

    /// Roll back the open transaction, if any.
    ///
    /// Never fails: this usually runs on an error path and must not replace
    /// the error that caused it, so rollback failures are only logged.
    pub fn rollback(&mut self) {
        match self.state {
            TxState::Unopened | TxState::RolledBack | TxState::Ended => return,
            TxState::Committed => {
                warn!("rollback requested after commit; ignoring");
                return;
            }
            TxState::Open | TxState::Aborted => {}
        }

        if let Some(conn) = self.conn.as_ref() {
            if !conn.is_autocommit() {
                match conn.execute_batch("ROLLBACK") {
                    Ok(()) => debug!("transaction rolled back"),
                    Err(err) => error!(error = %err, "failed to roll back transaction"),
                }
            }
        }
        self.state = TxState::RolledBack;
    }

    /// Release the connection back to the pool. Safe in every state.
    pub fn end(&mut self) {
        if self.state == TxState::Ended {
            return;
        }
        if let Some(conn) = self.conn.take() {
            if !conn.is_autocommit() {
                warn!(state = %self.state, "ending context with an active transaction; rolling back");
                if let Err(err) = conn.execute_batch("ROLLBACK") {
                    error!(error = %err, "failed to roll back transaction on release");
                }
            }
            drop(conn);
            debug!("connection released");
        }
        self.state = TxState::Ended;
    }

    fn expect_state(&self, operation: &'static str, expected: TxState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn connection(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or(Error::InvalidState {
            operation: "use the connection of",
            state: self.state,
        })
    }
}

impl Drop for TxContext {
    fn drop(&mut self) {
        self.end();
    }
}

impl fmt::Debug for TxContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxContext")
            .field("database", &self.pool.identity().database)
            .field("state", &self.state)
            .finish()
    }
}

fn run_statement(
    conn: &rusqlite::Connection,
    statement: &str,
    values: &[SqlValue],
) -> rusqlite::Result<Vec<Row>> {
    let mut stmt = conn.prepare(statement)?;
    let columns = stmt.column_count();
    let params = rusqlite::params_from_iter(values.iter());

    if columns == 0 {
        stmt.execute(params)?;
        return Ok(Vec::new());
    }

    let mut rows = stmt.query(params)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(columns);
        for idx in 0..columns {
            values.push(SqlValue::from(row.get_ref(idx)?).normalize());
        }
        out.push(values);
    }
    Ok(out)
}

