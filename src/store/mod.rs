//! Pooled connections and transactional contexts over the store of record.
//!
//! ```text
//! ┌──────────────┐  get_or_open   ┌────────────────┐  context()  ┌───────────┐
//! │ PoolRegistry │ ─────────────▶ │ ConnectionPool │ ──────────▶ │ TxContext │
//! │ (identity →) │                │ (r2d2, sqlite) │             │ begin ... │
//! └──────────────┘                └────────────────┘             └───────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use rowbridge::sql::Params;
//! use rowbridge::store::{ConnectionPool, StoreConfig};
//!
//! # fn main() -> rowbridge::Result<()> {
//! let pool = ConnectionPool::open(StoreConfig::new("bridge.db"))?;
//!
//! let mut ctx = pool.context();
//! let outcome = ctx.begin().and_then(|()| {
//!     ctx.query(
//!         "update upload set url = @url@ where upload_id = @id@",
//!         Some(&Params::new().bind("url", "https://x").bind("id", 7)),
//!     )?;
//!     ctx.commit()
//! });
//! if outcome.is_err() {
//!     ctx.rollback();
//! }
//! ctx.end();
//! # outcome
//! # }
//! ```

mod context;
mod pool;

pub use context::{TxContext, TxState};
pub use pool::{
    BeginMode, ConnectionIdentity, ConnectionPool, PoolConfig, PoolRegistry, PoolState,
    StoreConfig,
};
