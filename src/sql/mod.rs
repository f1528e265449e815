//! SQL statement rendering and the value model shared with the store.
//!
//! ```
//! use rowbridge::sql::{render, Params, SqlValue};
//!
//! let params = Params::new().bind("x", 1).bind("y", "s");
//! let rendered = render("select * from t where a=@x@ and b=@y@", &params).unwrap();
//! assert_eq!(rendered.sql, "select * from t where a=? and b=?");
//! assert_eq!(rendered.values, vec![SqlValue::Integer(1), SqlValue::Text("s".into())]);
//! ```

mod params;
mod render;
mod value;

pub use params::{Param, Params};
pub use render::{render, Rendered};
pub use value::SqlValue;

/// One result row, columns in select-list order.
pub type Row = Vec<SqlValue>;
