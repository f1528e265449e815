//! Named-placeholder statement rendering.
//!
//! Templates reference parameters as `@name@`, where `name` is one or more
//! word characters. Rendering replaces each placeholder with `?` and collects
//! the bound values in occurrence order, or splices an inline fragment into
//! the text when the parameter asks for it. An `@` that does not open a
//! well-formed placeholder is copied through unchanged.

use super::params::{Param, Params};
use super::value::SqlValue;
use crate::error::{Error, Result};

/// A statement ready for the driver: positional SQL plus its values.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

impl Rendered {
    /// Human-readable bound values, used in logs and error reports.
    pub fn describe_values(&self) -> String {
        let parts: Vec<String> = self.values.iter().map(ToString::to_string).collect();
        format!("[{}]", parts.join(", "))
    }
}

/// Render `template` against `params`.
///
/// Fails with [`Error::TemplateParameterMissing`] when a placeholder has no
/// matching parameter.
pub fn render(template: &str, params: &Params) -> Result<Rendered> {
    let mut sql = String::with_capacity(template.len());
    let mut values = Vec::new();
    let mut rest = template;

    while let Some(at) = rest.find('@') {
        sql.push_str(&rest[..at]);
        let after = &rest[at + 1..];
        match placeholder_name(after) {
            Some(name) => {
                match params.get(name) {
                    Some(Param::Inline(fragment)) => sql.push_str(fragment),
                    Some(Param::Bind(value)) => {
                        sql.push('?');
                        values.push(value.clone());
                    }
                    None => {
                        return Err(Error::TemplateParameterMissing {
                            name: name.to_string(),
                            template: template.to_string(),
                        })
                    }
                }
                // name plus the closing '@'
                rest = &after[name.len() + 1..];
            }
            None => {
                sql.push('@');
                rest = after;
            }
        }
    }
    sql.push_str(rest);

    Ok(Rendered { sql, values })
}

/// Returns the placeholder name if `text` starts with `word+@`.
fn placeholder_name(text: &str) -> Option<&str> {
    let len = text
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
        .count();
    if len > 0 && text.as_bytes().get(len) == Some(&b'@') {
        Some(&text[..len])
    } else {
        None
    }
}
