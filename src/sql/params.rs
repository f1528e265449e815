use std::collections::BTreeMap;

use super::value::SqlValue;

/// How a named parameter is placed into a rendered statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// Bound positionally as `?`.
    Bind(SqlValue),
    /// Substituted verbatim into the statement text (e.g. `null`).
    Inline(String),
}

impl Param {
    pub fn bind(value: impl Into<SqlValue>) -> Self {
        Param::Bind(value.into())
    }

    pub fn inline(fragment: impl Into<String>) -> Self {
        Param::Inline(fragment.into())
    }
}

/// Named statement parameters.
///
/// ```
/// use rowbridge::sql::Params;
///
/// let params = Params::new()
///     .bind("roundId", 7)
///     .bind("userId", 42)
///     .inline("teamId", "null");
/// assert_eq!(params.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    entries: BTreeMap<String, Param>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a positionally bound value. Builder style.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.entries.insert(name.into(), Param::bind(value));
        self
    }

    /// Add a fragment substituted literally into the statement. Builder style.
    pub fn inline(mut self, name: impl Into<String>, fragment: impl Into<String>) -> Self {
        self.entries.insert(name.into(), Param::inline(fragment));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, param: Param) -> Option<Param> {
        self.entries.insert(name.into(), param)
    }

    pub fn get(&self, name: &str) -> Option<&Param> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Param)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, Param)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}
