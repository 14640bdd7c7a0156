use std::fmt;

use chrono::NaiveDate;

/// A bound statement parameter.
///
/// Parameters are referenced in statement text as `{name:Type}` and sent
/// separately from the SQL, so values never need escaping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    UInt32(u32),
    Date(NaiveDate),
    String(String),
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::UInt32(v) => write!(f, "{v}"),
            Param::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Param::String(s) => f.write_str(s),
        }
    }
}

impl From<u32> for Param {
    fn from(value: u32) -> Self {
        Param::UInt32(value)
    }
}

impl From<NaiveDate> for Param {
    fn from(value: NaiveDate) -> Self {
        Param::Date(value)
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Param::String(value.to_string())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Param::String(value)
    }
}

/// A parametrized statement against one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    table: String,
    sql: String,
    params: Vec<(String, Param)>,
}

impl Statement {
    /// Create a statement targeting `table`.
    pub fn new(table: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Bind a named parameter. Binding the same name twice replaces the value.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Param>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.params.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = value,
            None => self.params.push((name, value)),
        }
        self
    }

    /// The table this statement reads from or mutates.
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[(String, Param)] {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }
}
