//! Positional SQL rendering
//!
//! Every value that reaches the database goes through [`SqlWriter::push_param`],
//! which appends the value and emits its `$n` placeholder in one step. The
//! placeholder index is always the value's position in the parameter list.
//!
//! This mirrors `sqlx::QueryBuilder::push`/`push_bind` but lives outside the
//! optional `database` feature, so the in-memory store and the SQL renderers
//! build without sqlx.

use chrono::{DateTime, Utc};
use std::fmt::Write as _;

/// A bound query parameter
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    TextArray(Vec<String>),
    Int(i64),
    Timestamp(DateTime<Utc>),
}

/// SQL text plus its ordered parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlWriter {
    sql: String,
    params: Vec<SqlParam>,
}

impl SqlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append trusted SQL text (never user input)
    pub fn push(&mut self, fragment: &str) -> &mut Self {
        self.sql.push_str(fragment);
        self
    }

    /// Append a parameter and its placeholder
    pub fn push_param(&mut self, param: SqlParam) -> &mut Self {
        self.params.push(param);
        let _ = write!(self.sql, "${}", self.params.len());
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[SqlParam] {
        &self.params
    }

    pub fn into_parts(self) -> (String, Vec<SqlParam>) {
        (self.sql, self.params)
    }
}
