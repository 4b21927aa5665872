//! Bound values and the single rendering boundary.
//!
//! Every value that reaches SQL goes through [`SqlWriter::push_value`], which
//! emits a `?` placeholder and records the argument. Nothing is interpolated.

use crate::error::{DataError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteArguments;
use sqlx::Arguments;
use uuid::Uuid;

/// A value bound to a statement placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    /// Expands to one placeholder per element (`IN (?, ?, ?)`).
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Number of placeholders this value occupies once expanded.
    pub fn placeholder_count(&self) -> usize {
        match self {
            Value::List(items) if items.is_empty() => 0,
            Value::List(items) => items.iter().map(Value::placeholder_count).sum(),
            _ => 1,
        }
    }

    fn bind<'q>(&self, args: &mut SqliteArguments<'q>) -> Result<()> {
        let outcome = match self {
            Value::Null => args.add(Option::<String>::None),
            Value::Bool(v) => args.add(*v),
            Value::Int(v) => args.add(*v),
            Value::Float(v) => args.add(*v),
            Value::Text(v) => args.add(v.clone()),
            Value::Uuid(v) => args.add(*v),
            Value::Timestamp(v) => args.add(*v),
            Value::List(items) => {
                for item in items {
                    item.bind(args)?;
                }
                Ok(())
            }
        };
        outcome.map_err(|e| DataError::InvalidQuery(format!("failed to bind argument: {e}")))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl From<&[Uuid]> for Value {
    fn from(v: &[Uuid]) -> Self {
        Value::List(v.iter().copied().map(Value::Uuid).collect())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            other @ serde_json::Value::Object(_) => Value::Text(other.to_string()),
        }
    }
}

/// A rendered statement: SQL text with `?` placeholders and its arguments in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub sql: String,
    pub args: Vec<Value>,
}

impl Rendered {
    pub fn arguments<'q>(&self) -> Result<SqliteArguments<'q>> {
        let mut args = SqliteArguments::default();
        for value in &self.args {
            value.bind(&mut args)?;
        }
        Ok(args)
    }
}

/// Accumulates SQL text and arguments. The first error recorded wins and is
/// returned from [`SqlWriter::finish`].
#[derive(Debug, Default)]
pub struct SqlWriter {
    sql: String,
    args: Vec<Value>,
    error: Option<DataError>,
}

impl SqlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    /// Write a placeholder for `value`. Lists expand to `?, ?, ?`; an empty
    /// list renders `NULL` so `IN (NULL)` matches nothing.
    pub fn push_value(&mut self, value: &Value) {
        match value {
            Value::List(items) if items.is_empty() => self.sql.push_str("NULL"),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.sql.push_str(", ");
                    }
                    self.push_value(item);
                }
            }
            other => {
                self.sql.push('?');
                self.args.push(other.clone());
            }
        }
    }

    pub fn push_identifier(&mut self, identifier: &str) {
        match validate_identifier(identifier) {
            Ok(()) => self.sql.push_str(identifier),
            Err(e) => self.fail(e),
        }
    }

    pub fn fail(&mut self, error: DataError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    pub fn finish(self) -> Result<Rendered> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(Rendered {
                sql: self.sql,
                args: self.args,
            }),
        }
    }
}

fn is_plain_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Accepts `column` or `table.column`.
pub fn validate_identifier(identifier: &str) -> Result<()> {
    let segments: Vec<&str> = identifier.split('.').collect();
    if segments.len() > 2 || !segments.iter().all(|s| is_plain_identifier(s)) {
        return Err(DataError::InvalidQuery(format!(
            "invalid identifier '{identifier}'"
        )));
    }
    Ok(())
}

/// Checks a verbatim clause (ORDER BY, GROUP BY, raw join or projection)
/// that carries no bound arguments.
pub fn validate_clause(kind: &str, clause: &str) -> Result<()> {
    let shape = scan_sql(clause);
    if clause.trim().is_empty() {
        return Err(DataError::InvalidQuery(format!("empty {kind} clause")));
    }
    if shape.placeholders > 0 {
        return Err(DataError::InvalidQuery(format!(
            "{kind} clause must not contain placeholders"
        )));
    }
    shape.check(kind)
}

/// Lexical facts about a SQL fragment, ignoring anything inside quotes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SqlShape {
    pub placeholders: usize,
    pub balanced: bool,
    pub terminated_quotes: bool,
    pub has_separator: bool,
    pub has_comment: bool,
}

impl SqlShape {
    pub fn check(&self, kind: &str) -> Result<()> {
        if !self.terminated_quotes {
            return Err(DataError::InvalidQuery(format!(
                "{kind} fragment has an unterminated quote"
            )));
        }
        if !self.balanced {
            return Err(DataError::InvalidQuery(format!(
                "{kind} fragment has unbalanced parentheses"
            )));
        }
        if self.has_separator {
            return Err(DataError::InvalidQuery(format!(
                "{kind} fragment must be a single statement"
            )));
        }
        if self.has_comment {
            return Err(DataError::InvalidQuery(format!(
                "{kind} fragment must not contain comments"
            )));
        }
        Ok(())
    }
}

pub(crate) fn scan_sql(sql: &str) -> SqlShape {
    let mut shape = SqlShape {
        balanced: true,
        terminated_quotes: true,
        ..SqlShape::default()
    };
    let mut depth: i64 = 0;
    let mut quote: Option<char> = None;
    let mut previous: Option<char> = None;

    for c in sql.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                '?' => shape.placeholders += 1,
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth < 0 {
                        shape.balanced = false;
                    }
                }
                ';' => shape.has_separator = true,
                '-' if previous == Some('-') => shape.has_comment = true,
                '*' if previous == Some('/') => shape.has_comment = true,
                _ => {}
            },
        }
        previous = Some(c);
    }

    if depth != 0 {
        shape.balanced = false;
    }
    if quote.is_some() {
        shape.terminated_quotes = false;
    }
    shape
}
