//! Per-column operator filters.
//!
//! Conditions are written the way form handlers receive them (`"=?"`,
//! `">= ?"`, `"IN (?)"`, `"BETWEEN ? AND ?"`, `"IS NULL"`). Matching is
//! case-insensitive and ignores whitespace.

use super::conditions::{Column, Predicate};
use super::value::Value;
use crate::error::{DataError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    NotLike,
    In,
    NotIn,
    Between,
    IsNull,
    IsNotNull,
}

impl Operator {
    pub fn parse(condition: &str) -> Result<Self> {
        let normalized: String = condition
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_uppercase();

        let operator = match normalized.as_str() {
            "=?" => Operator::Eq,
            "!=?" | "<>?" => Operator::Ne,
            ">?" => Operator::Gt,
            ">=?" => Operator::Gte,
            "<?" => Operator::Lt,
            "<=?" => Operator::Lte,
            "LIKE?" => Operator::Like,
            "NOTLIKE?" => Operator::NotLike,
            "IN(?)" | "IN?" => Operator::In,
            "NOTIN(?)" | "NOTIN?" => Operator::NotIn,
            "BETWEEN?AND?" => Operator::Between,
            "ISNULL" => Operator::IsNull,
            "ISNOTNULL" => Operator::IsNotNull,
            _ => {
                return Err(DataError::InvalidQuery(format!(
                    "unsupported filter condition '{condition}'"
                )))
            }
        };
        Ok(operator)
    }

    /// Build the predicate for `column <op> value`.
    pub fn predicate(self, column: Column, value: Value) -> Result<Predicate> {
        let predicate = match self {
            Operator::Eq => Predicate::eq(column, value),
            Operator::Ne => Predicate::ne(column, value),
            Operator::Gt => Predicate::gt(column, value),
            Operator::Gte => Predicate::gte(column, value),
            Operator::Lt => Predicate::lt(column, value),
            Operator::Lte => Predicate::lte(column, value),
            Operator::Like => Predicate::like(column, value),
            Operator::NotLike => Predicate::not_like(column, value),
            Operator::In | Operator::NotIn => {
                let values = match value {
                    Value::List(items) => items,
                    single => vec![single],
                };
                if self == Operator::In {
                    Predicate::in_list(column, values)
                } else {
                    Predicate::not_in_list(column, values)
                }
            }
            Operator::Between => match value {
                Value::List(mut bounds) if bounds.len() == 2 => {
                    let high = bounds.pop().unwrap_or(Value::Null);
                    let low = bounds.pop().unwrap_or(Value::Null);
                    Predicate::between(column, low, high)
                }
                _ => {
                    return Err(DataError::InvalidQuery(format!(
                        "BETWEEN on {} needs a list of exactly two bounds",
                        column.name()
                    )))
                }
            },
            Operator::IsNull => Predicate::is_null(column),
            Operator::IsNotNull => Predicate::is_not_null(column),
        };
        Ok(predicate)
    }
}

/// Boolean connective placed between two adjacent column filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Joiner {
    #[default]
    And,
    Or,
}

impl Joiner {
    pub fn parse(joiner: &str) -> Result<Self> {
        match joiner.trim().to_ascii_uppercase().as_str() {
            "AND" | "" => Ok(Joiner::And),
            "OR" => Ok(Joiner::Or),
            other => Err(DataError::InvalidQuery(format!(
                "unsupported joiner '{other}', expected AND or OR"
            ))),
        }
    }
}

/// Typed form of one operator filter. `joiner` connects this filter to the
/// next one and is ignored on the last filter.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub column: Column,
    pub operator: Operator,
    pub value: Value,
    pub joiner: Joiner,
}

impl FieldFilter {
    pub fn new(column: impl Into<Column>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            operator,
            value: value.into(),
            joiner: Joiner::And,
        }
    }

    pub fn or_next(mut self) -> Self {
        self.joiner = Joiner::Or;
        self
    }
}

/// Parse the parallel arrays of a form-style operator filter.
///
/// `operators[i]` joins filter `i` to filter `i + 1`; a trailing operator
/// for the last filter is accepted and ignored.
pub fn parse_field_filters(
    columns: &[&str],
    conditions: &[&str],
    operators: &[&str],
    values: Vec<Value>,
) -> Result<Vec<FieldFilter>> {
    if conditions.len() != columns.len() || values.len() != columns.len() {
        return Err(DataError::InvalidQuery(format!(
            "operator filter needs one condition and one value per column: {} columns, {} conditions, {} values",
            columns.len(),
            conditions.len(),
            values.len()
        )));
    }
    if !columns.is_empty() && operators.len() + 1 < columns.len() {
        return Err(DataError::InvalidQuery(format!(
            "operator filter over {} columns needs at least {} joiners, got {}",
            columns.len(),
            columns.len() - 1,
            operators.len()
        )));
    }

    columns
        .iter()
        .zip(conditions)
        .zip(values)
        .enumerate()
        .map(|(i, ((column, condition), value))| {
            let joiner = match operators.get(i) {
                Some(joiner) if i + 1 < columns.len() => Joiner::parse(joiner)?,
                _ => Joiner::And,
            };
            Ok(FieldFilter {
                column: Column::new(*column),
                operator: Operator::parse(condition)?,
                value,
                joiner,
            })
        })
        .collect()
}

/// Combine filters into one predicate with SQL precedence: runs joined by
/// AND bind first, and the runs are OR-ed together.
pub fn group_field_filters(filters: Vec<FieldFilter>) -> Result<Option<Predicate>> {
    let mut runs: Vec<Vec<Predicate>> = vec![Vec::new()];
    let mut previous_joiner = Joiner::And;

    for filter in filters {
        if previous_joiner == Joiner::Or {
            runs.push(Vec::new());
        }
        previous_joiner = filter.joiner;
        let predicate = filter.operator.predicate(filter.column, filter.value)?;
        if let Some(run) = runs.last_mut() {
            run.push(predicate);
        }
    }

    let mut terms: Vec<Predicate> = runs
        .into_iter()
        .filter(|run| !run.is_empty())
        .map(|mut run| {
            if run.len() == 1 {
                run.remove(0)
            } else {
                Predicate::And(run)
            }
        })
        .collect();

    Ok(match terms.len() {
        0 => None,
        1 => Some(terms.remove(0)),
        _ => Some(Predicate::Or(terms)),
    })
}
