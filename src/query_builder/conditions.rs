use super::builder::SubQuery;
use super::value::{scan_sql, SqlWriter, Value};
use crate::error::DataError;

/// A column reference, `name` or `table.name`. Validated when rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column(String);

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Column(name.into())
    }

    /// `table.name`
    pub fn qualified(table: &str, name: &str) -> Self {
        Column(format!("{table}.{name}"))
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub(crate) fn write(&self, writer: &mut SqlWriter) {
        writer.push_identifier(&self.0);
    }
}

impl From<&str> for Column {
    fn from(name: &str) -> Self {
        Column::new(name)
    }
}

impl From<String> for Column {
    fn from(name: String) -> Self {
        Column(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    NotLike,
}

impl CompareOp {
    pub fn to_sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Like => "LIKE",
            CompareOp::NotLike => "NOT LIKE",
        }
    }
}

/// A verbatim SQL condition with `?` placeholders and the values bound to them.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFragment {
    pub sql: String,
    pub args: Vec<Value>,
}

impl SqlFragment {
    pub fn new(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }

    /// Writes the fragment, substituting each placeholder with its argument.
    /// List arguments expand in place, so `id IN (?)` accepts a list.
    pub(crate) fn write(&self, writer: &mut SqlWriter, kind: &str) {
        let shape = scan_sql(&self.sql);
        if let Err(e) = shape.check(kind) {
            writer.fail(e);
            return;
        }
        if shape.placeholders != self.args.len() {
            writer.fail(DataError::InvalidQuery(format!(
                "{kind} fragment has {} placeholders but {} arguments",
                shape.placeholders,
                self.args.len()
            )));
            return;
        }

        let mut args = self.args.iter();
        let mut quote: Option<char> = None;
        let mut literal = String::new();
        for c in self.sql.chars() {
            match quote {
                Some(q) if c == q => {
                    quote = None;
                    literal.push(c);
                }
                Some(_) => literal.push(c),
                None if c == '\'' || c == '"' => {
                    quote = Some(c);
                    literal.push(c);
                }
                None if c == '?' => {
                    writer.push(&literal);
                    literal.clear();
                    if let Some(value) = args.next() {
                        writer.push_value(value);
                    }
                }
                None => literal.push(c),
            }
        }
        writer.push(&literal);
    }
}

/// WHERE / HAVING predicate algebra.
#[derive(Debug, Clone)]
pub enum Predicate {
    Compare {
        column: Column,
        op: CompareOp,
        value: Value,
    },
    CompareColumns {
        left: Column,
        op: CompareOp,
        right: Column,
    },
    In {
        column: Column,
        values: Vec<Value>,
        negated: bool,
    },
    Between {
        column: Column,
        low: Value,
        high: Value,
    },
    IsNull {
        column: Column,
        negated: bool,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    InSubquery {
        column: Column,
        subquery: Box<SubQuery>,
        negated: bool,
    },
    Exists {
        subquery: Box<SubQuery>,
        negated: bool,
    },
    Raw(SqlFragment),
}

impl Predicate {
    fn compare(column: impl Into<Column>, op: CompareOp, value: impl Into<Value>) -> Self {
        Predicate::Compare {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: impl Into<Column>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Eq, value)
    }

    pub fn ne(column: impl Into<Column>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Ne, value)
    }

    pub fn gt(column: impl Into<Column>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Gt, value)
    }

    pub fn gte(column: impl Into<Column>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Gte, value)
    }

    pub fn lt(column: impl Into<Column>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Lt, value)
    }

    pub fn lte(column: impl Into<Column>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Lte, value)
    }

    pub fn like(column: impl Into<Column>, pattern: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Like, pattern)
    }

    pub fn not_like(column: impl Into<Column>, pattern: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::NotLike, pattern)
    }

    /// `left = right` between two columns, typically a join condition.
    pub fn columns_eq(left: impl Into<Column>, right: impl Into<Column>) -> Self {
        Predicate::CompareColumns {
            left: left.into(),
            op: CompareOp::Eq,
            right: right.into(),
        }
    }

    pub fn in_list<V: Into<Value>>(
        column: impl Into<Column>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Predicate::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    pub fn not_in_list<V: Into<Value>>(
        column: impl Into<Column>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Predicate::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    pub fn between(
        column: impl Into<Column>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        Predicate::Between {
            column: column.into(),
            low: low.into(),
            high: high.into(),
        }
    }

    pub fn is_null(column: impl Into<Column>) -> Self {
        Predicate::IsNull {
            column: column.into(),
            negated: false,
        }
    }

    pub fn is_not_null(column: impl Into<Column>) -> Self {
        Predicate::IsNull {
            column: column.into(),
            negated: true,
        }
    }

    pub fn and(predicates: Vec<Predicate>) -> Self {
        Predicate::And(predicates)
    }

    pub fn or(predicates: Vec<Predicate>) -> Self {
        Predicate::Or(predicates)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(predicate: Predicate) -> Self {
        Predicate::Not(Box::new(predicate))
    }

    pub fn in_subquery(column: impl Into<Column>, subquery: SubQuery) -> Self {
        Predicate::InSubquery {
            column: column.into(),
            subquery: Box::new(subquery),
            negated: false,
        }
    }

    pub fn not_in_subquery(column: impl Into<Column>, subquery: SubQuery) -> Self {
        Predicate::InSubquery {
            column: column.into(),
            subquery: Box::new(subquery),
            negated: true,
        }
    }

    pub fn exists(subquery: SubQuery) -> Self {
        Predicate::Exists {
            subquery: Box::new(subquery),
            negated: false,
        }
    }

    pub fn not_exists(subquery: SubQuery) -> Self {
        Predicate::Exists {
            subquery: Box::new(subquery),
            negated: true,
        }
    }

    /// A verbatim condition. Checked for placeholder/argument parity and
    /// balanced parentheses, and always parenthesised when rendered.
    pub fn raw(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Predicate::Raw(SqlFragment::new(sql, args))
    }

    pub(crate) fn write(&self, writer: &mut SqlWriter) {
        match self {
            Predicate::Compare { column, op, value } => {
                column.write(writer);
                match (op, value) {
                    (CompareOp::Eq, Value::Null) => writer.push(" IS NULL"),
                    (CompareOp::Ne, Value::Null) => writer.push(" IS NOT NULL"),
                    (_, Value::List(_)) => writer.fail(DataError::InvalidQuery(format!(
                        "comparison on {} does not accept a list",
                        column.name()
                    ))),
                    _ => {
                        writer.push(" ");
                        writer.push(op.to_sql());
                        writer.push(" ");
                        writer.push_value(value);
                    }
                }
            }
            Predicate::CompareColumns { left, op, right } => {
                left.write(writer);
                writer.push(" ");
                writer.push(op.to_sql());
                writer.push(" ");
                right.write(writer);
            }
            Predicate::In {
                values, negated, ..
            } if values.is_empty() => {
                // IN () is not valid SQL; an empty set matches nothing.
                writer.push(if *negated { "1 = 1" } else { "1 = 0" });
            }
            Predicate::In {
                column,
                values,
                negated,
            } => {
                column.write(writer);
                writer.push(if *negated { " NOT IN (" } else { " IN (" });
                writer.push_value(&Value::List(values.clone()));
                writer.push(")");
            }
            Predicate::Between { column, low, high } => {
                column.write(writer);
                writer.push(" BETWEEN ");
                writer.push_value(low);
                writer.push(" AND ");
                writer.push_value(high);
            }
            Predicate::IsNull { column, negated } => {
                column.write(writer);
                writer.push(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            Predicate::And(predicates) => write_group(writer, predicates, " AND ", "1 = 1"),
            Predicate::Or(predicates) => write_group(writer, predicates, " OR ", "1 = 0"),
            Predicate::Not(inner) => {
                writer.push("NOT (");
                inner.write(writer);
                writer.push(")");
            }
            Predicate::InSubquery {
                column,
                subquery,
                negated,
            } => {
                column.write(writer);
                writer.push(if *negated { " NOT IN (" } else { " IN (" });
                subquery.write(writer);
                writer.push(")");
            }
            Predicate::Exists { subquery, negated } => {
                writer.push(if *negated { "NOT EXISTS (" } else { "EXISTS (" });
                subquery.write(writer);
                writer.push(")");
            }
            Predicate::Raw(fragment) => {
                writer.push("(");
                fragment.write(writer, "condition");
                writer.push(")");
            }
        }
    }
}

fn write_group(writer: &mut SqlWriter, predicates: &[Predicate], joiner: &str, empty: &str) {
    match predicates {
        [] => writer.push(empty),
        [single] => single.write(writer),
        many => {
            writer.push("(");
            for (i, predicate) in many.iter().enumerate() {
                if i > 0 {
                    writer.push(joiner);
                }
                predicate.write(writer);
            }
            writer.push(")");
        }
    }
}

/// Render a list of predicates joined with AND.
pub(crate) fn write_conjunction(writer: &mut SqlWriter, predicates: &[&Predicate]) {
    for (i, predicate) in predicates.iter().enumerate() {
        if i > 0 {
            writer.push(" AND ");
        }
        predicate.write(writer);
    }
}
