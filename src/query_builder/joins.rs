use super::conditions::{Predicate, SqlFragment};
use super::value::SqlWriter;

/// Represents different types of SQL JOINs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Cross,
}

impl JoinType {
    pub fn to_sql(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Cross => "CROSS JOIN",
        }
    }
}

#[derive(Debug, Clone)]
enum JoinClause {
    Typed {
        join_type: JoinType,
        table: String,
        alias: Option<String>,
        on: Option<Predicate>,
    },
    Raw(SqlFragment),
}

/// Represents a SQL JOIN clause
#[derive(Debug, Clone)]
pub struct Join {
    clause: JoinClause,
}

impl Join {
    /// Create an INNER JOIN
    pub fn inner(table: &str, on: Predicate) -> Self {
        Self::typed(JoinType::Inner, table, None, Some(on))
    }

    /// Create a LEFT JOIN
    pub fn left(table: &str, on: Predicate) -> Self {
        Self::typed(JoinType::Left, table, None, Some(on))
    }

    /// Create a CROSS JOIN
    pub fn cross(table: &str) -> Self {
        Self::typed(JoinType::Cross, table, None, None)
    }

    /// A join clause written verbatim, e.g. `"LEFT JOIN tags t ON t.id = mt.tag_id"`.
    pub fn raw(clause: impl Into<String>) -> Self {
        Self {
            clause: JoinClause::Raw(SqlFragment::new(clause, Vec::new())),
        }
    }

    fn typed(join_type: JoinType, table: &str, alias: Option<String>, on: Option<Predicate>) -> Self {
        Self {
            clause: JoinClause::Typed {
                join_type,
                table: table.to_string(),
                alias,
                on,
            },
        }
    }

    /// Alias the joined table: `INNER JOIN module_tags AS mt`.
    pub fn alias(mut self, name: &str) -> Self {
        if let JoinClause::Typed { alias, .. } = &mut self.clause {
            *alias = Some(name.to_string());
        }
        self
    }

    pub(crate) fn write(&self, writer: &mut SqlWriter) {
        match &self.clause {
            JoinClause::Typed {
                join_type,
                table,
                alias,
                on,
            } => {
                writer.push(join_type.to_sql());
                writer.push(" ");
                writer.push_identifier(table);
                if let Some(alias) = alias {
                    writer.push(" AS ");
                    writer.push_identifier(alias);
                }
                if let Some(on) = on {
                    writer.push(" ON ");
                    on.write(writer);
                }
            }
            JoinClause::Raw(fragment) => fragment.write(writer, "join"),
        }
    }
}
