//! # Query Builder System
//!
//! Composable, parameterised query construction for the repository layer.
//!
//! ## Key Components
//!
//! - [`value`] - bound values and the single SQL rendering boundary
//! - [`conditions`] - typed predicate algebra (`Predicate`, `Column`)
//! - [`operators`] - form-style per-column operator filters
//! - [`joins`] - JOIN clause management (INNER, LEFT, CROSS, raw)
//! - [`pagination`] - LIMIT/OFFSET, total-count handles and `Page<T>`
//! - [`builder`] - the statement accumulator and sub-queries
//! - [`processors`] - `QueryProcessor`, the named transforms callers compose
//!
//! Identifiers are validated and values are always bound through `?`
//! placeholders. Verbatim fragments remain available for the cases the
//! algebra does not cover; they are checked for placeholder/argument parity
//! and balanced parentheses, and are parenthesised when combined.

pub mod builder;
pub mod conditions;
pub mod joins;
pub mod operators;
pub mod pagination;
pub mod processors;
pub mod value;

pub use builder::{QueryBuilder, SubQuery};
pub use conditions::{Column, CompareOp, Predicate, SqlFragment};
pub use joins::{Join, JoinType};
pub use operators::{FieldFilter, Joiner, Operator};
pub use pagination::{Page, Pagination, TotalCount};
pub use processors::{sub_query, QueryProcessor};
pub use value::{Rendered, Value};
