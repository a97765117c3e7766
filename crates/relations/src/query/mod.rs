//! Query Builder Module - fluent SELECT builder used by relationship queries

pub mod builder;
pub mod joins;
pub mod ordering;
pub mod select;
pub mod sql_generation;
pub mod types;
pub mod where_clause;
pub mod with;

pub use builder::QueryBuilder;
pub use types::{JoinClause, JoinType, OrderDirection, QueryOperator, SelectItem, WhereCondition};
pub use with::ModelQuery;
