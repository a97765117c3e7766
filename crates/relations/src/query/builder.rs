//! Query Builder - Core builder implementation

use super::types::*;

/// Fluent SELECT builder shared by relationship descriptors and executors
///
/// Fields are crate-visible so executors can interpret the structured query
/// instead of re-parsing generated SQL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryBuilder {
    pub(crate) select_items: Vec<SelectItem>,
    pub(crate) from_table: Option<String>,
    pub(crate) where_conditions: Vec<WhereCondition>,
    pub(crate) joins: Vec<JoinClause>,
    pub(crate) order_by: Vec<(String, OrderDirection)>,
    pub(crate) group_by: Vec<String>,
    pub(crate) limit_count: Option<i64>,
    pub(crate) offset_value: Option<i64>,
    pub(crate) distinct: bool,
}

impl QueryBuilder {
    /// Create a new query builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Projected items, in order
    pub fn select_items(&self) -> &[SelectItem] {
        &self.select_items
    }

    /// The FROM table, if set
    pub fn from_table(&self) -> Option<&str> {
        self.from_table.as_deref()
    }

    /// WHERE conditions, joined with AND
    pub fn where_conditions(&self) -> &[WhereCondition] {
        &self.where_conditions
    }

    pub fn joins(&self) -> &[JoinClause] {
        &self.joins
    }

    pub fn order_by_clauses(&self) -> &[(String, OrderDirection)] {
        &self.order_by
    }

    pub fn group_by_columns(&self) -> &[String] {
        &self.group_by
    }

    pub fn limit_value(&self) -> Option<i64> {
        self.limit_count
    }

    pub fn offset_amount(&self) -> Option<i64> {
        self.offset_value
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }
}
