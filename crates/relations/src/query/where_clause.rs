//! Query Builder WHERE clause operations

use super::builder::QueryBuilder;
use super::types::*;
use crate::backends::DatabaseValue;

impl QueryBuilder {
    fn push_condition(mut self, column: &str, operator: QueryOperator, value: Option<DatabaseValue>) -> Self {
        self.where_conditions.push(WhereCondition {
            column: column.to_string(),
            operator,
            value,
            values: Vec::new(),
        });
        self
    }

    /// Add WHERE condition with equality
    pub fn where_eq<T>(self, column: &str, value: T) -> Self
    where
        T: Into<DatabaseValue>,
    {
        self.push_condition(column, QueryOperator::Equal, Some(value.into()))
    }

    /// Add WHERE condition with not equal
    pub fn where_ne<T: Into<DatabaseValue>>(self, column: &str, value: T) -> Self {
        self.push_condition(column, QueryOperator::NotEqual, Some(value.into()))
    }

    /// Add WHERE condition with greater than
    pub fn where_gt<T: Into<DatabaseValue>>(self, column: &str, value: T) -> Self {
        self.push_condition(column, QueryOperator::GreaterThan, Some(value.into()))
    }

    /// Add WHERE condition with greater than or equal
    pub fn where_gte<T: Into<DatabaseValue>>(self, column: &str, value: T) -> Self {
        self.push_condition(column, QueryOperator::GreaterThanOrEqual, Some(value.into()))
    }

    /// Add WHERE condition with less than
    pub fn where_lt<T: Into<DatabaseValue>>(self, column: &str, value: T) -> Self {
        self.push_condition(column, QueryOperator::LessThan, Some(value.into()))
    }

    /// Add WHERE condition with less than or equal
    pub fn where_lte<T: Into<DatabaseValue>>(self, column: &str, value: T) -> Self {
        self.push_condition(column, QueryOperator::LessThanOrEqual, Some(value.into()))
    }

    /// Add WHERE condition with LIKE
    pub fn where_like(self, column: &str, pattern: &str) -> Self {
        self.push_condition(column, QueryOperator::Like, Some(pattern.into()))
    }

    /// Add WHERE condition with NOT LIKE
    pub fn where_not_like(self, column: &str, pattern: &str) -> Self {
        self.push_condition(column, QueryOperator::NotLike, Some(pattern.into()))
    }

    /// Add a WHERE condition with an already parsed operator
    pub fn where_op<T: Into<DatabaseValue>>(self, column: &str, operator: QueryOperator, value: T) -> Self {
        match operator {
            QueryOperator::IsNull | QueryOperator::IsNotNull => self.push_condition(column, operator, None),
            QueryOperator::In | QueryOperator::NotIn => {
                let mut query = self;
                query.where_conditions.push(WhereCondition {
                    column: column.to_string(),
                    operator,
                    value: None,
                    values: vec![value.into()],
                });
                query
            }
            _ => self.push_condition(column, operator, Some(value.into())),
        }
    }

    /// Add WHERE condition with IN
    pub fn where_in<T: Into<DatabaseValue>>(mut self, column: &str, values: Vec<T>) -> Self {
        self.where_conditions.push(WhereCondition {
            column: column.to_string(),
            operator: QueryOperator::In,
            value: None,
            values: values.into_iter().map(|v| v.into()).collect(),
        });
        self
    }

    /// Add WHERE condition with NOT IN
    pub fn where_not_in<T: Into<DatabaseValue>>(mut self, column: &str, values: Vec<T>) -> Self {
        self.where_conditions.push(WhereCondition {
            column: column.to_string(),
            operator: QueryOperator::NotIn,
            value: None,
            values: values.into_iter().map(|v| v.into()).collect(),
        });
        self
    }

    /// Add WHERE condition with IS NULL
    pub fn where_null(self, column: &str) -> Self {
        self.push_condition(column, QueryOperator::IsNull, None)
    }

    /// Add WHERE condition with IS NOT NULL
    pub fn where_not_null(self, column: &str) -> Self {
        self.push_condition(column, QueryOperator::IsNotNull, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_where_in_collects_values() {
        let query = QueryBuilder::new().from("posts").where_in("posts.user_id", vec![1i64, 2, 3]);
        let condition = &query.where_conditions()[0];
        assert_eq!(condition.operator, QueryOperator::In);
        assert_eq!(condition.values.len(), 3);
        assert!(condition.value.is_none());
    }

    #[test]
    fn test_where_op_null_drops_value() {
        let query = QueryBuilder::new().where_op("deleted_at", QueryOperator::IsNull, DatabaseValue::Null);
        assert_eq!(query.where_conditions()[0].value, None);
    }
}
