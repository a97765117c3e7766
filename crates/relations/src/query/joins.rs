//! Query Builder JOIN operations

use super::builder::QueryBuilder;
use super::types::*;

impl QueryBuilder {
    fn push_join(mut self, join_type: JoinType, table: &str, on: &[(&str, &str)]) -> Self {
        self.joins.push(JoinClause {
            join_type,
            table: table.to_string(),
            on_conditions: on
                .iter()
                .map(|(left, right)| (left.to_string(), right.to_string()))
                .collect(),
        });
        self
    }

    /// `INNER JOIN table ON left = right`
    pub fn join(self, table: &str, left: &str, right: &str) -> Self {
        self.push_join(JoinType::Inner, table, &[(left, right)])
    }

    /// `LEFT JOIN table ON left = right`
    pub fn left_join(self, table: &str, left: &str, right: &str) -> Self {
        self.push_join(JoinType::Left, table, &[(left, right)])
    }

    /// Inner join on several column pairs, combined with AND
    pub fn join_on(self, table: &str, on: &[(&str, &str)]) -> Self {
        self.push_join(JoinType::Inner, table, on)
    }
}
