//! Query Builder ORDER BY, GROUP BY, LIMIT and OFFSET operations

use super::builder::QueryBuilder;
use super::types::*;

impl QueryBuilder {
    /// Order by `column` in an explicit direction
    pub fn order_by_direction(mut self, column: &str, direction: OrderDirection) -> Self {
        self.order_by.push((column.to_string(), direction));
        self
    }

    pub fn order_by(self, column: &str) -> Self {
        self.order_by_direction(column, OrderDirection::Asc)
    }

    pub fn order_by_desc(self, column: &str) -> Self {
        self.order_by_direction(column, OrderDirection::Desc)
    }

    pub fn group_by(mut self, column: &str) -> Self {
        self.group_by.push(column.to_string());
        self
    }

    pub fn limit(mut self, count: i64) -> Self {
        self.limit_count = Some(count);
        self
    }

    pub fn offset(mut self, count: i64) -> Self {
        self.offset_value = Some(count);
        self
    }

    /// LIMIT/OFFSET for a 1-based page
    pub fn for_page(self, page: i64, per_page: i64) -> Self {
        let page = page.max(1);
        self.offset((page - 1) * per_page).limit(per_page)
    }
}
