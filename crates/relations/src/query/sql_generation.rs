//! Query Builder SQL generation

use super::builder::QueryBuilder;
use super::types::*;
use crate::backends::DatabaseValue;

impl QueryBuilder {
    /// Generate SQL from query with parameter placeholders and return parameters
    pub fn to_sql_with_params(&self) -> (String, Vec<DatabaseValue>) {
        let mut sql = String::new();
        let mut params = Vec::new();
        let mut param_counter = 1;

        // SELECT clause
        if self.distinct {
            sql.push_str("SELECT DISTINCT ");
        } else {
            sql.push_str("SELECT ");
        }

        if self.select_items.is_empty() {
            sql.push('*');
        } else {
            let items: Vec<String> = self.select_items.iter().map(|item| item.to_string()).collect();
            sql.push_str(&items.join(", "));
        }

        // FROM clause
        if let Some(table) = &self.from_table {
            sql.push_str(" FROM ");
            sql.push_str(table);
        }

        // JOIN clauses
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(&join.join_type.to_string());
            sql.push(' ');
            sql.push_str(&join.table);
            sql.push_str(" ON ");
            for (i, (left, right)) in join.on_conditions.iter().enumerate() {
                if i > 0 {
                    sql.push_str(" AND ");
                }
                sql.push_str(&format!("{} = {}", left, right));
            }
        }

        self.build_where_clause(&mut sql, &mut params, &mut param_counter);

        // GROUP BY clause
        if !self.group_by.is_empty() {
            sql.push_str(&format!(" GROUP BY {}", self.group_by.join(", ")));
        }

        self.build_order_limit_clause(&mut sql);

        (sql, params)
    }

    /// Convert the query to an SQL string with `$n` placeholders
    pub fn to_sql(&self) -> String {
        self.to_sql_with_params().0
    }

    /// Helper method to build WHERE clauses
    fn build_where_clause(&self, sql: &mut String, params: &mut Vec<DatabaseValue>, param_counter: &mut i32) {
        if self.where_conditions.is_empty() {
            return;
        }

        sql.push_str(" WHERE ");
        for (i, condition) in self.where_conditions.iter().enumerate() {
            if i > 0 {
                sql.push_str(" AND ");
            }

            // An empty IN list matches nothing; NOT IN () matches everything
            if condition.values.is_empty() {
                match condition.operator {
                    QueryOperator::In => {
                        sql.push_str("1 = 0");
                        continue;
                    }
                    QueryOperator::NotIn => {
                        sql.push_str("1 = 1");
                        continue;
                    }
                    _ => {}
                }
            }

            sql.push_str(&condition.column);
            sql.push(' ');

            match condition.operator {
                QueryOperator::In | QueryOperator::NotIn => {
                    sql.push_str(&condition.operator.to_string());
                    sql.push_str(" (");
                    for (j, value) in condition.values.iter().enumerate() {
                        if j > 0 {
                            sql.push_str(", ");
                        }
                        sql.push_str(&format!("${}", param_counter));
                        params.push(value.clone());
                        *param_counter += 1;
                    }
                    sql.push(')');
                }
                QueryOperator::IsNull | QueryOperator::IsNotNull => {
                    sql.push_str(&condition.operator.to_string());
                }
                _ => {
                    sql.push_str(&condition.operator.to_string());
                    match &condition.value {
                        Some(value) if !value.is_null() => {
                            sql.push_str(&format!(" ${}", param_counter));
                            params.push(value.clone());
                            *param_counter += 1;
                        }
                        _ => sql.push_str(" NULL"),
                    }
                }
            }
        }
    }

    /// Helper method to build ORDER BY and LIMIT clauses
    fn build_order_limit_clause(&self, sql: &mut String) {
        // ORDER BY clause
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            for (i, (column, direction)) in self.order_by.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push_str(&format!("{} {}", column, direction));
            }
        }

        // LIMIT clause
        if let Some(limit) = self.limit_count {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        // OFFSET clause
        if let Some(offset) = self.offset_value {
            sql.push_str(&format!(" OFFSET {}", offset));
        }
    }
}
