//! Query Builder SELECT operations

use super::builder::QueryBuilder;
use super::types::SelectItem;

impl QueryBuilder {
    /// Add SELECT fields to the query
    ///
    /// Accepts a comma separated list; `table.*` and `col AS alias` are
    /// recognised.
    pub fn select(mut self, fields: &str) -> Self {
        for field in fields.split(',').map(str::trim).filter(|f| !f.is_empty()) {
            self.select_items.push(parse_select_item(field));
        }
        self
    }

    /// Add SELECT DISTINCT to the query
    pub fn select_distinct(mut self, fields: &str) -> Self {
        self.distinct = true;
        self.select(fields)
    }

    /// Select every column of one table
    pub fn select_all_from(mut self, table: &str) -> Self {
        self.select_items.push(SelectItem::AllFrom(table.to_string()));
        self
    }

    /// Add a column with an explicit alias
    pub fn select_as(mut self, column: &str, alias: &str) -> Self {
        self.select_items.push(SelectItem::Column {
            column: column.to_string(),
            alias: Some(alias.to_string()),
        });
        self
    }

    /// Add `COUNT(*) AS alias`
    pub fn select_count(mut self, alias: &str) -> Self {
        self.select_items.push(SelectItem::CountAll {
            alias: alias.to_string(),
        });
        self
    }

    /// Mark the query DISTINCT without touching the projection
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Set the FROM table
    pub fn from(mut self, table: &str) -> Self {
        self.from_table = Some(table.to_string());
        self
    }
}

fn parse_select_item(field: &str) -> SelectItem {
    if field == "*" {
        return SelectItem::All;
    }
    if let Some(table) = field.strip_suffix(".*") {
        return SelectItem::AllFrom(table.to_string());
    }

    let upper = field.to_ascii_uppercase();
    if let Some(pos) = upper.find(" AS ") {
        let (expr, alias) = (field[..pos].trim(), field[pos + 4..].trim());
        if expr.eq_ignore_ascii_case("COUNT(*)") {
            return SelectItem::CountAll {
                alias: alias.to_string(),
            };
        }
        return SelectItem::Column {
            column: expr.to_string(),
            alias: Some(alias.to_string()),
        };
    }

    SelectItem::Column {
        column: field.to_string(),
        alias: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_parses_items() {
        let query = QueryBuilder::new().select("posts.*, posts.id AS relation_key, title");
        assert_eq!(
            query.select_items(),
            &[
                SelectItem::AllFrom("posts".to_string()),
                SelectItem::Column {
                    column: "posts.id".to_string(),
                    alias: Some("relation_key".to_string()),
                },
                SelectItem::Column {
                    column: "title".to_string(),
                    alias: None,
                },
            ]
        );
    }

    #[test]
    fn test_select_count_alias() {
        let query = QueryBuilder::new().select("COUNT(*) AS aggregate");
        assert_eq!(
            query.select_items(),
            &[SelectItem::CountAll {
                alias: "aggregate".to_string()
            }]
        );
    }
}
