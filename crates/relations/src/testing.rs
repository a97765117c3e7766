//! Testing utilities
//!
//! [`MemoryExecutor`] keeps tables as plain rows and interprets the
//! [`QueryBuilder`] subset the relationship engine emits: inner and left
//! joins, comparisons, `LIKE`, `IN`, null checks, `GROUP BY` with
//! `COUNT(*)`, `DISTINCT`, ordering, `LIMIT` and `OFFSET`. Every statement is
//! rendered and recorded, so tests can assert exactly how many queries a load
//! issued and what they looked like.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, RwLock};

use async_trait::async_trait;
use tracing_subscriber::EnvFilter;

use crate::backends::{DatabaseValue, QueryExecutor, RecordKey, Row};
use crate::error::{ModelError, ModelResult};
use crate::query::{JoinType, OrderDirection, QueryBuilder, QueryOperator, SelectItem, WhereCondition};

/// Install a test-friendly tracing subscriber once per process
///
/// Honours `RUST_LOG`, defaulting to debug output for this crate.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("elif_relations=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Build a row from column/value pairs
pub fn row<const N: usize>(pairs: [(&str, DatabaseValue); N]) -> Row {
    pairs
        .into_iter()
        .map(|(column, value)| (column.to_string(), value))
        .collect()
}

/// In-memory query executor with a statement log
#[derive(Debug, Default)]
pub struct MemoryExecutor {
    tables: RwLock<HashMap<String, Vec<Row>>>,
    log: Mutex<Vec<(String, Vec<DatabaseValue>)>>,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style table seeding; replaces any existing rows of `table`
    pub fn with_table(self, table: &str, rows: Vec<Row>) -> Self {
        {
            let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
            tables.insert(table.to_string(), rows);
        }
        self
    }

    /// Append one row to `table`, creating the table if needed
    pub fn insert(&self, table: &str, row: Row) {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        tables.entry(table.to_string()).or_default().push(row);
    }

    /// Number of statements executed since creation or the last reset
    pub fn query_count(&self) -> usize {
        self.log().len()
    }

    /// SQL of every executed statement, in execution order
    pub fn queries(&self) -> Vec<String> {
        self.log().iter().map(|(sql, _)| sql.clone()).collect()
    }

    /// SQL and parameters of the most recent statement
    pub fn last_query(&self) -> Option<(String, Vec<DatabaseValue>)> {
        self.log().last().cloned()
    }

    pub fn reset_log(&self) {
        self.log().clear();
    }

    fn log(&self) -> MutexGuard<'_, Vec<(String, Vec<DatabaseValue>)>> {
        self.log.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn table(&self, table: &str) -> ModelResult<Vec<Row>> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        tables
            .get(table)
            .cloned()
            .ok_or_else(|| ModelError::Database(format!("relation \"{}\" does not exist", table)))
    }

    fn execute(&self, query: &QueryBuilder) -> ModelResult<Vec<Row>> {
        let from = query
            .from_table()
            .ok_or_else(|| ModelError::Query("SELECT without FROM".to_string()))?;

        let mut scopes: Vec<JoinedRow> = self
            .table(from)?
            .into_iter()
            .map(|row| JoinedRow {
                tables: vec![(from.to_string(), row)],
            })
            .collect();

        for join in query.joins() {
            let rows = self.table(&join.table)?;
            let mut joined = Vec::new();
            for scope in scopes {
                let mut matched = false;
                for candidate in &rows {
                    let mut extended = scope.clone();
                    extended.tables.push((join.table.clone(), candidate.clone()));
                    let on = join.on_conditions.iter().all(|(left, right)| {
                        match (extended.lookup(left).to_key(), extended.lookup(right).to_key()) {
                            (Some(l), Some(r)) => l == r,
                            _ => false,
                        }
                    });
                    if on {
                        matched = true;
                        joined.push(extended);
                    }
                }
                if !matched && join.join_type == JoinType::Left {
                    let mut extended = scope;
                    extended.tables.push((join.table.clone(), Row::new()));
                    joined.push(extended);
                }
            }
            scopes = joined;
        }

        scopes.retain(|scope| query.where_conditions().iter().all(|c| condition_holds(scope, c)));

        for (column, direction) in query.order_by_clauses().iter().rev() {
            scopes.sort_by(|a, b| {
                let ordering = compare_for_sort(a.lookup(column), b.lookup(column));
                match direction {
                    OrderDirection::Asc => ordering,
                    OrderDirection::Desc => ordering.reverse(),
                }
            });
        }

        let aggregated = !query.group_by_columns().is_empty()
            || query
                .select_items()
                .iter()
                .any(|item| matches!(item, SelectItem::CountAll { .. }));

        let mut rows = if aggregated {
            aggregate(query, scopes)
        } else {
            scopes.iter().map(|scope| project(query.select_items(), scope)).collect()
        };

        if query.is_distinct() {
            let mut unique: Vec<Row> = Vec::with_capacity(rows.len());
            for row in rows {
                if !unique.contains(&row) {
                    unique.push(row);
                }
            }
            rows = unique;
        }

        let offset = query.offset_amount().unwrap_or(0).max(0) as usize;
        let rows = rows.into_iter().skip(offset);
        Ok(match query.limit_value() {
            Some(limit) => rows.take(limit.max(0) as usize).collect(),
            None => rows.collect(),
        })
    }
}

#[async_trait]
impl QueryExecutor for MemoryExecutor {
    async fn fetch_all(&self, query: &QueryBuilder) -> ModelResult<Vec<Row>> {
        let (sql, params) = query.to_sql_with_params();
        tracing::trace!(sql = %sql, params = params.len(), "MemoryExecutor query");
        self.log().push((sql, params));
        self.execute(query)
    }
}

/// One row of the FROM table plus the rows joined onto it
#[derive(Debug, Clone)]
struct JoinedRow {
    tables: Vec<(String, Row)>,
}

impl JoinedRow {
    fn lookup(&self, column: &str) -> &DatabaseValue {
        static NULL: DatabaseValue = DatabaseValue::Null;

        match column.split_once('.') {
            Some((table, column)) => self
                .tables
                .iter()
                .find(|(name, _)| name == table)
                .and_then(|(_, row)| row.get(column))
                .unwrap_or(&NULL),
            None => self
                .tables
                .iter()
                .find_map(|(_, row)| row.get(column))
                .unwrap_or(&NULL),
        }
    }

    fn table_row(&self, table: &str) -> Option<&Row> {
        self.tables.iter().find(|(name, _)| name == table).map(|(_, row)| row)
    }
}

fn project(items: &[SelectItem], scope: &JoinedRow) -> Row {
    let mut row = Row::new();
    if items.is_empty() {
        return merged(scope);
    }

    for item in items {
        match item {
            SelectItem::All => {
                for (column, value) in merged(scope) {
                    row.entry(column).or_insert(value);
                }
            }
            SelectItem::AllFrom(table) => {
                if let Some(table_row) = scope.table_row(table) {
                    for (column, value) in table_row {
                        row.insert(column.clone(), value.clone());
                    }
                }
            }
            SelectItem::Column { column, .. } => {
                if let Some(name) = item.output_name() {
                    row.insert(name.to_string(), scope.lookup(column).clone());
                }
            }
            SelectItem::CountAll { alias } => {
                row.insert(alias.clone(), DatabaseValue::Int64(1));
            }
        }
    }
    row
}

/// All joined columns, earlier tables winning on name clashes
fn merged(scope: &JoinedRow) -> Row {
    let mut row = Row::new();
    for (_, table_row) in &scope.tables {
        for (column, value) in table_row {
            row.entry(column.clone()).or_insert_with(|| value.clone());
        }
    }
    row
}

fn aggregate(query: &QueryBuilder, scopes: Vec<JoinedRow>) -> Vec<Row> {
    let mut groups: Vec<(Vec<Option<RecordKey>>, Vec<JoinedRow>)> = Vec::new();

    for scope in scopes {
        let key: Vec<Option<RecordKey>> = query
            .group_by_columns()
            .iter()
            .map(|column| scope.lookup(column).to_key())
            .collect();
        match groups.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, members)) => members.push(scope),
            None => groups.push((key, vec![scope])),
        }
    }

    if groups.is_empty() && query.group_by_columns().is_empty() {
        groups.push((Vec::new(), Vec::new()));
    }

    groups
        .into_iter()
        .map(|(_, members)| {
            let mut row = Row::new();
            for item in query.select_items() {
                match item {
                    SelectItem::CountAll { alias } => {
                        row.insert(alias.clone(), DatabaseValue::Int64(members.len() as i64));
                    }
                    SelectItem::Column { column, .. } => {
                        if let Some(name) = item.output_name() {
                            let value = members
                                .first()
                                .map(|scope| scope.lookup(column).clone())
                                .unwrap_or(DatabaseValue::Null);
                            row.insert(name.to_string(), value);
                        }
                    }
                    SelectItem::All | SelectItem::AllFrom(_) => {}
                }
            }
            row
        })
        .collect()
}

fn condition_holds(scope: &JoinedRow, condition: &WhereCondition) -> bool {
    let actual = scope.lookup(&condition.column);
    let expected = condition.value.as_ref().unwrap_or(&DatabaseValue::Null);

    match condition.operator {
        QueryOperator::Equal => actual.compare(expected) == Some(Ordering::Equal),
        QueryOperator::NotEqual => matches!(actual.compare(expected), Some(o) if o != Ordering::Equal),
        QueryOperator::GreaterThan => actual.compare(expected) == Some(Ordering::Greater),
        QueryOperator::GreaterThanOrEqual => {
            matches!(actual.compare(expected), Some(Ordering::Greater | Ordering::Equal))
        }
        QueryOperator::LessThan => actual.compare(expected) == Some(Ordering::Less),
        QueryOperator::LessThanOrEqual => {
            matches!(actual.compare(expected), Some(Ordering::Less | Ordering::Equal))
        }
        QueryOperator::Like | QueryOperator::NotLike => match (actual, expected) {
            (DatabaseValue::String(value), DatabaseValue::String(pattern)) => {
                like_matches(value, pattern) == (condition.operator == QueryOperator::Like)
            }
            _ => false,
        },
        QueryOperator::In | QueryOperator::NotIn => {
            let Some(key) = actual.to_key() else {
                return false;
            };
            let found = condition.values.iter().any(|value| value.to_key().as_ref() == Some(&key));
            found == (condition.operator == QueryOperator::In)
        }
        QueryOperator::IsNull => actual.is_null(),
        QueryOperator::IsNotNull => !actual.is_null(),
    }
}

/// SQL `LIKE` with `%` and `_` wildcards
fn like_matches(value: &str, pattern: &str) -> bool {
    let value: Vec<char> = value.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    // matches[j]: value[..i] matches pattern[..j]
    let mut matches = vec![false; pattern.len() + 1];
    matches[0] = true;
    for j in 1..=pattern.len() {
        matches[j] = matches[j - 1] && pattern[j - 1] == '%';
    }

    for c in &value {
        let mut next = vec![false; pattern.len() + 1];
        for j in 1..=pattern.len() {
            next[j] = match pattern[j - 1] {
                '%' => next[j - 1] || matches[j],
                '_' => matches[j - 1],
                p => matches[j - 1] && p == *c,
            };
        }
        matches = next;
    }

    matches[pattern.len()]
}

/// NULLs sort first, incomparable values keep their order
fn compare_for_sort(a: &DatabaseValue, b: &DatabaseValue) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.compare(b).unwrap_or(Ordering::Equal),
    }
}

/// A small blog schema used across the crate's tests
pub mod fixtures {
    use super::{row, MemoryExecutor};
    use crate::backends::DatabaseValue::{self, Int64, Null};
    use crate::relationships::{ModelDefinition, RelationshipDeclaration, RelationshipRegistry};

    fn text(value: &str) -> DatabaseValue {
        DatabaseValue::String(value.to_string())
    }

    /// Users, posts, comments, profiles, roles and tags
    ///
    /// - `User`: `posts` (has many), `profile` (has one), `roles` (many to
    ///   many with a `granted_at` pivot column)
    /// - `Post`: `comments` (has many), `tags` (many to many), `author`
    ///   (belongs to `User` through `user_id`)
    /// - `Comment`: `post` (belongs to)
    pub fn blog_registry() -> RelationshipRegistry {
        let registry = RelationshipRegistry::new();
        for model in ["User", "Post", "Comment", "Profile", "Role", "Tag"] {
            registry
                .register_model(ModelDefinition::new(model))
                .expect("fixture model registers");
        }

        let declarations = [
            ("User", RelationshipDeclaration::has_many("posts", "Post")),
            ("User", RelationshipDeclaration::has_one("profile", "Profile")),
            (
                "User",
                RelationshipDeclaration::belongs_to_many("roles", "Role").with_pivot(&["granted_at"]),
            ),
            ("Post", RelationshipDeclaration::has_many("comments", "Comment")),
            ("Post", RelationshipDeclaration::belongs_to_many("tags", "Tag")),
            (
                "Post",
                RelationshipDeclaration::belongs_to("author", "User").foreign_key("user_id"),
            ),
            ("Comment", RelationshipDeclaration::belongs_to("post", "Post")),
        ];
        for (model, declaration) in declarations {
            registry
                .register(model, declaration)
                .expect("fixture relationship registers");
        }

        registry
    }

    /// Rows for [`blog_registry`]
    ///
    /// Alice (1) wrote posts 10 and 12, Bob (2) wrote post 11 and Carol (3)
    /// wrote nothing. Post 13 points at a user that does not exist. Alice is
    /// an admin and an editor, Bob an editor.
    pub fn blog_executor() -> MemoryExecutor {
        MemoryExecutor::new()
            .with_table(
                "users",
                vec![
                    row([("id", Int64(1)), ("name", text("alice"))]),
                    row([("id", Int64(2)), ("name", text("bob"))]),
                    row([("id", Int64(3)), ("name", text("carol"))]),
                ],
            )
            .with_table(
                "posts",
                vec![
                    row([("id", Int64(10)), ("user_id", Int64(1)), ("title", text("Hello"))]),
                    row([("id", Int64(11)), ("user_id", Int64(2)), ("title", text("Ownership"))]),
                    row([("id", Int64(12)), ("user_id", Int64(1)), ("title", text("Lifetimes"))]),
                    row([("id", Int64(13)), ("user_id", Int64(99)), ("title", text("Orphan"))]),
                ],
            )
            .with_table(
                "comments",
                vec![
                    row([("id", Int64(100)), ("post_id", Int64(10)), ("body", text("First"))]),
                    row([("id", Int64(101)), ("post_id", Int64(10)), ("body", text("Nice"))]),
                    row([("id", Int64(102)), ("post_id", Int64(12)), ("body", text("Thanks"))]),
                ],
            )
            .with_table(
                "profiles",
                vec![row([("id", Int64(1)), ("user_id", Int64(1)), ("bio", text("Rustacean"))])],
            )
            .with_table(
                "roles",
                vec![
                    row([("id", Int64(1)), ("name", text("admin"))]),
                    row([("id", Int64(2)), ("name", text("editor"))]),
                ],
            )
            .with_table(
                "role_user",
                vec![
                    row([("user_id", Int64(1)), ("role_id", Int64(1)), ("granted_at", text("2024-01-15"))]),
                    row([("user_id", Int64(1)), ("role_id", Int64(2)), ("granted_at", text("2024-02-01"))]),
                    row([("user_id", Int64(2)), ("role_id", Int64(2)), ("granted_at", text("2024-03-01"))]),
                ],
            )
            .with_table(
                "tags",
                vec![
                    row([("id", Int64(1)), ("name", text("rust"))]),
                    row([("id", Int64(2)), ("name", text("orm"))]),
                    row([("id", Int64(3)), ("name", text("unused")), ("color", Null)]),
                ],
            )
            .with_table(
                "post_tag",
                vec![
                    row([("post_id", Int64(10)), ("tag_id", Int64(1))]),
                    row([("post_id", Int64(10)), ("tag_id", Int64(2))]),
                    row([("post_id", Int64(11)), ("tag_id", Int64(1))]),
                ],
            )
    }
}
