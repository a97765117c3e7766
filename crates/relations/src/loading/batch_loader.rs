//! Batch resolution of one relationship for many parents
//!
//! One relation over one batch of parents costs one query, or two for
//! many-to-many (pivot rows, then related rows), however large the batch.
//! Results are redistributed onto the parents in memory.

use std::collections::{HashMap, HashSet};

use crate::backends::{DatabaseValue, QueryExecutor, RecordKey, Row};
use crate::error::ModelResult;
use crate::query::QueryBuilder;
use crate::record::{Record, RelationValue};
use crate::relationships::{RelationshipMetadata, RelationshipType};

use super::plan::RelationScope;

/// Batch loader for efficient relationship loading
pub struct BatchLoader<'e> {
    executor: &'e dyn QueryExecutor,
    log_queries: bool,
    query_count: usize,
}

impl<'e> BatchLoader<'e> {
    pub fn new(executor: &'e dyn QueryExecutor) -> Self {
        Self {
            executor,
            log_queries: false,
            query_count: 0,
        }
    }

    /// Log the SQL of every issued query at debug level
    pub fn with_query_logging(mut self, enabled: bool) -> Self {
        self.log_queries = enabled;
        self
    }

    /// Number of queries issued so far
    pub fn query_count(&self) -> usize {
        self.query_count
    }

    /// Resolve `relation` for every parent, replacing any previous value
    ///
    /// Returns the number of related rows fetched. Parents without a match,
    /// including parents whose key is null, receive an explicit empty value.
    pub async fn resolve(
        &mut self,
        parents: &mut [&mut Record],
        relation: &RelationshipMetadata,
        scope: Option<&RelationScope>,
    ) -> ModelResult<usize> {
        let keys = collect_keys(parents, relation.parent_key_column());

        if keys.is_empty() {
            tracing::debug!(
                relation = %relation.name,
                parents = parents.len(),
                "No parent keys; attaching empty results without a query"
            );
            attach_empty(parents, relation);
            return Ok(0);
        }

        let related_query = apply_scope(relation.build_eager_query(&keys), scope);

        match relation.build_pivot_query(&keys) {
            Some(pivot_query) if relation.relationship_type == RelationshipType::ManyToMany => {
                let pivot_query = apply_scope(pivot_query, scope);
                let pivot_rows = self.fetch(&relation.name, &pivot_query, keys.len()).await?;
                let related_rows = self.fetch(&relation.name, &related_query, keys.len()).await?;
                Ok(attach_pivot_rows(parents, relation, pivot_rows, related_rows))
            }
            _ => {
                let rows = self.fetch(&relation.name, &related_query, keys.len()).await?;
                let fetched = rows.len();
                attach_rows(parents, relation, rows);
                Ok(fetched)
            }
        }
    }

    /// Run one query through the executor, counting and logging it
    pub(crate) async fn fetch(
        &mut self,
        relation_name: &str,
        query: &QueryBuilder,
        key_count: usize,
    ) -> ModelResult<Vec<Row>> {
        self.query_count += 1;

        if self.log_queries {
            let (sql, params) = query.to_sql_with_params();
            tracing::debug!(
                relation = %relation_name,
                keys = key_count,
                params = params.len(),
                sql = %sql,
                "Executing relation query"
            );
        } else {
            tracing::debug!(relation = %relation_name, keys = key_count, "Executing relation query");
        }

        let rows = self.executor.fetch_all(query).await?;
        tracing::trace!(relation = %relation_name, rows = rows.len(), "Relation query returned");
        Ok(rows)
    }
}

pub(crate) fn apply_scope(query: QueryBuilder, scope: Option<&RelationScope>) -> QueryBuilder {
    match scope {
        Some(scope) => scope(query),
        None => query,
    }
}

/// Distinct non-null key values of `column`, in first-seen order
pub(crate) fn collect_keys(parents: &[&mut Record], column: &str) -> Vec<DatabaseValue> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();

    for parent in parents {
        let value = parent.value(column);
        if let Some(key) = value.to_key() {
            if seen.insert(key) {
                keys.push(value.clone());
            }
        }
    }

    keys
}

pub(crate) fn attach_empty(parents: &mut [&mut Record], relation: &RelationshipMetadata) {
    let empty = RelationValue::empty(relation.relationship_type.is_collection());
    for parent in parents.iter_mut() {
        parent.set_relation(&relation.name, empty.clone());
    }
}

/// Attach related rows matched on the relation's join key
///
/// To-one relations keep the first matching row in result order.
pub(crate) fn attach_rows(parents: &mut [&mut Record], relation: &RelationshipMetadata, rows: Vec<Row>) {
    let related_key = relation.related_key_column();
    let mut dictionary: HashMap<RecordKey, Vec<Record>> = HashMap::new();

    for row in rows {
        let record = Record::from_row(&relation.related_model, &relation.related_table, row);
        if let Some(key) = record.key(related_key) {
            dictionary.entry(key).or_default().push(record);
        }
    }

    let is_collection = relation.relationship_type.is_collection();
    for parent in parents.iter_mut() {
        let matches = parent
            .key(relation.parent_key_column())
            .and_then(|key| dictionary.get(&key));

        let value = match (is_collection, matches) {
            (true, Some(records)) => RelationValue::Many(records.clone()),
            (false, Some(records)) => RelationValue::One(records.first().cloned().map(Box::new)),
            (_, None) => RelationValue::empty(is_collection),
        };
        parent.set_relation(&relation.name, value);
    }
}

/// Attach many-to-many results through the pivot rows
///
/// Related rows are deduplicated by key. Each pivot row then places a copy
/// of its related record on its parent, in pivot result order, carrying that
/// pivot row's attributes. Pivot rows whose related record was not returned
/// are dropped. Returns the number of distinct related records.
pub(crate) fn attach_pivot_rows(
    parents: &mut [&mut Record],
    relation: &RelationshipMetadata,
    pivot_rows: Vec<Row>,
    related_rows: Vec<Row>,
) -> usize {
    let Some(pivot) = relation.pivot_config.as_ref() else {
        attach_empty(parents, relation);
        return 0;
    };

    let mut related: HashMap<RecordKey, Record> = HashMap::new();
    for row in related_rows {
        let record = Record::from_row(&relation.related_model, &relation.related_table, row);
        if let Some(key) = record.key(&pivot.related_key) {
            related.entry(key).or_insert(record);
        }
    }

    let mut by_parent: HashMap<RecordKey, Vec<Record>> = HashMap::new();
    for mut row in pivot_rows {
        let parent_key = row.get(&pivot.foreign_pivot_key).and_then(DatabaseValue::to_key);
        let record = row
            .get(&pivot.related_pivot_key)
            .and_then(DatabaseValue::to_key)
            .and_then(|key| related.get(&key));
        let (Some(parent_key), Some(record)) = (parent_key, record) else {
            continue;
        };

        let mut attributes = HashMap::new();
        for column in [pivot.foreign_pivot_key.clone(), pivot.related_pivot_key.clone()]
            .into_iter()
            .chain(pivot.pivot_columns())
        {
            let value = row.remove(&column).unwrap_or(DatabaseValue::Null);
            attributes.insert(column, value);
        }

        let mut copy = record.clone();
        copy.set_pivot(attributes);
        by_parent.entry(parent_key).or_default().push(copy);
    }

    for parent in parents.iter_mut() {
        let records = parent
            .key(relation.parent_key_column())
            .and_then(|key| by_parent.get(&key))
            .cloned()
            .unwrap_or_default();
        parent.set_relation(&relation.name, RelationValue::Many(records));
    }

    related.len()
}
