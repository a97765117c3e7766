//! Relationship counts
//!
//! `with_count("posts")` stores `posts_count` on every parent from a single
//! grouped `COUNT(*)` query. Related rows are never loaded.

use std::collections::HashMap;

use crate::backends::RecordKey;
use crate::error::ModelResult;
use crate::record::Record;
use crate::relationships::{RelationshipMetadata, AGGREGATE_ALIAS, RELATION_KEY_ALIAS};

use super::batch_loader::{apply_scope, collect_keys, BatchLoader};
use super::plan::RelationScope;

/// Default alias under which a relation's count is stored
pub fn count_alias(relation: &str) -> String {
    format!("{}_count", relation)
}

/// Runs grouped count queries through a [`BatchLoader`]
pub struct CountAggregator<'a, 'e> {
    loader: &'a mut BatchLoader<'e>,
}

impl<'a, 'e> CountAggregator<'a, 'e> {
    pub fn new(loader: &'a mut BatchLoader<'e>) -> Self {
        Self { loader }
    }

    /// Store the number of related rows of `relation` on every parent
    ///
    /// Parents absent from the grouped result get `0`. To-one relations are
    /// clamped to `0` or `1` so the count agrees with the loaded value.
    pub async fn attach_counts(
        &mut self,
        parents: &mut [&mut Record],
        relation: &RelationshipMetadata,
        alias: &str,
        scope: Option<&RelationScope>,
    ) -> ModelResult<()> {
        let parent_key = relation.parent_key_column();
        let keys = collect_keys(parents, parent_key);

        let mut counts: HashMap<RecordKey, i64> = HashMap::new();
        if !keys.is_empty() {
            let query = apply_scope(relation.build_count_query(&keys), scope);
            let rows = self.loader.fetch(&relation.name, &query, keys.len()).await?;

            for row in rows {
                let key = row.get(RELATION_KEY_ALIAS).and_then(|value| value.to_key());
                let count = row.get(AGGREGATE_ALIAS).and_then(|value| value.as_i64());
                if let (Some(key), Some(count)) = (key, count) {
                    *counts.entry(key).or_insert(0) += count;
                }
            }
        } else {
            tracing::debug!(relation = %relation.name, alias = %alias, "No parent keys; counts are zero");
        }

        let is_collection = relation.relationship_type.is_collection();
        for parent in parents.iter_mut() {
            let count = parent
                .key(parent_key)
                .and_then(|key| counts.get(&key).copied())
                .unwrap_or(0);
            let count = if is_collection { count } else { count.min(1) };
            parent.set_count(alias, count);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::QueryExecutor;
    use crate::query::QueryBuilder;
    use crate::testing::{fixtures, MemoryExecutor};

    async fn users(executor: &MemoryExecutor) -> Vec<Record> {
        let rows = executor
            .fetch_all(&QueryBuilder::new().from("users").order_by("users.id"))
            .await
            .unwrap();
        executor.reset_log();
        rows.into_iter().map(|row| Record::from_row("User", "users", row)).collect()
    }

    #[tokio::test]
    async fn test_counts_with_zero_fill() {
        let registry = fixtures::blog_registry();
        let executor = fixtures::blog_executor();
        let mut records = users(&executor).await;
        let relation = registry.resolve("User", "posts").unwrap();

        let mut loader = BatchLoader::new(&executor);
        let mut parents: Vec<&mut Record> = records.iter_mut().collect();
        CountAggregator::new(&mut loader)
            .attach_counts(&mut parents, &relation, "posts_count", None)
            .await
            .unwrap();

        assert_eq!(loader.query_count(), 1);
        let counts: Vec<Option<i64>> = records.iter().map(|r| r.count("posts_count")).collect();
        assert_eq!(counts, vec![Some(2), Some(1), Some(0)]);
        assert!(records.iter().all(|r| !r.relation_loaded("posts")));
    }

    #[tokio::test]
    async fn test_scoped_many_to_many_count() {
        let registry = fixtures::blog_registry();
        let executor = fixtures::blog_executor();
        let mut records = users(&executor).await;
        let relation = registry.resolve("User", "roles").unwrap();
        let scope: RelationScope = std::sync::Arc::new(|q: QueryBuilder| q.where_eq("roles.name", "admin"));

        let mut loader = BatchLoader::new(&executor);
        let mut parents: Vec<&mut Record> = records.iter_mut().collect();
        CountAggregator::new(&mut loader)
            .attach_counts(&mut parents, &relation, "admin_roles", Some(&scope))
            .await
            .unwrap();

        let counts: Vec<Option<i64>> = records.iter().map(|r| r.count("admin_roles")).collect();
        assert_eq!(counts, vec![Some(1), Some(0), Some(0)]);
    }

    #[tokio::test]
    async fn test_null_keys_count_zero_without_query() {
        let registry = fixtures::blog_registry();
        let executor = fixtures::blog_executor();
        let relation = registry.resolve("Post", "author").unwrap();

        let mut orphan = Record::new("Post", "posts")
            .with_attribute("id", 50i64)
            .with_attribute("user_id", crate::backends::DatabaseValue::Null);
        let mut loader = BatchLoader::new(&executor);
        CountAggregator::new(&mut loader)
            .attach_counts(&mut [&mut orphan], &relation, "author_count", None)
            .await
            .unwrap();

        assert_eq!(executor.query_count(), 0);
        assert_eq!(orphan.count("author_count"), Some(0));
    }

    #[test]
    fn test_count_alias() {
        assert_eq!(count_alias("comments"), "comments_count");
    }
}
