//! Lazy loading of a single relationship on a single record
//!
//! A relation that was never eager loaded reads as [`Loaded::NotLoaded`]
//! through [`Record::relation`]. Fetching it is always an explicit call on
//! [`LazyLoader`]; nothing is queried behind a field access.
//!
//! [`Loaded::NotLoaded`]: crate::record::Loaded::NotLoaded

use crate::backends::QueryExecutor;
use crate::error::{ModelError, ModelResult};
use crate::loading::batch_loader::{attach_empty, attach_pivot_rows, attach_rows, BatchLoader};
use crate::record::{Record, RelationValue};

use super::metadata::RelationshipType;
use super::registry::RelationshipRegistry;

/// Explicit per-record relationship loader
pub struct LazyLoader<'a> {
    registry: &'a RelationshipRegistry,
    executor: &'a dyn QueryExecutor,
}

impl<'a> LazyLoader<'a> {
    pub fn new(registry: &'a RelationshipRegistry, executor: &'a dyn QueryExecutor) -> Self {
        Self { registry, executor }
    }

    /// Load `name` on `record` unless it is already loaded
    pub async fn load<'r>(&self, record: &'r mut Record, name: &str) -> ModelResult<&'r RelationValue> {
        if !record.relation_loaded(name) {
            self.fetch(record, name).await?;
        }
        loaded_value(record, name)
    }

    /// Query `name` for `record` again, replacing any loaded value
    pub async fn reload<'r>(&self, record: &'r mut Record, name: &str) -> ModelResult<&'r RelationValue> {
        self.fetch(record, name).await?;
        loaded_value(record, name)
    }

    async fn fetch(&self, record: &mut Record, name: &str) -> ModelResult<()> {
        let relation = self.registry.resolve(record.model(), name)?;
        let mut loader = BatchLoader::new(self.executor);

        let Some(query) = relation.build_single_query(record) else {
            tracing::debug!(model = %record.model(), relation = %name, "Null parent key; relation is empty");
            attach_empty(&mut [record], &relation);
            return Ok(());
        };

        match relation.relationship_type {
            RelationshipType::ManyToMany => {
                let key = record.value(relation.parent_key_column()).clone();
                let pivot_rows = match relation.build_pivot_query(std::slice::from_ref(&key)) {
                    Some(pivot_query) => loader.fetch(name, &pivot_query, 1).await?,
                    None => Vec::new(),
                };
                let related_rows = loader.fetch(name, &query, 1).await?;
                attach_pivot_rows(&mut [record], &relation, pivot_rows, related_rows);
            }
            _ => {
                let rows = loader.fetch(name, &query, 1).await?;
                attach_rows(&mut [record], &relation, rows);
            }
        }

        Ok(())
    }
}

fn loaded_value<'r>(record: &'r Record, name: &str) -> ModelResult<&'r RelationValue> {
    record.relation(name).value().ok_or_else(|| ModelError::UnknownRelation {
        model: record.model().to_string(),
        relation: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::DatabaseValue;
    use crate::testing::fixtures;

    fn alice() -> Record {
        Record::new("User", "users")
            .with_attribute("id", 1i64)
            .with_attribute("name", "alice")
    }

    #[tokio::test]
    async fn test_load_is_explicit_and_cached() {
        let registry = fixtures::blog_registry();
        let executor = fixtures::blog_executor();
        let lazy = LazyLoader::new(&registry, &executor);
        let mut user = alice();

        assert!(!user.relation("posts").is_loaded());

        let posts = lazy.load(&mut user, "posts").await.unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(executor.query_count(), 1);

        lazy.load(&mut user, "posts").await.unwrap();
        assert_eq!(executor.query_count(), 1);

        lazy.reload(&mut user, "posts").await.unwrap();
        assert_eq!(executor.query_count(), 2);
    }

    #[tokio::test]
    async fn test_single_query_uses_equality() {
        let registry = fixtures::blog_registry();
        let executor = fixtures::blog_executor();
        let lazy = LazyLoader::new(&registry, &executor);
        let mut user = alice();

        lazy.load(&mut user, "profile").await.unwrap();
        let (sql, params) = executor.last_query().unwrap();
        assert_eq!(sql, "SELECT profiles.* FROM profiles WHERE profiles.user_id = $1");
        assert_eq!(params, vec![DatabaseValue::Int64(1)]);
    }

    #[tokio::test]
    async fn test_null_foreign_key_loads_empty_without_query() {
        let registry = fixtures::blog_registry();
        let executor = fixtures::blog_executor();
        let lazy = LazyLoader::new(&registry, &executor);
        let mut post = Record::new("Post", "posts")
            .with_attribute("id", 77i64)
            .with_attribute("user_id", DatabaseValue::Null);

        let author = lazy.load(&mut post, "author").await.unwrap();
        assert_eq!(author, &RelationValue::One(None));
        assert_eq!(executor.query_count(), 0);
    }

    #[tokio::test]
    async fn test_many_to_many_carries_pivot() {
        let registry = fixtures::blog_registry();
        let executor = fixtures::blog_executor();
        let lazy = LazyLoader::new(&registry, &executor);
        let mut bob = Record::new("User", "users").with_attribute("id", 2i64);

        let roles = lazy.load(&mut bob, "roles").await.unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(executor.query_count(), 2);

        let role = roles.records()[0];
        assert_eq!(role.get_str("name"), Some("editor"));
        assert!(role.pivot().is_some());
    }

    #[tokio::test]
    async fn test_unknown_relation_is_configuration_error() {
        let registry = fixtures::blog_registry();
        let executor = fixtures::blog_executor();
        let lazy = LazyLoader::new(&registry, &executor);
        let mut user = alice();

        let err = lazy.load(&mut user, "followers").await.unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(executor.query_count(), 0);
    }
}
