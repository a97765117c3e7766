//! Query Builder WITH Methods - Eager loading integration for model queries

use crate::backends::QueryExecutor;
use crate::error::ModelResult;
use crate::loading::{EagerLoadConfig, EagerLoadStats, EagerLoader};
use crate::query::QueryBuilder;
use crate::record::Record;
use crate::relationships::{ModelDefinition, RelationshipRegistry};

/// A query over one registered model, with eager loading attached
///
/// The model's default eager relations are loaded unless removed with
/// [`ModelQuery::without`].
pub struct ModelQuery<'r> {
    registry: &'r RelationshipRegistry,
    model: ModelDefinition,
    query: QueryBuilder,
    eager_loader: EagerLoader,
}

impl<'r> ModelQuery<'r> {
    /// Start a query selecting every column of `model`'s table
    pub fn new(registry: &'r RelationshipRegistry, model: &str) -> ModelResult<Self> {
        let model = registry.model(model)?;
        let query = QueryBuilder::new().from(&model.table).select_all_from(&model.table);
        Ok(Self {
            registry,
            model,
            query,
            eager_loader: EagerLoader::new().with_defaults(),
        })
    }

    pub fn model(&self) -> &ModelDefinition {
        &self.model
    }

    /// The base query, without eager loading
    pub fn base_query(&self) -> &QueryBuilder {
        &self.query
    }

    /// Refine the base query
    pub fn filter<F>(mut self, refine: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.query = refine(self.query);
        self
    }

    /// Add a relationship to eagerly load
    pub fn with(mut self, relation: &str) -> Self {
        self.eager_loader = self.eager_loader.with(relation);
        self
    }

    /// Add a relationship with constraints
    pub fn with_where<F>(mut self, relation: &str, constraint: F) -> Self
    where
        F: Fn(QueryBuilder) -> QueryBuilder + Send + Sync + 'static,
    {
        self.eager_loader = self.eager_loader.with_where(relation, constraint);
        self
    }

    /// Add conditional eager loading
    pub fn with_when(mut self, condition: bool, relation: &str) -> Self {
        self.eager_loader = self.eager_loader.with_when(condition, relation);
        self
    }

    /// Load relationship counts without loading the relationships
    pub fn with_count(mut self, relation: &str) -> Self {
        self.eager_loader = self.eager_loader.with_count(relation);
        self
    }

    /// Load relationship counts with constraints and custom alias
    pub fn with_count_where<F>(mut self, alias: &str, relation: &str, constraint: F) -> Self
    where
        F: Fn(QueryBuilder) -> QueryBuilder + Send + Sync + 'static,
    {
        self.eager_loader = self.eager_loader.with_count_where(alias, relation, constraint);
        self
    }

    /// Skip a relationship, including a default eager one
    pub fn without(mut self, relation: &str) -> Self {
        self.eager_loader = self.eager_loader.without(relation);
        self
    }

    /// Set maximum depth and query logging for the eager loads
    pub fn eager_config(mut self, config: EagerLoadConfig) -> Self {
        self.eager_loader = self.eager_loader.with_config(config);
        self
    }

    /// Execute the query and return records with eagerly loaded relationships
    pub async fn get(self, executor: &dyn QueryExecutor) -> ModelResult<Vec<Record>> {
        let (records, _) = self.get_with_stats(executor).await?;
        Ok(records)
    }

    /// Like [`ModelQuery::get`], also returning eager loading statistics
    ///
    /// Every relation path is planned before the base query runs.
    pub async fn get_with_stats(self, executor: &dyn QueryExecutor) -> ModelResult<(Vec<Record>, EagerLoadStats)> {
        let prepared = self.eager_loader.prepare(self.registry, &self.model.name)?;

        let rows = executor.fetch_all(&self.query).await?;
        let mut records: Vec<Record> = rows
            .into_iter()
            .map(|row| Record::from_row(&self.model.name, &self.model.table, row))
            .collect();

        tracing::debug!(model = %self.model.name, records = records.len(), "Base query returned");

        let stats = self
            .eager_loader
            .execute(&prepared, executor, &mut records, false)
            .await?;
        Ok((records, stats))
    }

    /// Execute the query and return the first record with eagerly loaded relationships
    pub async fn first(mut self, executor: &dyn QueryExecutor) -> ModelResult<Option<Record>> {
        self.query = self.query.limit(1);
        let records = self.get(executor).await?;
        Ok(records.into_iter().next())
    }
}
