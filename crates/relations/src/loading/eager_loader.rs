//! Eager loading orchestration
//!
//! [`EagerLoader`] collects relation requests (`with`, `with_count`, ...),
//! plans them against the registry and resolves the plan breadth-first over
//! an already-loaded batch of records. Every depth-*d* relation is resolved
//! before any depth-*d+1* relation, and the parent batch of a nested relation
//! is everything its parent relation attached across the whole batch.

use std::time::Instant;

use crate::backends::QueryExecutor;
use crate::error::{ModelError, ModelResult};
use crate::query::QueryBuilder;
use crate::record::Record;
use crate::relationships::{RelationshipMetadata, RelationshipRegistry};

use super::batch_loader::BatchLoader;
use super::config::EagerLoadConfig;
use super::counts::{count_alias, CountAggregator};
use super::plan::{EagerLoadSpec, LoadPlanNode, LoadPlanner, RelationScope};

/// Statistics about the eager loading operation
#[derive(Debug, Clone, Default)]
pub struct EagerLoadStats {
    /// Total execution time in milliseconds
    pub execution_time_ms: u64,
    /// Number of database queries executed
    pub query_count: usize,
    /// Total related records fetched
    pub records_loaded: usize,
    /// Number of relationship levels loaded
    pub depth_loaded: usize,
    /// Number of count aliases attached
    pub counts_attached: usize,
}

/// One requested relationship count
#[derive(Clone)]
struct CountSpec {
    relation: String,
    alias: String,
    scope: Option<RelationScope>,
}

/// A validated load, ready to run against a batch
pub(crate) struct PreparedLoad {
    root_model: String,
    plan: Vec<LoadPlanNode>,
    counts: Vec<(RelationshipMetadata, CountSpec)>,
}

impl PreparedLoad {
    pub(crate) fn is_empty(&self) -> bool {
        self.plan.is_empty() && self.counts.is_empty()
    }
}

/// Eager loader for relationships and relationship counts
#[derive(Clone, Default)]
pub struct EagerLoader {
    specs: Vec<EagerLoadSpec>,
    counts: Vec<CountSpec>,
    without: Vec<String>,
    include_defaults: bool,
    config: EagerLoadConfig,
}

impl EagerLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: EagerLoadConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EagerLoadConfig {
        &self.config
    }

    /// Request a relation path such as `posts` or `posts.comments`
    pub fn with(mut self, path: &str) -> Self {
        self.specs.push(EagerLoadSpec::new(path));
        self
    }

    /// Request a relation path whose last relation is queried through `scope`
    pub fn with_where<F>(mut self, path: &str, scope: F) -> Self
    where
        F: Fn(QueryBuilder) -> QueryBuilder + Send + Sync + 'static,
    {
        self.specs.push(EagerLoadSpec::scoped(path, scope));
        self
    }

    /// Request a relation path only when `condition` holds
    pub fn with_when(self, condition: bool, path: &str) -> Self {
        if condition {
            self.with(path)
        } else {
            self
        }
    }

    /// Count `relation` into `<relation>_count`
    pub fn with_count(mut self, relation: &str) -> Self {
        self.counts.push(CountSpec {
            relation: relation.to_string(),
            alias: count_alias(relation),
            scope: None,
        });
        self
    }

    /// Count `relation` through `scope` into `alias`
    pub fn with_count_where<F>(mut self, alias: &str, relation: &str, scope: F) -> Self
    where
        F: Fn(QueryBuilder) -> QueryBuilder + Send + Sync + 'static,
    {
        self.counts.push(CountSpec {
            relation: relation.to_string(),
            alias: alias.to_string(),
            scope: Some(std::sync::Arc::new(scope)),
        });
        self
    }

    /// Drop a relation path, and everything nested under it, from the load
    pub fn without(mut self, path: &str) -> Self {
        self.without.push(path.to_string());
        self
    }

    /// Also load the root model's default eager relations
    pub fn with_defaults(mut self) -> Self {
        self.include_defaults = true;
        self
    }

    /// Requested relation paths after defaults and `without` are applied
    pub fn paths(&self, registry: &RelationshipRegistry, root_model: &str) -> Vec<String> {
        self.effective_specs(registry, root_model)
            .into_iter()
            .map(|spec| spec.path)
            .collect()
    }

    /// Eager load every requested relation and count onto `records`
    ///
    /// Relations already present are replaced. All planning happens before
    /// the first query, so configuration errors never leave a batch half
    /// loaded.
    pub async fn load(
        &self,
        registry: &RelationshipRegistry,
        executor: &dyn QueryExecutor,
        root_model: &str,
        records: &mut [Record],
    ) -> ModelResult<EagerLoadStats> {
        let prepared = self.prepare(registry, root_model)?;
        self.execute(&prepared, executor, records, false).await
    }

    /// Like [`EagerLoader::load`], but only for relations and counts not yet
    /// present on each record
    pub async fn load_missing(
        &self,
        registry: &RelationshipRegistry,
        executor: &dyn QueryExecutor,
        root_model: &str,
        records: &mut [Record],
    ) -> ModelResult<EagerLoadStats> {
        let prepared = self.prepare(registry, root_model)?;
        self.execute(&prepared, executor, records, true).await
    }

    /// Validate configuration and resolve every requested relation
    pub(crate) fn prepare(&self, registry: &RelationshipRegistry, root_model: &str) -> ModelResult<PreparedLoad> {
        self.config.validate()?;
        registry.model(root_model)?;

        let specs = self.effective_specs(registry, root_model);
        let plan = LoadPlanner::new(registry, self.config.max_depth).plan(root_model, &specs)?;

        let mut counts = Vec::with_capacity(self.counts.len());
        for spec in &self.counts {
            if spec.relation.contains('.') {
                return Err(ModelError::Configuration(format!(
                    "Relationship count '{}' must name a single relation on '{}'",
                    spec.relation, root_model
                )));
            }
            let relation = registry.resolve(root_model, &spec.relation)?;
            counts.push((relation, spec.clone()));
        }

        Ok(PreparedLoad {
            root_model: root_model.to_string(),
            plan,
            counts,
        })
    }

    /// Run a prepared load over `records`
    pub(crate) async fn execute(
        &self,
        prepared: &PreparedLoad,
        executor: &dyn QueryExecutor,
        records: &mut [Record],
        missing_only: bool,
    ) -> ModelResult<EagerLoadStats> {
        if let Some(record) = records.iter().find(|record| record.model() != prepared.root_model) {
            return Err(ModelError::Configuration(format!(
                "Cannot eager load '{}' relations onto a '{}' record",
                prepared.root_model,
                record.model()
            )));
        }

        let start_time = Instant::now();
        let mut stats = EagerLoadStats::default();
        if records.is_empty() || prepared.is_empty() {
            return Ok(stats);
        }

        let mut loader = BatchLoader::new(executor).with_query_logging(self.config.log_queries);

        // (path of relation names from the root to the parent batch, node)
        let mut level: Vec<(Vec<String>, &LoadPlanNode)> =
            prepared.plan.iter().map(|node| (Vec::new(), node)).collect();

        while !level.is_empty() {
            stats.depth_loaded += 1;
            let mut next_level = Vec::new();

            for (path, node) in level {
                let mut parents = collect_parents(records, &path);
                if missing_only {
                    parents.retain(|parent| !parent.relation_loaded(&node.name));
                }

                let fetched = loader.resolve(&mut parents, &node.relation, node.scope.as_ref()).await?;
                stats.records_loaded += fetched;

                let mut child_path = path.clone();
                child_path.push(node.name.clone());
                for child in &node.children {
                    next_level.push((child_path.clone(), child));
                }
            }

            level = next_level;
        }

        let mut aggregator = CountAggregator::new(&mut loader);
        for (relation, spec) in &prepared.counts {
            let mut parents: Vec<&mut Record> = records.iter_mut().collect();
            if missing_only {
                parents.retain(|parent| parent.count(&spec.alias).is_none());
            }
            aggregator
                .attach_counts(&mut parents, relation, &spec.alias, spec.scope.as_ref())
                .await?;
            stats.counts_attached += 1;
        }

        stats.query_count = loader.query_count();
        stats.execution_time_ms = start_time.elapsed().as_millis() as u64;

        tracing::info!(
            model = %prepared.root_model,
            records = records.len(),
            queries = stats.query_count,
            related = stats.records_loaded,
            depth = stats.depth_loaded,
            counts = stats.counts_attached,
            elapsed_ms = stats.execution_time_ms,
            "Eager load complete"
        );

        Ok(stats)
    }

    fn effective_specs(&self, registry: &RelationshipRegistry, root_model: &str) -> Vec<EagerLoadSpec> {
        let mut specs = Vec::new();
        if self.include_defaults {
            for name in registry.eager_relationships(root_model) {
                if !self.specs.iter().any(|spec| spec.path == name) {
                    specs.push(EagerLoadSpec::new(&name));
                }
            }
        }
        specs.extend(self.specs.iter().cloned());

        specs
            .into_iter()
            .filter(|spec| !self.without.iter().any(|removed| is_within(&spec.path, removed)))
            .collect()
    }
}

impl std::fmt::Debug for EagerLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EagerLoader")
            .field("specs", &self.specs)
            .field("counts", &self.counts.iter().map(|c| c.alias.as_str()).collect::<Vec<_>>())
            .field("without", &self.without)
            .field("include_defaults", &self.include_defaults)
            .field("config", &self.config)
            .finish()
    }
}

/// `posts.comments` is within `posts`; `postscript` is not
fn is_within(path: &str, prefix: &str) -> bool {
    path == prefix
        || path
            .strip_prefix(prefix)
            .map(|rest| rest.starts_with('.'))
            .unwrap_or(false)
}

/// Every record reached from `records` by following `path`
fn collect_parents<'a>(records: &'a mut [Record], path: &[String]) -> Vec<&'a mut Record> {
    let mut current: Vec<&'a mut Record> = records.iter_mut().collect();
    for name in path {
        current = current
            .into_iter()
            .flat_map(|record| record.related_records_mut(name))
            .collect();
    }
    current
}
