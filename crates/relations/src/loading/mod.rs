//! Eager loading: planning, batch resolution and relationship counts

pub mod batch_loader;
pub mod config;
pub mod counts;
pub mod eager_loader;
pub mod plan;

#[cfg(test)]
mod eager_loading_tests;

pub use batch_loader::BatchLoader;
pub use config::{EagerLoadConfig, LOG_QUERIES_ENV, MAX_DEPTH_ENV};
pub use counts::{count_alias, CountAggregator};
pub use eager_loader::{EagerLoadStats, EagerLoader};
pub use plan::{EagerLoadSpec, LoadPlanNode, LoadPlanner, RelationScope};
