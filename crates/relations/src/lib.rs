//! # elif-relations: Relationship Loading for elif.rs
//!
//! Eloquent-style relationship declarations, eager and lazy loading, and
//! relationship counts on top of a fluent SQL query builder.
//!
//! Relationships are declared once per model in a [`RelationshipRegistry`].
//! A batch of [`Record`]s can then have any relation graph attached with a
//! fixed number of queries per relation, independent of the batch size:
//!
//! ```ignore
//! let users = ModelQuery::new(&registry, "User")?
//!     .with("posts.comments")
//!     .with_count("roles")
//!     .get(&executor)
//!     .await?;
//! ```

pub mod backends;
pub mod error;
pub mod loading;
pub mod query;
pub mod record;
pub mod relationships;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use backends::{DatabaseValue, PostgresExecutor, QueryExecutor, RecordKey, Row};
pub use error::*;
pub use loading::{EagerLoadConfig, EagerLoadStats, EagerLoader};
pub use query::{ModelQuery, QueryBuilder, QueryOperator};
pub use record::{Loaded, Record, RelationValue};
pub use relationships::{
    LazyLoader, ModelDefinition, PivotConfig, RelationshipDeclaration, RelationshipMetadata, RelationshipRegistry,
    RelationshipType,
};
