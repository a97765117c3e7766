//! Relationships Module - declarations, registry and descriptor queries

pub mod inference;
pub mod lazy;
pub mod metadata;
pub mod queries;
pub mod registry;

pub use lazy::LazyLoader;
pub use metadata::{
    PivotConfig, RelationshipConstraint, RelationshipDeclaration, RelationshipMetadata, RelationshipType,
};
pub use queries::{AGGREGATE_ALIAS, RELATION_KEY_ALIAS};
pub use registry::{ModelDefinition, RelationshipRegistry};
