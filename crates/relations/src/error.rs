//! Error types for the relationship engine
//!
//! Errors fall into two groups. Configuration errors (unknown models, unknown
//! relations, malformed key conventions) are raised while registering or
//! planning, before any query is issued. Data-layer errors come back from the
//! query executor and are propagated unchanged; a failing query aborts the
//! whole load.

use thiserror::Error;

/// Result type alias for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// ORM error type alias
pub type OrmError = ModelError;

/// ORM result type alias
pub type OrmResult<T> = ModelResult<T>;

/// Error types for relationship loading
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// Invalid relationship or loader configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A model name that was never registered
    #[error("Unknown model '{0}'")]
    UnknownModel(String),

    /// A relation name that is not declared on the owning model
    #[error("Relationship '{relation}' is not defined on model '{model}'")]
    UnknownRelation { model: String, relation: String },

    /// Database connection or query execution error
    #[error("Database error: {0}")]
    Database(String),

    /// Query building error
    #[error("Query error: {0}")]
    Query(String),

    /// Column value could not be converted
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ModelError {
    /// Returns true for errors raised while registering or planning
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ModelError::Configuration(_)
                | ModelError::UnknownModel(_)
                | ModelError::UnknownRelation { .. }
        )
    }
}

impl From<sqlx::Error> for ModelError {
    fn from(err: sqlx::Error) -> Self {
        ModelError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

/// Error types for relationship declarations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RelationshipError {
    /// Relationship declaration is missing or inconsistent
    #[error("Invalid relationship configuration: {0}")]
    InvalidConfiguration(String),

    /// Two declarations share the same name on one model
    #[error("Relationship '{0}' is already defined")]
    Duplicate(String),
}

impl From<RelationshipError> for ModelError {
    fn from(err: RelationshipError) -> Self {
        ModelError::Configuration(err.to_string())
    }
}
