//! Relationship Metadata System - Core metadata definitions for relationships
//!
//! A [`RelationshipMetadata`] is the resolved, immutable descriptor of one
//! relationship on one model. Descriptors are produced by the registry from a
//! [`RelationshipDeclaration`], which fills in any keys left to convention.

use serde::{Deserialize, Serialize};

use crate::backends::DatabaseValue;
use crate::error::{ModelError, ModelResult};
use crate::query::QueryOperator;

/// Defines the type of relationship between models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationshipType {
    /// One-to-one relationship (hasOne)
    HasOne,
    /// One-to-many relationship (hasMany)
    HasMany,
    /// Many-to-one relationship (belongsTo)
    BelongsTo,
    /// Many-to-many relationship through a pivot table
    ManyToMany,
}

impl RelationshipType {
    /// Returns true if this relationship returns a collection
    pub fn is_collection(self) -> bool {
        matches!(self, Self::HasMany | Self::ManyToMany)
    }

    /// Returns true if this relationship requires a pivot table
    pub fn requires_pivot(self) -> bool {
        matches!(self, Self::ManyToMany)
    }
}

/// Resolved description of one relationship
///
/// Key columns depend on the kind:
///
/// | kind        | `foreign_key` lives on | `local_key` lives on |
/// |-------------|------------------------|----------------------|
/// | HasOne/Many | related table          | owner table          |
/// | BelongsTo   | owner table            | related table        |
/// | ManyToMany  | unused (see pivot)     | owner table          |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipMetadata {
    /// The type of relationship
    pub relationship_type: RelationshipType,

    /// Name of the relationship on the owning model
    pub name: String,

    pub owner_model: String,
    pub owner_table: String,

    /// The related model's type name
    pub related_model: String,

    /// The related model's table name
    pub related_table: String,

    pub foreign_key: String,
    pub local_key: String,

    /// Pivot table configuration for many-to-many relationships
    pub pivot_config: Option<PivotConfig>,

    /// Whether this relationship should be eagerly loaded by default
    pub eager_load: bool,

    /// Static filters applied to every query built for this relationship
    pub constraints: Vec<RelationshipConstraint>,
}

impl RelationshipMetadata {
    /// Validate the relationship metadata for consistency
    pub fn validate(&self) -> ModelResult<()> {
        if self.name.is_empty() || self.name.contains('.') {
            return Err(ModelError::Configuration(format!(
                "Relationship name '{}' must be a non-empty identifier without dots",
                self.name
            )));
        }

        if self.relationship_type.requires_pivot() && self.pivot_config.is_none() {
            return Err(ModelError::Configuration(format!(
                "Relationship '{}' of type {:?} requires pivot configuration",
                self.name, self.relationship_type
            )));
        }

        if !self.relationship_type.requires_pivot() && self.foreign_key.is_empty() {
            return Err(ModelError::Configuration(format!(
                "Relationship '{}' has an empty foreign key",
                self.name
            )));
        }

        if self.local_key.is_empty() {
            return Err(ModelError::Configuration(format!(
                "Relationship '{}' has an empty local key",
                self.name
            )));
        }

        if let Some(ref pivot) = self.pivot_config {
            pivot.validate()?;
        }

        Ok(())
    }

    /// Column on the parent record whose value identifies related rows
    pub fn parent_key_column(&self) -> &str {
        match self.relationship_type {
            RelationshipType::BelongsTo => &self.foreign_key,
            _ => &self.local_key,
        }
    }

    /// Column on the related table matched against the parent key
    ///
    /// For many-to-many this is the pivot column holding the parent key.
    pub fn related_key_column(&self) -> &str {
        match self.relationship_type {
            RelationshipType::HasOne | RelationshipType::HasMany => &self.foreign_key,
            RelationshipType::BelongsTo => &self.local_key,
            RelationshipType::ManyToMany => self
                .pivot_config
                .as_ref()
                .map(|p| p.foreign_pivot_key.as_str())
                .unwrap_or_default(),
        }
    }

    /// Fully qualified column the parent keys are matched against in SQL
    pub fn qualified_related_key(&self) -> String {
        match &self.pivot_config {
            Some(pivot) if self.relationship_type.requires_pivot() => {
                format!("{}.{}", pivot.table, pivot.foreign_pivot_key)
            }
            _ => format!("{}.{}", self.related_table, self.related_key_column()),
        }
    }
}

/// Pivot table configuration for many-to-many relationships
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotConfig {
    /// The pivot table name
    pub table: String,

    /// Pivot column referencing the owning model
    pub foreign_pivot_key: String,

    /// Pivot column referencing the related model
    pub related_pivot_key: String,

    /// Column on the related table the pivot points at
    pub related_key: String,

    /// Additional columns to include from the pivot table
    pub additional_columns: Vec<String>,

    /// Timestamps configuration for the pivot table
    pub with_timestamps: bool,
}

impl PivotConfig {
    /// Create a new pivot configuration
    pub fn new(table: String, foreign_pivot_key: String, related_pivot_key: String, related_key: String) -> Self {
        Self {
            table,
            foreign_pivot_key,
            related_pivot_key,
            related_key,
            additional_columns: Vec::new(),
            with_timestamps: false,
        }
    }

    /// Pivot columns copied onto each related record, besides the two keys
    pub fn pivot_columns(&self) -> Vec<String> {
        let mut columns = self.additional_columns.clone();
        if self.with_timestamps {
            for column in ["created_at", "updated_at"] {
                if !columns.iter().any(|c| c == column) {
                    columns.push(column.to_string());
                }
            }
        }
        columns
    }

    /// Validate the pivot configuration
    pub fn validate(&self) -> ModelResult<()> {
        if self.table.is_empty() {
            return Err(ModelError::Configuration("Pivot table name cannot be empty".to_string()));
        }

        if self.foreign_pivot_key.is_empty() || self.related_pivot_key.is_empty() {
            return Err(ModelError::Configuration(format!(
                "Pivot table '{}' requires both pivot keys",
                self.table
            )));
        }

        if self.foreign_pivot_key == self.related_pivot_key {
            return Err(ModelError::Configuration(format!(
                "Pivot keys on '{}' collide ('{}'); declare them explicitly",
                self.table, self.foreign_pivot_key
            )));
        }

        Ok(())
    }
}

/// Relationship constraint for additional filtering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipConstraint {
    /// The column to constrain, relative to the related table
    pub column: String,

    pub operator: QueryOperator,

    pub value: DatabaseValue,
}

/// Declaration of a relationship before conventions are applied
///
/// ```ignore
/// registry.register(
///     "User",
///     RelationshipDeclaration::belongs_to_many("roles", "Role").with_pivot(&["granted_at"]),
/// )?;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipDeclaration {
    pub(crate) name: String,
    pub(crate) relationship_type: RelationshipType,
    pub(crate) related_model: String,
    pub(crate) foreign_key: Option<String>,
    pub(crate) local_key: Option<String>,
    pub(crate) pivot_table: Option<String>,
    pub(crate) pivot_keys: Option<(String, String)>,
    pub(crate) pivot_columns: Vec<String>,
    pub(crate) pivot_timestamps: bool,
    pub(crate) constraints: Vec<RelationshipConstraint>,
    pub(crate) eager_load: bool,
}

impl RelationshipDeclaration {
    fn new(name: &str, relationship_type: RelationshipType, related_model: &str) -> Self {
        Self {
            name: name.to_string(),
            relationship_type,
            related_model: related_model.to_string(),
            foreign_key: None,
            local_key: None,
            pivot_table: None,
            pivot_keys: None,
            pivot_columns: Vec::new(),
            pivot_timestamps: false,
            constraints: Vec::new(),
            eager_load: false,
        }
    }

    pub fn has_one(name: &str, related_model: &str) -> Self {
        Self::new(name, RelationshipType::HasOne, related_model)
    }

    pub fn has_many(name: &str, related_model: &str) -> Self {
        Self::new(name, RelationshipType::HasMany, related_model)
    }

    pub fn belongs_to(name: &str, related_model: &str) -> Self {
        Self::new(name, RelationshipType::BelongsTo, related_model)
    }

    pub fn belongs_to_many(name: &str, related_model: &str) -> Self {
        Self::new(name, RelationshipType::ManyToMany, related_model)
    }

    /// Override the inferred foreign key column
    pub fn foreign_key(mut self, column: &str) -> Self {
        self.foreign_key = Some(column.to_string());
        self
    }

    /// Override the local key (the owner key for BelongsTo)
    pub fn local_key(mut self, column: &str) -> Self {
        self.local_key = Some(column.to_string());
        self
    }

    pub fn pivot_table(mut self, table: &str) -> Self {
        self.pivot_table = Some(table.to_string());
        self
    }

    /// Set both pivot columns: the one referencing the owner, then the related one
    pub fn pivot_keys(mut self, foreign_pivot_key: &str, related_pivot_key: &str) -> Self {
        self.pivot_keys = Some((foreign_pivot_key.to_string(), related_pivot_key.to_string()));
        self
    }

    /// Copy extra pivot columns onto related records
    pub fn with_pivot(mut self, columns: &[&str]) -> Self {
        self.pivot_columns
            .extend(columns.iter().map(|c| c.to_string()));
        self
    }

    pub fn with_timestamps(mut self) -> Self {
        self.pivot_timestamps = true;
        self
    }

    /// Add a static filter applied whenever this relationship is queried
    pub fn where_constraint(
        mut self,
        column: &str,
        operator: QueryOperator,
        value: impl Into<DatabaseValue>,
    ) -> Self {
        self.constraints.push(RelationshipConstraint {
            column: column.to_string(),
            operator,
            value: value.into(),
        });
        self
    }

    /// Load this relationship by default whenever the owner is queried
    pub fn eager(mut self) -> Self {
        self.eager_load = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
