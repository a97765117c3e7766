//! Relationship Registry - Runtime metadata storage and access system

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::inference;
use super::metadata::{PivotConfig, RelationshipDeclaration, RelationshipMetadata, RelationshipType};
use crate::error::{ModelError, ModelResult, RelationshipError};

/// Table and primary key of a registered model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDefinition {
    pub name: String,
    pub table: String,
    pub primary_key: String,
}

impl ModelDefinition {
    /// Define a model with the conventional table name and an `id` primary key
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            table: inference::table_name(name),
            primary_key: "id".to_string(),
        }
    }

    pub fn with_table(mut self, table: &str) -> Self {
        self.table = table.to_string();
        self
    }

    pub fn with_primary_key(mut self, primary_key: &str) -> Self {
        self.primary_key = primary_key.to_string();
        self
    }
}

/// Thread-safe relationship registry for storing and accessing metadata at runtime
///
/// Cloning is cheap and clones share storage.
#[derive(Debug, Clone, Default)]
pub struct RelationshipRegistry {
    /// Map of model name -> definition
    models: Arc<DashMap<String, ModelDefinition>>,

    /// Map of model name -> relationship name -> metadata
    relationships: Arc<DashMap<String, HashMap<String, RelationshipMetadata>>>,

    /// Eager loading relationships index, in registration order
    eager_index: Arc<DashMap<String, Vec<String>>>,
}

impl RelationshipRegistry {
    /// Create a new empty relationship registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model so relationships can point at it
    pub fn register_model(&self, definition: ModelDefinition) -> ModelResult<()> {
        if self.models.contains_key(&definition.name) {
            return Err(ModelError::Configuration(format!(
                "Model '{}' is already registered",
                definition.name
            )));
        }
        tracing::trace!(model = %definition.name, table = %definition.table, "Registered model");
        self.models.insert(definition.name.clone(), definition);
        Ok(())
    }

    /// Look up a registered model
    pub fn model(&self, model_name: &str) -> ModelResult<ModelDefinition> {
        self.models
            .get(model_name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ModelError::UnknownModel(model_name.to_string()))
    }

    /// Register a relationship for a model, applying naming conventions
    ///
    /// Fails with a configuration error when either model is unknown, the
    /// name is already taken on the owner, or the resolved keys are invalid.
    pub fn register(
        &self,
        model_name: &str,
        declaration: RelationshipDeclaration,
    ) -> ModelResult<RelationshipMetadata> {
        let owner = self.model(model_name)?;
        let related = self.model(&declaration.related_model)?;

        if self.has_relationship(model_name, &declaration.name) {
            return Err(RelationshipError::Duplicate(format!(
                "{}.{}",
                model_name, declaration.name
            ))
            .into());
        }

        let metadata = resolve_declaration(&owner, &related, declaration)?;
        metadata.validate()?;

        tracing::trace!(
            model = %model_name,
            relationship = %metadata.name,
            kind = ?metadata.relationship_type,
            foreign_key = %metadata.foreign_key,
            local_key = %metadata.local_key,
            "Registered relationship"
        );

        // Update eager loading index
        if metadata.eager_load {
            self.eager_index
                .entry(model_name.to_string())
                .or_default()
                .push(metadata.name.clone());
        }

        self.relationships
            .entry(model_name.to_string())
            .or_default()
            .insert(metadata.name.clone(), metadata.clone());

        Ok(metadata)
    }

    /// Get relationship metadata by model and relationship name
    pub fn get(&self, model_name: &str, relationship_name: &str) -> Option<RelationshipMetadata> {
        self.relationships
            .get(model_name)?
            .get(relationship_name)
            .cloned()
    }

    /// Resolve a relationship name to its descriptor
    pub fn resolve(&self, model_name: &str, relationship_name: &str) -> ModelResult<RelationshipMetadata> {
        if !self.models.contains_key(model_name) {
            return Err(ModelError::UnknownModel(model_name.to_string()));
        }
        self.get(model_name, relationship_name)
            .ok_or_else(|| ModelError::UnknownRelation {
                model: model_name.to_string(),
                relation: relationship_name.to_string(),
            })
    }

    /// Check if a relationship exists
    pub fn has_relationship(&self, model_name: &str, relationship_name: &str) -> bool {
        self.relationships
            .get(model_name)
            .map(|relationships| relationships.contains_key(relationship_name))
            .unwrap_or(false)
    }

    /// Get all relationship names for a model, sorted
    pub fn relationship_names(&self, model_name: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .relationships
            .get(model_name)
            .map(|relationships| relationships.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Get eager loading relationships for a model
    pub fn eager_relationships(&self, model_name: &str) -> Vec<String> {
        self.eager_index
            .get(model_name)
            .map(|relationships| relationships.clone())
            .unwrap_or_default()
    }
}

fn resolve_declaration(
    owner: &ModelDefinition,
    related: &ModelDefinition,
    declaration: RelationshipDeclaration,
) -> ModelResult<RelationshipMetadata> {
    let RelationshipDeclaration {
        name,
        relationship_type,
        foreign_key,
        local_key,
        pivot_table,
        pivot_keys,
        pivot_columns,
        pivot_timestamps,
        constraints,
        eager_load,
        ..
    } = declaration;

    let has_pivot_options =
        pivot_table.is_some() || pivot_keys.is_some() || !pivot_columns.is_empty() || pivot_timestamps;
    if !relationship_type.requires_pivot() && has_pivot_options {
        return Err(RelationshipError::InvalidConfiguration(format!(
            "'{}' has no pivot table; pivot options apply to many-to-many only",
            name
        ))
        .into());
    }

    let (foreign_key, local_key, pivot_config) = match relationship_type {
        RelationshipType::HasOne | RelationshipType::HasMany => (
            foreign_key.unwrap_or_else(|| inference::foreign_key(&owner.name)),
            local_key.unwrap_or_else(|| owner.primary_key.clone()),
            None,
        ),
        RelationshipType::BelongsTo => (
            foreign_key.unwrap_or_else(|| inference::foreign_key(&related.name)),
            local_key.unwrap_or_else(|| related.primary_key.clone()),
            None,
        ),
        RelationshipType::ManyToMany => {
            if foreign_key.is_some() {
                return Err(RelationshipError::InvalidConfiguration(format!(
                    "'{}' is many-to-many; use pivot_keys instead of foreign_key",
                    name
                ))
                .into());
            }
            let (foreign_pivot_key, related_pivot_key) = pivot_keys.unwrap_or_else(|| {
                (
                    inference::foreign_key(&owner.name),
                    inference::foreign_key(&related.name),
                )
            });
            let mut pivot = PivotConfig::new(
                pivot_table.unwrap_or_else(|| inference::pivot_table(&owner.name, &related.name)),
                foreign_pivot_key,
                related_pivot_key,
                related.primary_key.clone(),
            );
            pivot.additional_columns = pivot_columns;
            pivot.with_timestamps = pivot_timestamps;

            (
                pivot.foreign_pivot_key.clone(),
                local_key.unwrap_or_else(|| owner.primary_key.clone()),
                Some(pivot),
            )
        }
    };

    Ok(RelationshipMetadata {
        relationship_type,
        name,
        owner_model: owner.name.clone(),
        owner_table: owner.table.clone(),
        related_model: related.name.clone(),
        related_table: related.table.clone(),
        foreign_key,
        local_key,
        pivot_config,
        eager_load,
        constraints,
    })
}
