//! Query construction for relationship descriptors
//!
//! Every relationship can build two shapes of the same query: an eager query
//! matching a whole set of parent keys with `IN`, and a single query matching
//! one parent with `=`. Both go through [`RelationshipMetadata::build_query`],
//! which takes the shape as an explicit argument.

use crate::backends::DatabaseValue;
use crate::query::QueryBuilder;
use crate::record::Record;

use super::metadata::{RelationshipMetadata, RelationshipType};

/// Output column carrying the parent key in count queries
pub const RELATION_KEY_ALIAS: &str = "relation_key";

/// Output column carrying the count in count queries
pub const AGGREGATE_ALIAS: &str = "aggregate";

impl RelationshipMetadata {
    /// Query loading related rows for every key in `parent_keys`
    pub fn build_eager_query(&self, parent_keys: &[DatabaseValue]) -> QueryBuilder {
        self.build_query(parent_keys, true)
    }

    /// Query loading related rows for one parent
    ///
    /// `None` when the parent's key is null or absent, since such a parent
    /// can never have related rows.
    pub fn build_single_query(&self, parent: &Record) -> Option<QueryBuilder> {
        let key = parent.value(self.parent_key_column());
        if key.is_null() {
            return None;
        }
        Some(self.build_query(std::slice::from_ref(key), false))
    }

    fn build_query(&self, parent_keys: &[DatabaseValue], eager: bool) -> QueryBuilder {
        let query = QueryBuilder::new().from(&self.related_table);

        let query = match (&self.relationship_type, &self.pivot_config) {
            (RelationshipType::ManyToMany, Some(pivot)) => query
                .select_all_from(&self.related_table)
                .join(
                    &pivot.table,
                    &format!("{}.{}", pivot.table, pivot.related_pivot_key),
                    &format!("{}.{}", self.related_table, pivot.related_key),
                ),
            _ => query.select_all_from(&self.related_table),
        };

        let key_column = self.qualified_related_key();
        let query = if eager {
            query.where_in(&key_column, parent_keys.to_vec())
        } else {
            match parent_keys.first() {
                Some(key) => query.where_eq(&key_column, key.clone()),
                None => query.where_in::<DatabaseValue>(&key_column, Vec::new()),
            }
        };

        self.apply_constraints(query)
    }

    /// Query reading pivot rows for a set of parent keys
    ///
    /// Projects the owner pivot key, the related pivot key and any declared
    /// pivot columns. The related table is joined in and the descriptor's
    /// constraints applied, so a scope written against the related query
    /// filters pivot links the same way. Only meaningful for many-to-many
    /// relationships.
    pub fn build_pivot_query(&self, parent_keys: &[DatabaseValue]) -> Option<QueryBuilder> {
        let pivot = self.pivot_config.as_ref()?;

        let mut query = QueryBuilder::new()
            .from(&pivot.table)
            .select(&format!("{}.{}", pivot.table, pivot.foreign_pivot_key))
            .select(&format!("{}.{}", pivot.table, pivot.related_pivot_key));
        for column in pivot.pivot_columns() {
            query = query.select(&format!("{}.{}", pivot.table, column));
        }

        let query = query
            .join(
                &self.related_table,
                &format!("{}.{}", self.related_table, pivot.related_key),
                &format!("{}.{}", pivot.table, pivot.related_pivot_key),
            )
            .where_in(
                &format!("{}.{}", pivot.table, pivot.foreign_pivot_key),
                parent_keys.to_vec(),
            );

        Some(self.apply_constraints(query))
    }

    /// Grouped `COUNT(*)` of related rows per parent key
    ///
    /// Rows carry the parent key as `relation_key` and the count as
    /// `aggregate`.
    pub fn build_count_query(&self, parent_keys: &[DatabaseValue]) -> QueryBuilder {
        let key_column = self.qualified_related_key();

        let mut query = QueryBuilder::new().from(&self.related_table);
        if let (RelationshipType::ManyToMany, Some(pivot)) = (&self.relationship_type, &self.pivot_config) {
            query = query.join(
                &pivot.table,
                &format!("{}.{}", pivot.table, pivot.related_pivot_key),
                &format!("{}.{}", self.related_table, pivot.related_key),
            );
        }

        let query = query
            .select_as(&key_column, RELATION_KEY_ALIAS)
            .select_count(AGGREGATE_ALIAS)
            .where_in(&key_column, parent_keys.to_vec())
            .group_by(&key_column);

        self.apply_constraints(query)
    }

    fn apply_constraints(&self, query: QueryBuilder) -> QueryBuilder {
        self.constraints.iter().fold(query, |query, constraint| {
            let column = if constraint.column.contains('.') {
                constraint.column.clone()
            } else {
                format!("{}.{}", self.related_table, constraint.column)
            };
            query.where_op(&column, constraint.operator.clone(), constraint.value.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryOperator;
    use crate::relationships::{ModelDefinition, RelationshipDeclaration, RelationshipRegistry};

    fn registry() -> RelationshipRegistry {
        let registry = RelationshipRegistry::new();
        for model in ["User", "Post", "Role", "Profile"] {
            registry.register_model(ModelDefinition::new(model)).unwrap();
        }
        registry
            .register(
                "User",
                RelationshipDeclaration::has_many("posts", "Post").where_constraint(
                    "published",
                    QueryOperator::Equal,
                    true,
                ),
            )
            .unwrap();
        registry
            .register("Post", RelationshipDeclaration::belongs_to("user", "User"))
            .unwrap();
        registry
            .register(
                "User",
                RelationshipDeclaration::belongs_to_many("roles", "Role").with_pivot(&["granted_at"]),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_eager_query_has_many_with_constraint() {
        let posts = registry().resolve("User", "posts").unwrap();
        let (sql, params) = posts
            .build_eager_query(&[DatabaseValue::Int64(1), DatabaseValue::Int64(2)])
            .to_sql_with_params();

        assert_eq!(
            sql,
            "SELECT posts.* FROM posts WHERE posts.user_id IN ($1, $2) AND posts.published = $3"
        );
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_single_query_belongs_to() {
        let user = registry().resolve("Post", "user").unwrap();
        let post = Record::new("Post", "posts").with_attribute("id", 10i64).with_attribute("user_id", 1i64);

        let sql = user.build_single_query(&post).unwrap().to_sql();
        assert_eq!(sql, "SELECT users.* FROM users WHERE users.id = $1");
    }

    #[test]
    fn test_single_query_null_key_is_none() {
        let user = registry().resolve("Post", "user").unwrap();
        let orphan = Record::new("Post", "posts")
            .with_attribute("id", 11i64)
            .with_attribute("user_id", DatabaseValue::Null);
        assert!(user.build_single_query(&orphan).is_none());
    }

    #[test]
    fn test_many_to_many_queries() {
        let roles = registry().resolve("User", "roles").unwrap();
        let keys = [DatabaseValue::Int64(1)];

        assert_eq!(
            roles.build_eager_query(&keys).to_sql(),
            "SELECT roles.* FROM roles INNER JOIN role_user ON role_user.role_id = roles.id \
             WHERE role_user.user_id IN ($1)"
        );
        assert_eq!(
            roles.build_pivot_query(&keys).unwrap().to_sql(),
            "SELECT role_user.user_id, role_user.role_id, role_user.granted_at FROM role_user \
             INNER JOIN roles ON roles.id = role_user.role_id \
             WHERE role_user.user_id IN ($1)"
        );
    }

    #[test]
    fn test_count_query() {
        let roles = registry().resolve("User", "roles").unwrap();
        assert_eq!(
            roles.build_count_query(&[DatabaseValue::Int64(1)]).to_sql(),
            "SELECT role_user.user_id AS relation_key, COUNT(*) AS aggregate FROM roles \
             INNER JOIN role_user ON role_user.role_id = roles.id \
             WHERE role_user.user_id IN ($1) GROUP BY role_user.user_id"
        );
    }

    #[test]
    fn test_descriptors_survive_json() -> crate::error::ModelResult<()> {
        let registry = registry();
        for name in ["posts", "roles"] {
            let descriptor = registry.resolve("User", name)?;
            let json = serde_json::to_string(&descriptor)?;
            let restored: RelationshipMetadata = serde_json::from_str(&json)?;

            assert_eq!(restored, descriptor);
            let keys = [DatabaseValue::Int64(3)];
            assert_eq!(
                restored.build_eager_query(&keys).to_sql_with_params(),
                descriptor.build_eager_query(&keys).to_sql_with_params()
            );
        }
        Ok(())
    }

    #[test]
    fn test_pivot_query_requires_pivot() {
        let posts = registry().resolve("User", "posts").unwrap();
        assert!(posts.build_pivot_query(&[DatabaseValue::Int64(1)]).is_none());
    }
}
