//! Eager load planning
//!
//! Requested relation paths such as `posts`, `posts.comments` and
//! `posts.author` are merged into a tree of [`LoadPlanNode`]s, one node per
//! distinct relation per parent. The whole tree is resolved against the
//! registry before any query runs, so an unknown relation anywhere in a path
//! fails the load up front.

use std::fmt;
use std::sync::Arc;

use crate::error::{ModelError, ModelResult};
use crate::query::QueryBuilder;
use crate::relationships::{RelationshipMetadata, RelationshipRegistry};

/// Caller-supplied refinement of one relation query
pub type RelationScope = Arc<dyn Fn(QueryBuilder) -> QueryBuilder + Send + Sync>;

/// One requested relation path, optionally scoped
#[derive(Clone)]
pub struct EagerLoadSpec {
    pub path: String,
    pub scope: Option<RelationScope>,
}

impl EagerLoadSpec {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            scope: None,
        }
    }

    /// A path whose final segment is queried through `scope`
    pub fn scoped<F>(path: &str, scope: F) -> Self
    where
        F: Fn(QueryBuilder) -> QueryBuilder + Send + Sync + 'static,
    {
        Self {
            path: path.to_string(),
            scope: Some(Arc::new(scope)),
        }
    }

    fn segments(&self) -> ModelResult<Vec<&str>> {
        let segments: Vec<&str> = self.path.split('.').map(str::trim).collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(ModelError::Configuration(format!(
                "Invalid relation path '{}': empty segment",
                self.path
            )));
        }
        Ok(segments)
    }
}

impl fmt::Debug for EagerLoadSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EagerLoadSpec")
            .field("path", &self.path)
            .field("scoped", &self.scope.is_some())
            .finish()
    }
}

/// One relation to resolve, with the relations to resolve beneath it
#[derive(Clone)]
pub struct LoadPlanNode {
    pub name: String,
    pub relation: RelationshipMetadata,
    pub scope: Option<RelationScope>,
    pub children: Vec<LoadPlanNode>,
}

impl LoadPlanNode {
    /// Number of levels in this subtree, counting this node
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(LoadPlanNode::depth).max().unwrap_or(0)
    }

    /// Number of nodes in this subtree, counting this node
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(LoadPlanNode::node_count).sum::<usize>()
    }
}

impl fmt::Debug for LoadPlanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadPlanNode")
            .field("name", &self.name)
            .field("related_model", &self.relation.related_model)
            .field("scoped", &self.scope.is_some())
            .field("children", &self.children)
            .finish()
    }
}

/// Turns relation paths into a load plan against a registry
pub struct LoadPlanner<'r> {
    registry: &'r RelationshipRegistry,
    max_depth: usize,
}

/// Path remainder still to plan, with the scope of the full path
type PendingPath<'a> = (&'a [&'a str], Option<&'a RelationScope>);

impl<'r> LoadPlanner<'r> {
    pub fn new(registry: &'r RelationshipRegistry, max_depth: usize) -> Self {
        Self { registry, max_depth }
    }

    /// Build the plan for `root_model`
    ///
    /// Top-level nodes keep the order in which their first segment first
    /// appears in `specs`. A path may carry at most one scope.
    pub fn plan(&self, root_model: &str, specs: &[EagerLoadSpec]) -> ModelResult<Vec<LoadPlanNode>> {
        let mut parsed = Vec::with_capacity(specs.len());
        for spec in specs {
            let segments = spec.segments()?;
            if segments.len() > self.max_depth {
                return Err(ModelError::Configuration(format!(
                    "Relation path '{}' is {} levels deep; the maximum is {}",
                    spec.path,
                    segments.len(),
                    self.max_depth
                )));
            }
            parsed.push((segments, spec.scope.as_ref()));
        }

        let pending: Vec<PendingPath<'_>> = parsed
            .iter()
            .map(|(segments, scope)| (segments.as_slice(), *scope))
            .collect();

        let plan = self.plan_level(root_model, &pending)?;
        tracing::trace!(
            model = %root_model,
            nodes = plan.iter().map(LoadPlanNode::node_count).sum::<usize>(),
            "Planned eager load"
        );
        Ok(plan)
    }

    fn plan_level(&self, model: &str, paths: &[PendingPath<'_>]) -> ModelResult<Vec<LoadPlanNode>> {
        // Group by first segment, first appearance wins the position
        let mut groups: Vec<(&str, Vec<PendingPath<'_>>, Option<&RelationScope>)> = Vec::new();

        for &(segments, scope) in paths {
            let Some((&head, rest)) = segments.split_first() else {
                continue;
            };

            let index = match groups.iter().position(|(name, _, _)| *name == head) {
                Some(index) => index,
                None => {
                    groups.push((head, Vec::new(), None));
                    groups.len() - 1
                }
            };

            let group = &mut groups[index];
            if rest.is_empty() {
                if scope.is_some() {
                    if group.2.is_some() {
                        return Err(ModelError::Configuration(format!(
                            "Relation '{}' on '{}' has more than one constraint; combine them into one scope",
                            head, model
                        )));
                    }
                    group.2 = scope;
                }
            } else {
                group.1.push((rest, scope));
            }
        }

        groups
            .into_iter()
            .map(|(name, rest, scope)| {
                let relation = self.registry.resolve(model, name)?;
                let children = self.plan_level(&relation.related_model, &rest)?;
                Ok(LoadPlanNode {
                    name: name.to_string(),
                    relation,
                    scope: scope.cloned(),
                    children,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    fn names(nodes: &[LoadPlanNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.name.as_str()).collect()
    }

    #[test]
    fn test_paths_are_grouped_by_first_segment() {
        let registry = fixtures::blog_registry();
        let planner = LoadPlanner::new(&registry, 10);

        let plan = planner
            .plan(
                "User",
                &[
                    EagerLoadSpec::new("posts.comments"),
                    EagerLoadSpec::new("profile"),
                    EagerLoadSpec::new("posts.tags"),
                    EagerLoadSpec::new("posts"),
                ],
            )
            .unwrap();

        assert_eq!(names(&plan), vec!["posts", "profile"]);
        assert_eq!(names(&plan[0].children), vec!["comments", "tags"]);
        assert!(plan[1].children.is_empty());
        assert_eq!(plan[0].depth(), 2);
    }

    #[test]
    fn test_scope_attaches_where_its_path_ends() {
        let registry = fixtures::blog_registry();
        let planner = LoadPlanner::new(&registry, 10);

        let plan = planner
            .plan(
                "User",
                &[
                    EagerLoadSpec::scoped("posts.comments", |q| q.where_eq("approved", true)),
                    EagerLoadSpec::new("posts"),
                ],
            )
            .unwrap();

        assert!(plan[0].scope.is_none());
        assert!(plan[0].children[0].scope.is_some());
    }

    #[test]
    fn test_two_scopes_on_one_path_are_rejected() {
        let registry = fixtures::blog_registry();
        let planner = LoadPlanner::new(&registry, 10);

        let err = planner
            .plan(
                "User",
                &[
                    EagerLoadSpec::scoped("posts", |q| q.where_eq("posts.id", 10i64)),
                    EagerLoadSpec::new("posts"),
                    EagerLoadSpec::scoped("posts", |q| q.order_by("posts.id")),
                ],
            )
            .unwrap_err();
        assert!(err.is_configuration());

        // One scope plus unscoped repeats is fine
        assert!(planner
            .plan(
                "User",
                &[EagerLoadSpec::new("posts"), EagerLoadSpec::scoped("posts", |q| q.order_by("posts.id"))],
            )
            .is_ok());
    }

    #[test]
    fn test_same_name_under_different_parents_is_independent() {
        let registry = fixtures::blog_registry();
        let planner = LoadPlanner::new(&registry, 10);

        let plan = planner
            .plan("Post", &[EagerLoadSpec::new("author.posts"), EagerLoadSpec::new("comments.post")])
            .unwrap();

        assert_eq!(plan[0].children[0].relation.owner_model, "User");
        assert_eq!(plan[1].children[0].relation.owner_model, "Comment");
    }

    #[test]
    fn test_unknown_nested_relation_fails_planning() {
        let registry = fixtures::blog_registry();
        let planner = LoadPlanner::new(&registry, 10);

        let err = planner
            .plan("User", &[EagerLoadSpec::new("posts.reactions")])
            .unwrap_err();
        assert_eq!(
            err,
            ModelError::UnknownRelation {
                model: "Post".to_string(),
                relation: "reactions".to_string(),
            }
        );
    }

    #[test]
    fn test_malformed_paths_are_rejected() {
        let registry = fixtures::blog_registry();
        let planner = LoadPlanner::new(&registry, 2);

        assert!(planner.plan("User", &[EagerLoadSpec::new("posts..comments")]).unwrap_err().is_configuration());
        assert!(planner.plan("User", &[EagerLoadSpec::new("")]).unwrap_err().is_configuration());
        assert!(planner
            .plan("User", &[EagerLoadSpec::new("posts.comments.post")])
            .unwrap_err()
            .is_configuration());
    }
}
