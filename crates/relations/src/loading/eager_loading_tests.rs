//! End-to-end tests for eager loading over the in-memory executor

#[cfg(test)]
mod tests {
    use crate::backends::{DatabaseValue, QueryExecutor};
    use crate::error::ModelError;
    use crate::loading::{EagerLoadConfig, EagerLoader};
    use crate::query::{ModelQuery, QueryBuilder};
    use crate::record::{Record, RelationValue};
    use crate::relationships::{ModelDefinition, RelationshipDeclaration, RelationshipRegistry};
    use crate::testing::{fixtures, init_test_tracing, row, MemoryExecutor};
    use crate::backends::DatabaseValue::Int64;

    async fn load_users(executor: &MemoryExecutor, ids: &[i64]) -> Vec<Record> {
        let query = QueryBuilder::new()
            .from("users")
            .where_in("users.id", ids.to_vec())
            .order_by("users.id");
        let rows = executor.fetch_all(&query).await.unwrap();
        executor.reset_log();
        rows.into_iter().map(|r| Record::from_row("User", "users", r)).collect()
    }

    fn ids(records: &[&Record]) -> Vec<i64> {
        records.iter().filter_map(|r| r.get_i64("id")).collect()
    }

    #[tokio::test]
    async fn test_nested_load_two_levels() {
        init_test_tracing();
        let registry = fixtures::blog_registry();
        let executor = MemoryExecutor::new()
            .with_table("users", vec![row([("id", Int64(1))]), row([("id", Int64(2))])])
            .with_table(
                "posts",
                vec![
                    row([("id", Int64(10)), ("user_id", Int64(1))]),
                    row([("id", Int64(11)), ("user_id", Int64(2))]),
                ],
            )
            .with_table(
                "comments",
                vec![
                    row([("id", Int64(100)), ("post_id", Int64(10))]),
                    row([("id", Int64(101)), ("post_id", Int64(10))]),
                ],
            );
        let mut users = load_users(&executor, &[1, 2]).await;

        let stats = EagerLoader::new()
            .with("posts.comments")
            .load(&registry, &executor, "User", &mut users)
            .await
            .unwrap();

        assert_eq!(executor.query_count(), 2);
        assert_eq!(stats.query_count, 2);
        assert_eq!(stats.depth_loaded, 2);
        assert_eq!(stats.records_loaded, 4);

        let first_posts = users[0].related("posts");
        assert_eq!(ids(&first_posts), vec![10]);
        assert_eq!(ids(&first_posts[0].related("comments")), vec![100, 101]);

        let second_posts = users[1].related("posts");
        assert_eq!(ids(&second_posts), vec![11]);
        assert_eq!(
            second_posts[0].relation("comments").value(),
            Some(&RelationValue::Many(vec![]))
        );

        let queries = executor.queries();
        assert!(queries[0].starts_with("SELECT posts.* FROM posts WHERE posts.user_id IN"));
        assert!(queries[1].starts_with("SELECT comments.* FROM comments WHERE comments.post_id IN"));
    }

    #[tokio::test]
    async fn test_query_count_independent_of_batch_size() {
        let registry = fixtures::blog_registry();
        let loader = EagerLoader::new().with("posts").with("profile").with("roles");

        let executor = fixtures::blog_executor();
        let mut one = load_users(&executor, &[1]).await;
        loader.load(&registry, &executor, "User", &mut one).await.unwrap();
        let single = executor.query_count();

        let executor = fixtures::blog_executor();
        let mut all = load_users(&executor, &[1, 2, 3]).await;
        loader.load(&registry, &executor, "User", &mut all).await.unwrap();

        // posts + profile + roles (pivot rows, then roles)
        assert_eq!(single, 4);
        assert_eq!(executor.query_count(), single);
        assert!(all.iter().all(|u| ["posts", "profile", "roles"].iter().all(|r| u.relation_loaded(r))));
    }

    #[tokio::test]
    async fn test_loading_twice_is_idempotent() {
        let registry = fixtures::blog_registry();
        let executor = fixtures::blog_executor();
        let loader = EagerLoader::new().with("posts.comments").with("roles").with_count("posts");

        let mut users = load_users(&executor, &[1, 2, 3]).await;
        loader.load(&registry, &executor, "User", &mut users).await.unwrap();
        let first = users.clone();

        loader.load(&registry, &executor, "User", &mut users).await.unwrap();
        assert_eq!(users, first);
    }

    #[tokio::test]
    async fn test_counts_match_loaded_lengths() {
        let registry = fixtures::blog_registry();
        let executor = fixtures::blog_executor();
        let mut users = load_users(&executor, &[1, 2, 3]).await;

        let stats = EagerLoader::new()
            .with("posts")
            .with("roles")
            .with("profile")
            .with_count("posts")
            .with_count("roles")
            .with_count("profile")
            .load(&registry, &executor, "User", &mut users)
            .await
            .unwrap();

        assert_eq!(stats.counts_attached, 3);
        for user in &users {
            for relation in ["posts", "roles", "profile"] {
                let loaded = user.relation(relation).value().map(RelationValue::len);
                let counted = user.count(&format!("{}_count", relation)).map(|c| c as usize);
                assert_eq!(loaded, counted, "{} on user {:?}", relation, user.get_i64("id"));
            }
        }
    }

    #[tokio::test]
    async fn test_dangling_foreign_key_loads_empty() {
        let registry = fixtures::blog_registry();
        let executor = fixtures::blog_executor();
        let rows = executor
            .fetch_all(&QueryBuilder::new().from("posts").order_by("posts.id"))
            .await
            .unwrap();
        let mut posts: Vec<Record> = rows.into_iter().map(|r| Record::from_row("Post", "posts", r)).collect();

        EagerLoader::new()
            .with("author")
            .load(&registry, &executor, "Post", &mut posts)
            .await
            .unwrap();

        let orphan = posts.iter().find(|p| p.get_i64("id") == Some(13)).unwrap();
        assert_eq!(orphan.relation("author").value(), Some(&RelationValue::One(None)));
        let first = &posts[0];
        assert_eq!(first.related("author")[0].get_str("name"), Some("alice"));
    }

    #[tokio::test]
    async fn test_shared_many_to_many_row_attached_to_each_parent() {
        let registry = fixtures::blog_registry();
        let executor = fixtures::blog_executor();
        let mut users = load_users(&executor, &[1, 2]).await;

        EagerLoader::new()
            .with("roles")
            .load(&registry, &executor, "User", &mut users)
            .await
            .unwrap();

        for user in &users {
            let names: Vec<_> = user.related("roles").iter().filter_map(|r| r.get_str("name")).collect();
            assert!(names.contains(&"editor"), "user {:?}", user.get_i64("id"));
        }
        let alice_editor = users[0]
            .related("roles")
            .into_iter()
            .find(|r| r.get_str("name") == Some("editor"))
            .unwrap();
        assert_eq!(
            alice_editor.pivot().and_then(|p| p.get("granted_at")),
            Some(&DatabaseValue::String("2024-02-01".to_string()))
        );
    }

    #[tokio::test]
    async fn test_scoped_relation() {
        let registry = fixtures::blog_registry();
        let executor = fixtures::blog_executor();
        let mut users = load_users(&executor, &[1, 2]).await;

        EagerLoader::new()
            .with_where("posts", |q| q.where_like("posts.title", "%e%").order_by_desc("posts.id"))
            .load(&registry, &executor, "User", &mut users)
            .await
            .unwrap();

        assert_eq!(ids(&users[0].related("posts")), vec![12, 10]);
        assert_eq!(ids(&users[1].related("posts")), vec![11]);
    }

    #[tokio::test]
    async fn test_nested_belongs_to_then_has_one() {
        let registry = fixtures::blog_registry();
        let executor = fixtures::blog_executor();
        let rows = executor
            .fetch_all(&QueryBuilder::new().from("comments").order_by("comments.id"))
            .await
            .unwrap();
        executor.reset_log();
        let mut comments: Vec<Record> = rows.into_iter().map(|r| Record::from_row("Comment", "comments", r)).collect();

        let stats = EagerLoader::new()
            .with("post.author.profile")
            .load(&registry, &executor, "Comment", &mut comments)
            .await
            .unwrap();

        assert_eq!(stats.query_count, 3);
        assert_eq!(stats.depth_loaded, 3);
        let author = comments[0].related("post")[0].related("author")[0];
        assert_eq!(author.get_str("name"), Some("alice"));
        assert_eq!(author.related("profile")[0].get_str("bio"), Some("Rustacean"));
    }

    #[tokio::test]
    async fn test_load_missing_skips_loaded_relations() {
        let registry = fixtures::blog_registry();
        let executor = fixtures::blog_executor();
        let mut users = load_users(&executor, &[1, 2]).await;
        users[0].set_relation("posts", RelationValue::Many(vec![]));

        EagerLoader::new()
            .with("posts")
            .load_missing(&registry, &executor, "User", &mut users)
            .await
            .unwrap();

        assert_eq!(executor.query_count(), 1);
        let (_, params) = executor.last_query().unwrap();
        assert_eq!(params, vec![Int64(2)]);
        assert!(users[0].related("posts").is_empty());
        assert_eq!(ids(&users[1].related("posts")), vec![11]);

        executor.reset_log();
        EagerLoader::new()
            .with("posts.comments")
            .load_missing(&registry, &executor, "User", &mut users)
            .await
            .unwrap();
        assert_eq!(executor.query_count(), 1);
        assert!(executor.queries()[0].contains("FROM comments"));
    }

    #[tokio::test]
    async fn test_configuration_errors_issue_no_queries() {
        let registry = fixtures::blog_registry();
        let executor = fixtures::blog_executor();
        let mut users = load_users(&executor, &[1, 2]).await;

        let too_deep = EagerLoader::new()
            .with_config(EagerLoadConfig::default().with_max_depth(1))
            .with("posts.comments");
        let err = too_deep.load(&registry, &executor, "User", &mut users).await.unwrap_err();
        assert!(err.is_configuration());

        let dotted_count = EagerLoader::new().with_count("posts.comments");
        let err = dotted_count.load(&registry, &executor, "User", &mut users).await.unwrap_err();
        assert!(err.is_configuration());

        let unknown = EagerLoader::new().with("posts").with("followers");
        let err = unknown.load(&registry, &executor, "User", &mut users).await.unwrap_err();
        assert_eq!(
            err,
            ModelError::UnknownRelation {
                model: "User".to_string(),
                relation: "followers".to_string(),
            }
        );

        let err = EagerLoader::new()
            .with("comments")
            .load(&registry, &executor, "Post", &mut users)
            .await
            .unwrap_err();
        assert!(err.is_configuration());

        assert_eq!(executor.query_count(), 0);
        assert!(users.iter().all(|u| u.loaded_relations().is_empty()));
    }

    #[tokio::test]
    async fn test_executor_errors_abort_the_load() {
        let registry = fixtures::blog_registry();
        let executor = MemoryExecutor::new().with_table("users", vec![row([("id", Int64(1))])]);
        let mut users = load_users(&executor, &[1]).await;

        let err = EagerLoader::new()
            .with("posts")
            .load(&registry, &executor, "User", &mut users)
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::Database(_)));
    }

    #[tokio::test]
    async fn test_empty_batch_issues_no_queries() {
        let registry = fixtures::blog_registry();
        let executor = fixtures::blog_executor();
        let mut users: Vec<Record> = Vec::new();

        let stats = EagerLoader::new()
            .with("posts.comments")
            .with_count("roles")
            .load(&registry, &executor, "User", &mut users)
            .await
            .unwrap();
        assert_eq!(stats.query_count, 0);
        assert_eq!(executor.query_count(), 0);
    }

    fn registry_with_default_posts() -> RelationshipRegistry {
        let registry = RelationshipRegistry::new();
        for model in ["User", "Post", "Profile"] {
            registry.register_model(ModelDefinition::new(model)).unwrap();
        }
        registry
            .register("User", RelationshipDeclaration::has_many("posts", "Post").eager())
            .unwrap();
        registry
            .register("User", RelationshipDeclaration::has_one("profile", "Profile"))
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_default_eager_relations_and_without() {
        let registry = registry_with_default_posts();
        let executor = fixtures::blog_executor();

        let users = ModelQuery::new(&registry, "User")
            .unwrap()
            .get(&executor)
            .await
            .unwrap();
        assert!(users.iter().all(|u| u.relation_loaded("posts")));
        assert_eq!(executor.query_count(), 2);

        executor.reset_log();
        let users = ModelQuery::new(&registry, "User")
            .unwrap()
            .without("posts")
            .with("profile")
            .get(&executor)
            .await
            .unwrap();
        assert!(users.iter().all(|u| !u.relation_loaded("posts") && u.relation_loaded("profile")));
        assert_eq!(executor.query_count(), 2);
    }

    #[tokio::test]
    async fn test_conditional_and_scoped_counts() {
        let registry = fixtures::blog_registry();
        let executor = fixtures::blog_executor();
        let include_roles = false;

        let (users, stats) = ModelQuery::new(&registry, "User")
            .unwrap()
            .filter(|q| q.order_by("users.id"))
            .with_when(include_roles, "roles")
            .with_count_where("admin_count", "roles", |q| q.where_eq("roles.name", "admin"))
            .get_with_stats(&executor)
            .await
            .unwrap();

        assert_eq!(stats.query_count, 1);
        assert!(users.iter().all(|u| !u.relation_loaded("roles")));
        let counts: Vec<_> = users.iter().map(|u| u.count("admin_count")).collect();
        assert_eq!(counts, vec![Some(1), Some(0), Some(0)]);
    }

    #[tokio::test]
    async fn test_pivot_column_scope_filters_links_per_parent() {
        let registry = fixtures::blog_registry();
        let executor = fixtures::blog_executor();
        let mut users = load_users(&executor, &[1, 2]).await;

        // alice holds editor since 2024-02-01, bob since 2024-03-01
        EagerLoader::new()
            .with_where("roles", |q| q.where_gt("role_user.granted_at", "2024-02-15"))
            .with_count_where("recent_roles", "roles", |q| q.where_gt("role_user.granted_at", "2024-02-15"))
            .load(&registry, &executor, "User", &mut users)
            .await
            .unwrap();

        for user in &users {
            assert_eq!(user.count("recent_roles"), Some(user.related("roles").len() as i64));
        }
        assert!(users[0].related("roles").is_empty());

        let bob_roles = users[1].related("roles");
        assert_eq!(bob_roles.len(), 1);
        assert_eq!(
            bob_roles[0].pivot().unwrap().get("granted_at"),
            Some(&DatabaseValue::from("2024-03-01"))
        );
    }

    #[tokio::test]
    async fn test_many_to_many_ordered_by_pivot_column() {
        let registry = fixtures::blog_registry();
        let executor = fixtures::blog_executor();
        let mut users = load_users(&executor, &[1, 2]).await;

        EagerLoader::new()
            .with_where("roles", |q| q.order_by_desc("role_user.granted_at"))
            .load(&registry, &executor, "User", &mut users)
            .await
            .unwrap();

        // ORDER BY on an unselected column must not meet SELECT DISTINCT
        assert!(executor.queries().iter().all(|sql| !sql.contains("DISTINCT")));

        let names = |user: &Record| {
            user.related("roles")
                .iter()
                .filter_map(|r| r.get_str("name").map(str::to_string))
                .collect::<Vec<_>>()
        };
        assert_eq!(names(&users[0]), vec!["editor", "admin"]);
        assert_eq!(names(&users[1]), vec!["editor"]);
    }

    #[tokio::test]
    async fn test_json_rendering_of_loaded_graph() {
        let registry = fixtures::blog_registry();
        let executor = fixtures::blog_executor();

        let user = ModelQuery::new(&registry, "User")
            .unwrap()
            .filter(|q| q.where_eq("users.id", 2i64))
            .with("posts")
            .with("profile")
            .with_count("posts")
            .first(&executor)
            .await
            .unwrap()
            .unwrap();

        let json = user.to_json();
        assert_eq!(json["name"], serde_json::json!("bob"));
        assert_eq!(json["posts"][0]["id"], serde_json::json!(11));
        assert_eq!(json["profile"], serde_json::Value::Null);
        assert_eq!(json["posts_count"], serde_json::json!(1));
    }
}
