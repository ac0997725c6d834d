//! SQLite-backed user repository.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::models::{Role, User, UserRow};
use super::store::{EmailConflict, UserStore, WriteOutcome};
use crate::query::{QueryPlan, SortField, search_key};

/// Value bound to a dynamically built statement.
enum Bind {
    Text(String),
    Int(i64),
}

/// Repository for user and role database operations.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    /// Create a new user repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append the WHERE conditions of a plan. Expects `users` aliased as `u`
    /// and a preceding `WHERE 1=1`.
    fn push_filters(plan: &QueryPlan, sql: &mut String, binds: &mut Vec<Bind>) {
        if !plan.name_filter.is_empty() {
            sql.push_str(" AND instr(u.name_key, ?) > 0");
            binds.push(Bind::Text(plan.name_filter.clone()));
        }

        if !plan.email_filter.is_empty() {
            sql.push_str(" AND instr(u.email_key, ?) > 0");
            binds.push(Bind::Text(plan.email_filter.clone()));
        }

        sql.push_str(" AND u.age BETWEEN ? AND ?");
        binds.push(Bind::Int(plan.min_age.into()));
        binds.push(Bind::Int(plan.max_age.into()));

        if !plan.role_filter.is_empty() {
            sql.push_str(
                r#" AND EXISTS (
                    SELECT 1 FROM user_roles ur
                    JOIN roles r ON r.id = ur.role_id
                    WHERE ur.user_id = u.id AND instr(r.name_key, ?) > 0
                )"#,
            );
            binds.push(Bind::Text(plan.role_filter.clone()));
        }
    }

    fn group_roles(pairs: Vec<(String, i64, String)>) -> HashMap<String, Vec<Role>> {
        let mut by_user: HashMap<String, Vec<Role>> = HashMap::new();
        for (user_id, id, role_name) in pairs {
            by_user
                .entry(user_id)
                .or_default()
                .push(Role { id, role_name });
        }
        by_user
    }

    /// Load the roles of the given rows and build full users, keeping row order.
    async fn attach_roles(&self, rows: Vec<UserRow>) -> Result<Vec<User>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; rows.len()].join(", ");
        let sql = format!(
            r#"
            SELECT ur.user_id, r.id, r.name
            FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id
            WHERE ur.user_id IN ({})
            ORDER BY r.id
            "#,
            placeholders
        );

        let mut query_builder = sqlx::query_as::<_, (String, i64, String)>(&sql);
        for row in &rows {
            query_builder = query_builder.bind(&row.id);
        }

        let pairs = query_builder
            .fetch_all(&self.pool)
            .await
            .context("Failed to load user roles")?;

        let mut by_user = Self::group_roles(pairs);
        rows.into_iter()
            .map(|row| {
                let roles = by_user.remove(&row.id).unwrap_or_default();
                row.into_user(roles)
            })
            .collect()
    }

    /// Turn a failed user write into an error, keeping email collisions typed.
    fn write_error(err: sqlx::Error, user: &User, what: &'static str) -> anyhow::Error {
        let email_taken = err
            .as_database_error()
            .is_some_and(|db| db.is_unique_violation() && db.message().contains("email_key"));

        if email_taken {
            anyhow::Error::new(EmailConflict(user.email.clone()))
        } else {
            anyhow::Error::new(err).context(what)
        }
    }

    async fn write_roles(
        tx: &mut sqlx::SqliteConnection,
        user_id: &str,
        roles: &[Role],
    ) -> Result<()> {
        sqlx::query("DELETE FROM user_roles WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .context("Failed to clear user roles")?;

        for role in roles {
            sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES (?, ?)")
                .bind(user_id)
                .bind(role.id)
                .execute(&mut *tx)
                .await
                .context("Failed to assign role")?;
        }

        Ok(())
    }
}

#[async_trait]
impl UserStore for UserRepository {
    #[instrument(skip(self))]
    async fn list_all(&self) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, email, age
            FROM users
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list users")?;

        let pairs = sqlx::query_as::<_, (String, i64, String)>(
            r#"
            SELECT ur.user_id, r.id, r.name
            FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id
            ORDER BY r.id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to load user roles")?;

        let mut by_user = Self::group_roles(pairs);
        rows.into_iter()
            .map(|row| {
                let roles = by_user.remove(&row.id).unwrap_or_default();
                row.into_user(roles)
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn count(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count users")?;

        Ok(count.0)
    }

    #[instrument(skip(self))]
    async fn count_matching(&self, plan: &QueryPlan) -> Result<i64> {
        let mut sql = String::from("SELECT COUNT(*) FROM users u WHERE 1=1");
        let mut binds = Vec::new();
        Self::push_filters(plan, &mut sql, &mut binds);

        let mut query_builder = sqlx::query_as::<_, (i64,)>(&sql);
        for value in binds {
            query_builder = match value {
                Bind::Text(s) => query_builder.bind(s),
                Bind::Int(n) => query_builder.bind(n),
            };
        }

        let count = query_builder
            .fetch_one(&self.pool)
            .await
            .context("Failed to count matching users")?;

        Ok(count.0)
    }

    #[instrument(skip(self))]
    async fn query(&self, plan: &QueryPlan) -> Result<Vec<User>> {
        let mut sql = String::from(
            r#"
            SELECT u.id, u.name, u.email, u.age
            FROM users u
            WHERE 1=1
            "#,
        );
        let mut binds = Vec::new();
        Self::push_filters(plan, &mut sql, &mut binds);

        sql.push_str(&format!(
            " ORDER BY {} {}",
            plan.sort_field.order_expr(),
            plan.direction.sql()
        ));
        // Equal sort keys still need a stable page boundary.
        if plan.sort_field != SortField::Id {
            sql.push_str(", u.id ASC");
        }
        sql.push_str(" LIMIT ? OFFSET ?");

        debug!(sql = %sql, "Querying users");

        let mut query_builder = sqlx::query_as::<_, UserRow>(&sql);
        for value in binds {
            query_builder = match value {
                Bind::Text(s) => query_builder.bind(s),
                Bind::Int(n) => query_builder.bind(n),
            };
        }
        query_builder = query_builder.bind(plan.page_size).bind(plan.offset());

        let rows = query_builder
            .fetch_all(&self.pool)
            .await
            .context("Failed to query users")?;

        self.attach_roles(rows).await
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, email, age
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user")?;

        match row {
            Some(row) => Ok(self.attach_roles(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn exists(&self, id: Uuid) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM users WHERE id = ? LIMIT 1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to check user existence")?;

        Ok(row.is_some())
    }

    #[instrument(skip(self))]
    async fn find_id_by_email(&self, email: &str) -> Result<Option<Uuid>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT id FROM users WHERE email_key = ? LIMIT 1")
                .bind(search_key(email))
                .fetch_optional(&self.pool)
                .await
                .context("Failed to fetch user by email")?;

        row.map(|(id,)| {
            Uuid::parse_str(&id).with_context(|| format!("stored user id '{}' is not a UUID", id))
        })
        .transpose()
    }

    #[instrument(skip(self))]
    async fn roles_of(&self, id: Uuid) -> Result<Vec<Role>> {
        let roles = sqlx::query_as::<_, Role>(
            r#"
            SELECT r.id, r.name AS role_name
            FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id
            WHERE ur.user_id = ?
            ORDER BY r.id
            "#,
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch user roles")?;

        Ok(roles)
    }

    #[instrument(skip(self))]
    async fn list_roles(&self) -> Result<Vec<Role>> {
        let roles =
            sqlx::query_as::<_, Role>("SELECT id, name AS role_name FROM roles ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .context("Failed to list roles")?;

        Ok(roles)
    }

    #[instrument(skip(self))]
    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        let role = sqlx::query_as::<_, Role>(
            "SELECT id, name AS role_name FROM roles WHERE name_key = ?",
        )
        .bind(search_key(name))
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch role by name")?;

        Ok(role)
    }

    #[instrument(skip(self, user), fields(user_id = %user.id))]
    async fn insert(&self, user: &User) -> Result<WriteOutcome> {
        let id = user.id.to_string();
        let mut tx = self.pool.begin().await.context("starting transaction")?;

        let result = sqlx::query(
            r#"
            INSERT INTO users (id, name, name_key, email, email_key, age)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&user.name)
        .bind(search_key(&user.name))
        .bind(&user.email)
        .bind(search_key(&user.email))
        .bind(user.age)
        .execute(&mut *tx)
        .await
        .map_err(|e| Self::write_error(e, user, "Failed to insert user"))?;

        Self::write_roles(&mut tx, &id, &user.roles).await?;
        tx.commit().await.context("committing user insert")?;

        Ok(WriteOutcome::from_rows_affected(result.rows_affected()))
    }

    #[instrument(skip(self, user), fields(user_id = %user.id))]
    async fn replace(&self, user: &User) -> Result<WriteOutcome> {
        let id = user.id.to_string();
        let mut tx = self.pool.begin().await.context("starting transaction")?;

        let result = sqlx::query(
            r#"
            UPDATE users
            SET name = ?, name_key = ?, email = ?, email_key = ?, age = ?
            WHERE id = ?
            "#,
        )
        .bind(&user.name)
        .bind(search_key(&user.name))
        .bind(&user.email)
        .bind(search_key(&user.email))
        .bind(user.age)
        .bind(&id)
        .execute(&mut *tx)
        .await
        .map_err(|e| Self::write_error(e, user, "Failed to update user"))?;

        let outcome = WriteOutcome::from_rows_affected(result.rows_affected());
        if !outcome.is_applied() {
            // Row vanished since the caller looked it up; leave the roles alone.
            tx.rollback().await.context("rolling back user update")?;
            return Ok(outcome);
        }

        Self::write_roles(&mut tx, &id, &user.roles).await?;
        tx.commit().await.context("committing user update")?;

        Ok(outcome)
    }

    #[instrument(skip(self, user), fields(user_id = %user.id))]
    async fn delete(&self, user: &User) -> Result<WriteOutcome> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user.id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to delete user")?;

        Ok(WriteOutcome::from_rows_affected(result.rows_affected()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::query::{QueryParams, build_query};
    use crate::user::models::BuiltinRole;

    async fn setup_repo() -> UserRepository {
        let db = Database::in_memory().await.unwrap();
        UserRepository::new(db.pool().clone())
    }

    fn new_user(name: &str, email: &str, age: i32, roles: Vec<Role>) -> User {
        User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            age,
            roles,
        }
    }

    async fn seed(repo: &UserRepository) {
        let users = [
            new_user("Alice", "alice@x.com", 30, vec![BuiltinRole::Admin.role()]),
            new_user("bob", "bob@y.org", 45, vec![BuiltinRole::User.role()]),
            new_user("Carol", "carol@x.com", 22, Vec::new()),
            new_user("dave", "DAVE@x.com", 67, vec![BuiltinRole::SuperAdmin.role()]),
            new_user("Eve", "eve@z.net", 30, vec![BuiltinRole::Support.role()]),
        ];
        for user in &users {
            repo.insert(user).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let repo = setup_repo().await;
        let user = new_user("Alice", "alice@x.com", 30, Vec::new());

        let outcome = repo.insert(&user).await.unwrap();
        assert!(outcome.is_applied());

        let fetched = repo.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(fetched, user);
        assert!(repo.exists(user.id).await.unwrap());
        assert!(!repo.exists(Uuid::new_v4()).await.unwrap());
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_email_lookup_ignores_case() {
        let repo = setup_repo().await;
        let user = new_user("Alice", "alice@x.com", 30, Vec::new());
        repo.insert(&user).await.unwrap();

        assert_eq!(
            repo.find_id_by_email("ALICE@X.com").await.unwrap(),
            Some(user.id)
        );
        assert!(repo.email_exists("Alice@X.Com").await.unwrap());
        assert!(!repo.email_exists("bob@x.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected_by_schema() {
        let repo = setup_repo().await;
        repo.insert(&new_user("Alice", "alice@x.com", 30, Vec::new()))
            .await
            .unwrap();

        let dup = new_user("Other", "ALICE@x.com", 31, Vec::new());
        let err = repo.insert(&dup).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<EmailConflict>(),
            Some(&EmailConflict("ALICE@x.com".to_string()))
        );
    }

    #[tokio::test]
    async fn test_replace_onto_taken_email_is_a_conflict() {
        let repo = setup_repo().await;
        repo.insert(&new_user("Alice", "alice@x.com", 30, Vec::new()))
            .await
            .unwrap();
        let mut bob = new_user("Bob", "bob@x.com", 40, Vec::new());
        repo.insert(&bob).await.unwrap();

        bob.email = "Alice@X.com".to_string();
        let err = repo.replace(&bob).await.unwrap_err();
        assert!(err.downcast_ref::<EmailConflict>().is_some());
    }

    #[tokio::test]
    async fn test_non_ascii_emails_fold_case() {
        let repo = setup_repo().await;
        let olaf = new_user("Ölaf", "Ölaf@x.com", 50, Vec::new());
        repo.insert(&olaf).await.unwrap();

        assert_eq!(
            repo.find_id_by_email("ÖLAF@X.COM").await.unwrap(),
            Some(olaf.id)
        );

        let err = repo
            .insert(&new_user("Other", "ÖLAF@x.com", 51, Vec::new()))
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<EmailConflict>().is_some());
    }

    #[tokio::test]
    async fn test_non_ascii_name_filter_and_order() {
        let repo = setup_repo().await;
        for (name, email) in [("Émile", "emile@x.com"), ("zoe", "zoe@x.com"), ("Ölaf", "olaf@x.com")] {
            repo.insert(&new_user(name, email, 40, Vec::new()))
                .await
                .unwrap();
        }

        for filter in ["Émile", "émile", "ÉMI"] {
            let plan = build_query(&QueryParams {
                name_filter: filter.to_string(),
                ..Default::default()
            })
            .unwrap();
            let users = repo.query(&plan).await.unwrap();
            assert_eq!(users.len(), 1, "{filter}");
            assert_eq!(users[0].name, "Émile");
            assert_eq!(repo.count_matching(&plan).await.unwrap(), 1);
        }

        let plan = build_query(&QueryParams {
            property_for_ordering: "name".to_string(),
            ..Default::default()
        })
        .unwrap();
        let names: Vec<String> = repo
            .query(&plan)
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(names, vec!["zoe", "Émile", "Ölaf"]);
    }

    #[tokio::test]
    async fn test_list_roles_matches_catalog() {
        let repo = setup_repo().await;
        let roles = repo.list_roles().await.unwrap();
        let expected: Vec<Role> = BuiltinRole::ALL.iter().map(|r| r.role()).collect();
        assert_eq!(roles, expected);
    }

    #[tokio::test]
    async fn test_role_lookup() {
        let repo = setup_repo().await;

        let role = repo.find_role_by_name("superadmin").await.unwrap().unwrap();
        assert_eq!(role, BuiltinRole::SuperAdmin.role());
        assert!(repo.role_exists("ADMIN").await.unwrap());
        assert!(!repo.role_exists("Janitor").await.unwrap());
    }

    #[tokio::test]
    async fn test_replace_overwrites_fields_and_roles() {
        let repo = setup_repo().await;
        let mut user = new_user("Alice", "alice@x.com", 30, vec![BuiltinRole::User.role()]);
        repo.insert(&user).await.unwrap();

        user.name = "Alicia".to_string();
        user.age = 31;
        user.roles = vec![BuiltinRole::Admin.role()];
        assert!(repo.replace(&user).await.unwrap().is_applied());

        let fetched = repo.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Alicia");
        assert_eq!(fetched.age, 31);
        assert_eq!(repo.roles_of(user.id).await.unwrap(), vec![BuiltinRole::Admin.role()]);
    }

    #[tokio::test]
    async fn test_replace_missing_user_is_unchanged() {
        let repo = setup_repo().await;
        let ghost = new_user("Ghost", "ghost@x.com", 1, vec![BuiltinRole::User.role()]);

        let outcome = repo.replace(&ghost).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Unchanged);
        assert!(repo.roles_of(ghost.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_role_links() {
        let repo = setup_repo().await;
        let user = new_user("Alice", "alice@x.com", 30, vec![BuiltinRole::Admin.role()]);
        repo.insert(&user).await.unwrap();

        assert!(repo.delete(&user).await.unwrap().is_applied());
        assert!(repo.find_by_id(user.id).await.unwrap().is_none());
        assert!(repo.roles_of(user.id).await.unwrap().is_empty());

        assert_eq!(repo.delete(&user).await.unwrap(), WriteOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_list_all_includes_roles() {
        let repo = setup_repo().await;
        seed(&repo).await;

        let all = repo.list_all().await.unwrap();
        assert_eq!(all.len(), 5);
        let alice = all.iter().find(|u| u.name == "Alice").unwrap();
        assert_eq!(alice.roles, vec![BuiltinRole::Admin.role()]);
        let carol = all.iter().find(|u| u.name == "Carol").unwrap();
        assert!(carol.roles.is_empty());
    }

    #[tokio::test]
    async fn test_query_filters() {
        let repo = setup_repo().await;
        seed(&repo).await;

        let plan = build_query(&QueryParams {
            email_filter: "X.COM".to_string(),
            ..Default::default()
        })
        .unwrap();
        let users = repo.query(&plan).await.unwrap();
        assert_eq!(users.len(), 3);
        assert!(users.iter().all(|u| u.email.to_lowercase().contains("x.com")));
        assert_eq!(repo.count_matching(&plan).await.unwrap(), 3);

        let plan = build_query(&QueryParams {
            role_filter: "admin".to_string(),
            ..Default::default()
        })
        .unwrap();
        let mut names: Vec<String> = repo
            .query(&plan)
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["Alice", "dave"]);

        let plan = build_query(&QueryParams {
            age_limit1: 50,
            age_limit2: 25,
            ..Default::default()
        })
        .unwrap();
        let users = repo.query(&plan).await.unwrap();
        assert_eq!(users.len(), 3);
        assert!(users.iter().all(|u| (25..=50).contains(&u.age)));
    }

    #[tokio::test]
    async fn test_query_sorts_case_insensitively() {
        let repo = setup_repo().await;
        seed(&repo).await;

        let plan = build_query(&QueryParams {
            property_for_ordering: "name".to_string(),
            ..Default::default()
        })
        .unwrap();
        let names: Vec<String> = repo
            .query(&plan)
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(names, vec!["Alice", "bob", "Carol", "dave", "Eve"]);

        let plan = build_query(&QueryParams {
            property_for_ordering: "age".to_string(),
            direction: "desc".to_string(),
            ..Default::default()
        })
        .unwrap();
        let ages: Vec<i32> = repo
            .query(&plan)
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.age)
            .collect();
        assert_eq!(ages, vec![67, 45, 30, 30, 22]);
    }

    #[tokio::test]
    async fn test_query_pages() {
        let repo = setup_repo().await;
        seed(&repo).await;

        let plan = build_query(&QueryParams {
            page: 2,
            page_size: 2,
            property_for_ordering: "email".to_string(),
            ..Default::default()
        })
        .unwrap();
        let emails: Vec<String> = repo
            .query(&plan)
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.email)
            .collect();
        assert_eq!(emails, vec!["carol@x.com", "DAVE@x.com"]);

        let last = QueryPlan { page: 3, ..plan };
        assert_eq!(repo.query(&last).await.unwrap().len(), 1);
    }
}
