//! Data-access contract for users and roles.

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use super::models::{Role, User};
use crate::query::QueryPlan;

/// Result of a storage write.
///
/// Hard failures are reported as errors; a write that completed but touched
/// no rows is reported as [`WriteOutcome::Unchanged`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    Unchanged,
}

impl WriteOutcome {
    pub fn from_rows_affected(rows: u64) -> Self {
        if rows == 0 {
            WriteOutcome::Unchanged
        } else {
            WriteOutcome::Applied
        }
    }

    pub fn is_applied(self) -> bool {
        matches!(self, WriteOutcome::Applied)
    }
}

/// A write was refused because another user already holds the email.
///
/// Stores return it inside the `anyhow::Error` of `insert` or `replace` so
/// that a lost check-then-write race is still reported as a conflict.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("email already in use: {0}")]
pub struct EmailConflict(pub String);

/// Storage operations the user service depends on.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Every user with its roles.
    async fn list_all(&self) -> Result<Vec<User>>;

    /// Total number of users, ignoring any filter.
    async fn count(&self) -> Result<i64>;

    /// Number of users matching the filters of a plan (paging ignored).
    async fn count_matching(&self, plan: &QueryPlan) -> Result<i64>;

    /// One page of users matching a plan, in plan order.
    async fn query(&self, plan: &QueryPlan) -> Result<Vec<User>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;

    /// Whether a user with this id exists.
    async fn exists(&self, id: Uuid) -> Result<bool> {
        Ok(self.find_by_id(id).await?.is_some())
    }

    /// Id of the user holding this email, compared case-insensitively.
    async fn find_id_by_email(&self, email: &str) -> Result<Option<Uuid>>;

    /// Whether any user holds this email, compared case-insensitively.
    async fn email_exists(&self, email: &str) -> Result<bool> {
        Ok(self.find_id_by_email(email).await?.is_some())
    }

    async fn roles_of(&self, id: Uuid) -> Result<Vec<Role>>;

    /// The whole role catalog, ordered by id.
    async fn list_roles(&self) -> Result<Vec<Role>>;

    /// Role lookup by case-insensitive name.
    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>>;

    async fn role_exists(&self, name: &str) -> Result<bool> {
        Ok(self.find_role_by_name(name).await?.is_some())
    }

    async fn insert(&self, user: &User) -> Result<WriteOutcome>;

    /// Overwrite name, email, age and the full role set of an existing user.
    async fn replace(&self, user: &User) -> Result<WriteOutcome>;

    async fn delete(&self, user: &User) -> Result<WriteOutcome>;
}
