//! User service: request validation and sequencing on top of a [`UserStore`].

use std::sync::Arc;

use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::assignment;
use super::error::{FieldRule, UserError, UserResult};
use super::models::{BuiltinRole, MAX_NAME_LEN, RoleInfo, User, UserPayload};
use super::store::{EmailConflict, UserStore, WriteOutcome};
use crate::query::{QueryParams, build_query};

/// Fields of a create request that passed every field rule.
struct NewUserFields {
    name: String,
    email: String,
    age: i32,
}

/// Service for user management operations.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
}

impl std::fmt::Debug for UserService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserService").finish_non_exhaustive()
    }
}

impl UserService {
    /// Create a new user service.
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    /// Total number of stored users.
    pub async fn user_count(&self) -> UserResult<i64> {
        Ok(self.store.count().await?)
    }

    /// Builtin roles that are missing from the stored catalog or stored
    /// under a different id or name.
    #[instrument(skip(self))]
    pub async fn missing_builtin_roles(&self) -> UserResult<Vec<BuiltinRole>> {
        let stored = self.store.list_roles().await?;
        Ok(BuiltinRole::ALL
            .into_iter()
            .filter(|builtin| !stored.contains(&builtin.role()))
            .collect())
    }

    /// Every user with its roles.
    #[instrument(skip(self))]
    pub async fn list_all(&self) -> UserResult<Vec<User>> {
        Ok(self.store.list_all().await?)
    }

    /// One filtered, ordered page of users.
    ///
    /// The page count is computed over the users matching the filters, so a
    /// filter that matches nothing makes every page out of range.
    #[instrument(skip(self))]
    pub async fn list_page(&self, params: &QueryParams) -> UserResult<Vec<User>> {
        let plan = build_query(params).inspect_err(|e| {
            error!("Getting specific users error. {}", e);
        })?;

        let total = self.store.count_matching(&plan).await?;
        plan.ensure_page_within(total).inspect_err(|e| {
            error!("Getting specific users error. {}", e);
        })?;

        Ok(self.store.query(&plan).await?)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> UserResult<User> {
        match self.store.find_by_id(id).await? {
            Some(user) => Ok(user),
            None => {
                error!(user_id = %id, "Getting user by Id error. Selected user doesn't exist");
                Err(UserError::UserNotFound(id))
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn roles(&self, id: Uuid) -> UserResult<Vec<RoleInfo>> {
        if !self.store.exists(id).await? {
            error!(user_id = %id, "Getting user roles error. Selected user doesn't exist");
            return Err(UserError::UserNotFound(id));
        }

        let roles = self.store.roles_of(id).await?;
        Ok(roles.into_iter().map(RoleInfo::from).collect())
    }

    /// Create a user with a fresh id and no roles.
    #[instrument(skip(self, payload))]
    pub async fn create(&self, payload: Option<UserPayload>) -> UserResult<User> {
        let Some(payload) = payload else {
            error!("User creation error. Inputed user is null");
            return Err(UserError::Validation("User's data is null".to_string()));
        };

        let fields = check_field_rules(&payload).inspect_err(|rule| {
            error!("User creation error. {}", rule);
        })?;

        if self.store.email_exists(&fields.email).await? {
            error!(email = %fields.email, "User creation error. Inputed email already exists");
            return Err(UserError::EmailTaken(fields.email));
        }

        let user = User {
            id: Uuid::new_v4(),
            name: fields.name,
            email: fields.email,
            age: fields.age,
            roles: Vec::new(),
        };

        let outcome = self
            .store
            .insert(&user)
            .await
            .map_err(|e| write_error(e, "User creation"))?;
        log_outcome(outcome, user.id, "User creation");
        info!(user_id = %user.id, "Created new user");

        Ok(user)
    }

    /// Replace name, email and age of an existing user. Roles are kept.
    #[instrument(skip(self, payload))]
    pub async fn update(&self, id: Uuid, payload: Option<UserPayload>) -> UserResult<()> {
        let payload = payload.ok_or_else(|| {
            error!("User updating error. Inputed user is null");
            UserError::Validation("User's data is null".to_string())
        })?;

        let (name, email) = check_update_fields(&payload).inspect_err(|e| {
            error!("User updating error. {}", e);
        })?;

        let Some(mut user) = self.store.find_by_id(id).await? else {
            error!(user_id = %id, "User updating error. Selected user doesn't exist");
            return Err(UserError::UserNotFound(id));
        };

        let holder = self.store.find_id_by_email(&email).await?;
        if holder.is_some_and(|holder| holder != id) {
            error!(email = %email, "User updating error. Inputed email already exists");
            return Err(UserError::EmailTaken(email));
        }

        user.name = name;
        user.email = email;
        user.age = payload.age;

        let outcome = self
            .store
            .replace(&user)
            .await
            .map_err(|e| write_error(e, "User updating"))?;
        log_outcome(outcome, id, "User updating");
        info!(user_id = %id, "Updated user");

        Ok(())
    }

    /// Make `role_name` the only role of a user.
    #[instrument(skip(self))]
    pub async fn assign_role(&self, id: Uuid, role_name: &str) -> UserResult<()> {
        let role_name = assignment::validate_role_name(role_name).inspect_err(|e| {
            error!("Adding new role error. {}", e);
        })?;

        let Some(user) = self.store.find_by_id(id).await? else {
            error!(user_id = %id, "Adding new role error. Selected user doesn't exist");
            return Err(UserError::UserNotFound(id));
        };

        if !self.store.role_exists(role_name).await? {
            error!(role = %role_name, "Adding new role error. Selected role doesn't exist");
            return Err(UserError::RoleNotFound(role_name.to_string()));
        }

        // The role can vanish between the two lookups only if the catalog is edited
        // out of band; report it the same way.
        let Some(role) = self.store.find_role_by_name(role_name).await? else {
            error!(role = %role_name, "Adding new role error. Selected role doesn't exist");
            return Err(UserError::RoleNotFound(role_name.to_string()));
        };

        let user = assignment::assign(user, role).inspect_err(|_| {
            error!(user_id = %id, "Adding new role error. The user already contains this role");
        })?;

        let outcome = self
            .store
            .replace(&user)
            .await
            .map_err(|e| write_error(e, "Adding new role"))?;
        log_outcome(outcome, id, "Adding new role");
        info!(user_id = %id, role = %role_name, "Assigned role to user");

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> UserResult<()> {
        let Some(user) = self.store.find_by_id(id).await? else {
            error!(user_id = %id, "User deleting error. Selected user doesn't exist");
            return Err(UserError::UserNotFound(id));
        };

        let outcome = self.store.delete(&user).await?;
        log_outcome(outcome, id, "User deleting");
        info!(user_id = %id, "Deleted user");

        Ok(())
    }
}

/// A write that lost a race for an email is still a conflict.
fn write_error(err: anyhow::Error, operation: &str) -> UserError {
    match err.downcast::<EmailConflict>() {
        Ok(EmailConflict(email)) => {
            error!(email = %email, "{} error. Inputed email already exists", operation);
            UserError::EmailTaken(email)
        }
        Err(err) => UserError::Storage(err),
    }
}

fn log_outcome(outcome: WriteOutcome, id: Uuid, operation: &str) {
    if !outcome.is_applied() {
        warn!(user_id = %id, "{} warning. No rows were affected", operation);
    }
}

/// Apply the create rules in order and report the first one broken.
fn check_field_rules(payload: &UserPayload) -> Result<NewUserFields, FieldRule> {
    let name = payload.name.as_deref().map(str::trim).unwrap_or_default();
    if name.is_empty() {
        return Err(FieldRule::EmptyName);
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(FieldRule::NameTooLong);
    }

    let email = payload.email.as_deref().map(str::trim).unwrap_or_default();
    if email.is_empty() {
        return Err(FieldRule::EmptyEmail);
    }

    if payload.age < 0 {
        return Err(FieldRule::NegativeAge);
    }

    Ok(NewUserFields {
        name: name.to_string(),
        email: email.to_string(),
        age: payload.age,
    })
}

fn check_update_fields(payload: &UserPayload) -> UserResult<(String, String)> {
    let name = match payload.name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name,
        _ => return Err(UserError::Validation("User's name is null or empty".to_string())),
    };
    if name.chars().count() > MAX_NAME_LEN {
        return Err(UserError::Validation(
            "User's name is longer than 60 characters".to_string(),
        ));
    }

    let email = match payload.email.as_deref().map(str::trim) {
        Some(email) if !email.is_empty() => email,
        _ => return Err(UserError::Validation("User's email is null or empty".to_string())),
    };

    if payload.age < 0 {
        return Err(UserError::Validation(
            "User's age is a negative number".to_string(),
        ));
    }

    Ok((name.to_string(), email.to_string()))
}
