//! Role assignment rules.
//!
//! Assigning a role replaces the user's whole role set with that single role.
//! A user that already holds the role is left untouched and the assignment is
//! rejected.

use super::error::{UserError, UserResult};
use super::models::{Role, User};

/// Check that a requested role name is usable for a lookup.
pub fn validate_role_name(role_name: &str) -> UserResult<&str> {
    if role_name.trim().is_empty() {
        return Err(UserError::Validation(
            "RoleName can not be a null or empty string".to_string(),
        ));
    }
    Ok(role_name)
}

/// Produce the user state after assigning `role`.
pub fn assign(mut user: User, role: Role) -> UserResult<User> {
    if user.has_role(&role.role_name) {
        return Err(UserError::RoleAlreadyAssigned(role.role_name));
    }
    user.roles = vec![role];
    Ok(user)
}
