//! User service error types.

use thiserror::Error;
use uuid::Uuid;

use crate::query::QueryError;

/// Field rule broken by a create request.
///
/// Rules are checked in declaration order and only the first failure is
/// reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FieldRule {
    #[error("User's name is null or empty")]
    EmptyName,

    #[error("User's name is longer than 60 characters")]
    NameTooLong,

    #[error("User's email is null or empty")]
    EmptyEmail,

    #[error("User's age is a negative number")]
    NegativeAge,
}

/// Errors returned by user operations.
#[derive(Debug, Error)]
pub enum UserError {
    /// Malformed request (missing body, null fields, blank role name).
    #[error("{0}")]
    Validation(String),

    /// A create request broke one of the field rules.
    #[error(transparent)]
    FieldRule(#[from] FieldRule),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("This user doesn't exist: {0}")]
    UserNotFound(Uuid),

    #[error("This role doesn't exist: {0}")]
    RoleNotFound(String),

    #[error("This email already exists: {0}")]
    EmailTaken(String),

    #[error("The user already contains this role: {0}")]
    RoleAlreadyAssigned(String),

    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

pub type UserResult<T> = Result<T, UserError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_rule_messages() {
        let err: UserError = FieldRule::EmptyEmail.into();
        assert_eq!(err.to_string(), "User's email is null or empty");
    }

    #[test]
    fn test_storage_error_keeps_context() {
        let err: UserError = anyhow::anyhow!("disk full").context("Failed to insert user").into();
        let msg = err.to_string();
        assert!(msg.contains("Failed to insert user"));
        assert!(msg.contains("disk full"));
    }
}
