//! User and role data models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Longest accepted user name, in characters.
pub const MAX_NAME_LEN: usize = 60;

/// A role from the fixed catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: i64,
    pub role_name: String,
}

/// Seeded role catalog. Mirrors the rows inserted by the initial migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinRole {
    User = 1,
    Admin = 2,
    Support = 3,
    SuperAdmin = 4,
}

impl BuiltinRole {
    pub const ALL: [BuiltinRole; 4] = [
        BuiltinRole::User,
        BuiltinRole::Admin,
        BuiltinRole::Support,
        BuiltinRole::SuperAdmin,
    ];

    pub fn id(self) -> i64 {
        self as i64
    }

    pub fn name(self) -> &'static str {
        match self {
            BuiltinRole::User => "User",
            BuiltinRole::Admin => "Admin",
            BuiltinRole::Support => "Support",
            BuiltinRole::SuperAdmin => "SuperAdmin",
        }
    }

    pub fn role(self) -> Role {
        Role {
            id: self.id(),
            role_name: self.name().to_string(),
        }
    }
}

/// User with its assigned roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub age: i32,
    pub roles: Vec<Role>,
}

impl User {
    /// Whether the user holds a role with exactly this name.
    pub fn has_role(&self, role_name: &str) -> bool {
        self.roles.iter().any(|r| r.role_name == role_name)
    }
}

/// Row of the `users` table, before roles are attached.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct UserRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub age: i32,
}

impl UserRow {
    pub fn into_user(self, roles: Vec<Role>) -> anyhow::Result<User> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| anyhow::anyhow!("stored user id '{}' is not a UUID: {}", self.id, e))?;
        Ok(User {
            id,
            name: self.name,
            email: self.email,
            age: self.age,
            roles,
        })
    }
}

/// Role name as returned by the roles-of-user endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleInfo {
    pub role_name: String,
}

impl From<Role> for RoleInfo {
    fn from(role: Role) -> Self {
        Self {
            role_name: role.role_name,
        }
    }
}

/// Body of the create and update requests.
///
/// `name` and `email` are optional on the wire so that a missing value can be
/// reported by the field rules rather than as a malformed body.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserPayload {
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub age: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog() {
        let ids: Vec<i64> = BuiltinRole::ALL.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(BuiltinRole::SuperAdmin.role().role_name, "SuperAdmin");
    }

    #[test]
    fn test_user_serializes_camel_case() {
        let user = User {
            id: Uuid::nil(),
            name: "Alice".to_string(),
            email: "alice@x.com".to_string(),
            age: 30,
            roles: vec![BuiltinRole::Admin.role()],
        };

        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["name"], "Alice");
        assert_eq!(json["roles"][0]["roleName"], "Admin");
        assert_eq!(json["roles"][0]["id"], 2);
    }

    #[test]
    fn test_payload_missing_fields() {
        let payload: UserPayload = serde_json::from_str(r#"{"email": "a@b.c"}"#).unwrap();
        assert!(payload.name.is_none());
        assert_eq!(payload.email.as_deref(), Some("a@b.c"));
        assert_eq!(payload.age, 0);
    }

    #[test]
    fn test_row_with_bad_id_is_an_error() {
        let row = UserRow {
            id: "not-a-uuid".to_string(),
            name: "x".to_string(),
            email: "x@y.z".to_string(),
            age: 1,
        };
        assert!(row.into_user(Vec::new()).is_err());
    }

    #[test]
    fn test_has_role_is_exact() {
        let user = User {
            id: Uuid::new_v4(),
            name: "Bob".to_string(),
            email: "bob@x.com".to_string(),
            age: 40,
            roles: vec![BuiltinRole::SuperAdmin.role()],
        };
        assert!(user.has_role("SuperAdmin"));
        assert!(!user.has_role("Admin"));
    }
}
