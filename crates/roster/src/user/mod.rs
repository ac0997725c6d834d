//! User management module.
//!
//! Provides user CRUD operations, the role catalog lookup and role assignment.

pub mod assignment;
mod error;
mod models;
mod repository;
mod service;
mod store;

pub use error::{FieldRule, UserError, UserResult};
pub use models::{BuiltinRole, MAX_NAME_LEN, Role, RoleInfo, User, UserPayload};
pub use repository::UserRepository;
pub use service::UserService;
pub use store::{UserStore, WriteOutcome};
