//! Application state shared across handlers.

use std::sync::Arc;

use crate::user::UserService;

/// Application state shared across handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// User service for user and role operations.
    pub users: Arc<UserService>,
    /// Origins allowed by CORS. Empty means any origin.
    pub allowed_origins: Vec<String>,
}

impl AppState {
    /// Create new application state.
    pub fn new(users: UserService) -> Self {
        Self {
            users: Arc::new(users),
            allowed_origins: Vec::new(),
        }
    }

    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = origins;
        self
    }
}
