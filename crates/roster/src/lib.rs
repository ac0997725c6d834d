//! Roster library
//!
//! User and role management over a REST API: filtered and paged listings,
//! validated create/update/delete, and role assignment backed by SQLite.

pub mod api;
pub mod db;
pub mod query;
pub mod settings;
pub mod user;
