//! Cascading permission storage and resolution for the relay bot framework.
//!
//! - [`PermissionStore`] -- SQLite-backed rule storage with point queries
//!   and idempotent upserts, one row per natural key
//! - [`PermissionResolver`] -- evaluates the fixed-precedence rule chain
//!   for a (user, group, plugin, command) tuple and owns the management
//!   operations that mutate the store

pub mod resolver;
pub mod store;

pub use resolver::{Decision, PermissionResolver};
pub use store::{BlacklistKind, PermissionStore};
