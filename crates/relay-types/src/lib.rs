//! Shared value types for the relay bot framework.
//!
//! Everything the other relay crates agree on lives here:
//!
//! - [`UserId`] / [`GroupId`] / [`MessageId`] -- newtype identifiers
//! - [`Segment`] / [`MessageEvent`] -- inbound message content and events
//! - [`Scope`] -- private/group/all visibility classification
//! - [`PermissionLevel`] / [`CommandPermissionConfig`] -- permission model
//! - [`RelayError`] -- subsystem error type

pub mod error;
pub mod event;
pub mod ids;
pub mod permission;
pub mod scope;
pub mod segment;

pub use error::RelayError;
pub use event::MessageEvent;
pub use ids::{GroupId, MessageId, UserId};
pub use permission::{CommandPermissionConfig, PermissionLevel};
pub use scope::Scope;
pub use segment::Segment;
