//! Permission levels and per-command permission configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;
use crate::ids::{GroupId, UserId};

/// Trust tier assigned to a caller, ordered `User < Admin < Owner`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    /// Ordinary caller. The level every unknown user starts at.
    #[default]
    User,
    /// Elevated caller, below owner.
    Admin,
    /// Full control over the bot.
    Owner,
}

impl PermissionLevel {
    /// The string stored in the permission store's `level` columns.
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionLevel::User => "user",
            PermissionLevel::Admin => "admin",
            PermissionLevel::Owner => "owner",
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PermissionLevel {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(PermissionLevel::User),
            "admin" => Ok(PermissionLevel::Admin),
            "owner" => Ok(PermissionLevel::Owner),
            other => Err(RelayError::Store(format!(
                "unknown permission level: {other}"
            ))),
        }
    }
}

/// Full permission configuration of a single command.
///
/// A command may declare a bare [`PermissionLevel`]; it is normalized into
/// this struct at construction so dispatch never probes optional fields.
/// The same shape is persisted as a `command_permissions` row, which --
/// when present -- replaces the compile-time default wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandPermissionConfig {
    /// Command switched off entirely.
    pub disabled: bool,
    /// Minimum level the caller must hold.
    pub level: PermissionLevel,
    /// User whitelist; empty means "no user restriction".
    pub users: Vec<UserId>,
    /// Group whitelist; empty means "no group restriction".
    pub groups: Vec<GroupId>,
    /// Users denied regardless of the whitelists.
    pub blacklist_users: Vec<UserId>,
    /// Groups denied regardless of the whitelists.
    pub blacklist_groups: Vec<GroupId>,
}

impl Default for CommandPermissionConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            level: PermissionLevel::User,
            users: Vec::new(),
            groups: Vec::new(),
            blacklist_users: Vec::new(),
            blacklist_groups: Vec::new(),
        }
    }
}

impl From<PermissionLevel> for CommandPermissionConfig {
    fn from(level: PermissionLevel) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }
}
