//! Fixed-precedence permission resolution.
//!
//! [`PermissionResolver`] answers one question -- may this caller run this
//! command -- by walking the rule chain in a fixed order where the first
//! matching deny wins. It also owns the management operations (owner/admin
//! assignment, blacklisting, enable/disable flags) that mutate the store.

use std::sync::Mutex;

use tracing::warn;

use relay_types::{CommandPermissionConfig, GroupId, PermissionLevel, RelayError, UserId};

use crate::store::{BlacklistKind, PermissionStore};

/// The outcome of a permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

/// Evaluates the cascade of permission rules for inbound commands.
///
/// Precedence, short-circuit, first deny wins:
///
/// 1. caller is the bot itself -- allow, bypassing everything
/// 2. group-wide / group+plugin / group+plugin+command disable rows
/// 3. global user / group blacklist
/// 4. plugin disable flag
/// 5. the persisted command row, if one exists
/// 6. otherwise the command's compile-time default config
///
/// Steps 5 and 6 run the same checks: disabled flag, blacklists,
/// non-empty whitelists, then required level. Blacklist entries dominate
/// whitelist entries at every step.
pub struct PermissionResolver {
    store: Mutex<PermissionStore>,
    self_id: UserId,
}

impl PermissionResolver {
    pub fn new(store: PermissionStore, self_id: UserId) -> Self {
        Self {
            store: Mutex::new(store),
            self_id,
        }
    }

    /// The bot identity this resolver bypasses checks for.
    pub fn self_id(&self) -> UserId {
        self.self_id
    }

    /// Run the precedence chain for one inbound invocation.
    ///
    /// `group` is `None` for private chat. `default` is the command's
    /// compile-time permission config, consulted only when no persisted
    /// row overrides it.
    pub fn check(
        &self,
        user: UserId,
        group: Option<GroupId>,
        plugin: &str,
        command: &str,
        default: &CommandPermissionConfig,
    ) -> Result<Decision, RelayError> {
        // 1. Self bypass.
        if user == self.self_id {
            return Ok(Decision::Allow);
        }

        let store = self.lock()?;

        // 2. Group scoping rows, widest first.
        if let Some(group) = group {
            if store.group_disabled(group, None, None)?
                || store.group_disabled(group, Some(plugin), None)?
                || store.group_disabled(group, Some(plugin), Some(command))?
            {
                return Ok(self.deny(user, group.0, plugin, command, "group disabled"));
            }
        }

        // 3. Global blacklist.
        if store.blacklist_contains(user.0, BlacklistKind::User)? {
            return Ok(self.deny(user, 0, plugin, command, "user blacklisted"));
        }
        if let Some(group) = group {
            if store.blacklist_contains(group.0, BlacklistKind::Group)? {
                return Ok(self.deny(user, group.0, plugin, command, "group blacklisted"));
            }
        }

        // 4. Plugin disable flag.
        if store.plugin_disabled(plugin)? {
            return Ok(self.deny(user, 0, plugin, command, "plugin disabled"));
        }

        // 5/6. Command config: the persisted row replaces the default wholesale.
        let level = store.user_level(user)?;
        let config = store.command_permission(plugin, command)?;
        let effective = config.as_ref().unwrap_or(default);

        if let Some(reason) = evaluate_config(effective, user, group, level) {
            return Ok(self.deny(user, group.map_or(0, |g| g.0), plugin, command, reason));
        }

        Ok(Decision::Allow)
    }

    fn deny(&self, user: UserId, group: i64, plugin: &str, command: &str, reason: &str) -> Decision {
        warn!(
            user = user.0,
            group,
            plugin,
            command,
            reason,
            "permission denied"
        );
        Decision::Deny
    }

    // -----------------------------------------------------------------------
    // Management operations -- each a single idempotent store mutation.
    // -----------------------------------------------------------------------

    pub fn add_owner(&self, user: UserId) -> Result<(), RelayError> {
        self.lock()?.set_user_level(user, PermissionLevel::Owner)
    }

    pub fn remove_owner(&self, user: UserId) -> Result<(), RelayError> {
        self.lock()?.remove_user_level(user)
    }

    pub fn add_admin(&self, user: UserId) -> Result<(), RelayError> {
        self.lock()?.set_user_level(user, PermissionLevel::Admin)
    }

    pub fn remove_admin(&self, user: UserId) -> Result<(), RelayError> {
        self.lock()?.remove_user_level(user)
    }

    pub fn user_level(&self, user: UserId) -> Result<PermissionLevel, RelayError> {
        self.lock()?.user_level(user)
    }

    pub fn blacklist_user(&self, user: UserId) -> Result<(), RelayError> {
        self.lock()?.blacklist_add(user.0, BlacklistKind::User)
    }

    pub fn unblacklist_user(&self, user: UserId) -> Result<(), RelayError> {
        self.lock()?.blacklist_remove(user.0, BlacklistKind::User)
    }

    pub fn blacklist_group(&self, group: GroupId) -> Result<(), RelayError> {
        self.lock()?.blacklist_add(group.0, BlacklistKind::Group)
    }

    pub fn unblacklist_group(&self, group: GroupId) -> Result<(), RelayError> {
        self.lock()?.blacklist_remove(group.0, BlacklistKind::Group)
    }

    pub fn set_plugin_enabled(&self, plugin: &str, enabled: bool) -> Result<(), RelayError> {
        self.lock()?.set_plugin_disabled(plugin, !enabled)
    }

    pub fn plugin_enabled(&self, plugin: &str) -> Result<bool, RelayError> {
        Ok(!self.lock()?.plugin_disabled(plugin)?)
    }

    /// Flip only the disabled bit of a command's row, creating the row from
    /// defaults if it does not exist yet.
    pub fn set_command_enabled(
        &self,
        plugin: &str,
        command: &str,
        enabled: bool,
    ) -> Result<(), RelayError> {
        let store = self.lock()?;
        let mut config = store
            .command_permission(plugin, command)?
            .unwrap_or_default();
        config.disabled = !enabled;
        store.set_command_permission(plugin, command, &config)
    }

    /// Persist a full command permission row.
    ///
    /// The bot's own id is scrubbed out of the user whitelist and
    /// blacklist first: self is never subject to these rules and a stale
    /// entry would be misleading.
    pub fn set_command_permission(
        &self,
        plugin: &str,
        command: &str,
        config: CommandPermissionConfig,
    ) -> Result<(), RelayError> {
        let mut config = config;
        config.users.retain(|u| *u != self.self_id);
        config.blacklist_users.retain(|u| *u != self.self_id);
        self.lock()?.set_command_permission(plugin, command, &config)
    }

    pub fn set_group_enabled(
        &self,
        group: GroupId,
        plugin: Option<&str>,
        command: Option<&str>,
        enabled: bool,
    ) -> Result<(), RelayError> {
        self.lock()?.set_group_disabled(group, plugin, command, !enabled)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, PermissionStore>, RelayError> {
        self.store
            .lock()
            .map_err(|e| RelayError::Store(format!("store lock poisoned: {e}")))
    }
}

/// Evaluate one permission config against a caller.
///
/// Returns `None` for allow, or the deny reason. Check order inside a
/// config: disabled, user blacklist, group blacklist, user whitelist,
/// group whitelist, required level.
fn evaluate_config(
    config: &CommandPermissionConfig,
    user: UserId,
    group: Option<GroupId>,
    level: PermissionLevel,
) -> Option<&'static str> {
    if config.disabled {
        return Some("command disabled");
    }
    if config.blacklist_users.contains(&user) {
        return Some("user on command blacklist");
    }
    if let Some(group) = group {
        if config.blacklist_groups.contains(&group) {
            return Some("group on command blacklist");
        }
    }
    if !config.users.is_empty() && !config.users.contains(&user) {
        return Some("user not on command whitelist");
    }
    if let Some(group) = group {
        if !config.groups.is_empty() && !config.groups.contains(&group) {
            return Some("group not on command whitelist");
        }
    }
    if level < config.level {
        return Some("insufficient level");
    }
    None
}
