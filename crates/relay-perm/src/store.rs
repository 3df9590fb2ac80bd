//! SQLite-backed storage for cascading permission rules.
//!
//! Five tables, each keyed by its natural composite key so the primary
//! key enforces the one-row-per-key invariant. All hot-path reads are
//! point lookups; writes are `INSERT ... ON CONFLICT DO UPDATE` upserts,
//! making every management operation idempotent.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use relay_types::{CommandPermissionConfig, GroupId, PermissionLevel, RelayError, UserId};

/// What a `global_blacklist` row targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlacklistKind {
    User,
    Group,
}

impl BlacklistKind {
    fn as_str(&self) -> &'static str {
        match self {
            BlacklistKind::User => "user",
            BlacklistKind::Group => "group",
        }
    }
}

impl fmt::Display for BlacklistKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persistent store for permission rules.
///
/// `group_permissions` scopes a row to a plugin and/or command with `''`
/// sentinels rather than NULL: SQLite treats NULLs in a composite primary
/// key as distinct, which would break the one-row-per-key invariant.
pub struct PermissionStore {
    conn: Connection,
}

impl PermissionStore {
    /// Open (or create) the permission database at the given path.
    ///
    /// Enables WAL mode and creates the schema if it does not exist.
    pub fn open(path: &Path) -> Result<Self, RelayError> {
        let conn = Connection::open(path)
            .map_err(|e| RelayError::Store(format!("failed to open database: {e}")))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| RelayError::Store(format!("failed to set WAL mode: {e}")))?;

        Self::init(&conn)?;

        info!(path = %path.display(), "permission store opened");
        Ok(Self { conn })
    }

    /// Open an in-memory store. Used by tests and throwaway instances.
    pub fn open_in_memory() -> Result<Self, RelayError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| RelayError::Store(format!("failed to open in-memory database: {e}")))?;
        Self::init(&conn)?;
        Ok(Self { conn })
    }

    fn init(conn: &Connection) -> Result<(), RelayError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS user_permissions (
                user_id INTEGER PRIMARY KEY,
                level TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS global_blacklist (
                target_id INTEGER NOT NULL,
                kind TEXT NOT NULL,
                PRIMARY KEY (target_id, kind)
            );

            CREATE TABLE IF NOT EXISTS plugin_permissions (
                plugin_name TEXT PRIMARY KEY,
                disabled INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS command_permissions (
                plugin_name TEXT NOT NULL,
                command_name TEXT NOT NULL,
                disabled INTEGER NOT NULL,
                level TEXT NOT NULL,
                users TEXT NOT NULL,
                groups TEXT NOT NULL,
                blacklist_users TEXT NOT NULL,
                blacklist_groups TEXT NOT NULL,
                PRIMARY KEY (plugin_name, command_name)
            );

            CREATE TABLE IF NOT EXISTS group_permissions (
                group_id INTEGER NOT NULL,
                plugin_name TEXT NOT NULL DEFAULT '',
                command_name TEXT NOT NULL DEFAULT '',
                disabled INTEGER NOT NULL,
                PRIMARY KEY (group_id, plugin_name, command_name)
            );",
        )
        .map_err(|e| RelayError::Store(format!("failed to create schema: {e}")))
    }

    // -----------------------------------------------------------------------
    // User levels
    // -----------------------------------------------------------------------

    /// The caller's level. Users without a row are plain `User`.
    pub fn user_level(&self, user: UserId) -> Result<PermissionLevel, RelayError> {
        let level: Option<String> = self
            .conn
            .query_row(
                "SELECT level FROM user_permissions WHERE user_id = ?1",
                params![user.0],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RelayError::Store(format!("level lookup failed: {e}")))?;

        match level {
            Some(s) => PermissionLevel::from_str(&s),
            None => Ok(PermissionLevel::User),
        }
    }

    pub fn set_user_level(&self, user: UserId, level: PermissionLevel) -> Result<(), RelayError> {
        self.conn
            .execute(
                "INSERT INTO user_permissions (user_id, level) VALUES (?1, ?2)
                 ON CONFLICT (user_id) DO UPDATE SET level = excluded.level",
                params![user.0, level.as_str()],
            )
            .map_err(|e| RelayError::Store(format!("level upsert failed: {e}")))?;
        Ok(())
    }

    pub fn remove_user_level(&self, user: UserId) -> Result<(), RelayError> {
        self.conn
            .execute(
                "DELETE FROM user_permissions WHERE user_id = ?1",
                params![user.0],
            )
            .map_err(|e| RelayError::Store(format!("level delete failed: {e}")))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Global blacklist
    // -----------------------------------------------------------------------

    pub fn blacklist_contains(&self, target: i64, kind: BlacklistKind) -> Result<bool, RelayError> {
        let hit: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM global_blacklist WHERE target_id = ?1 AND kind = ?2",
                params![target, kind.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RelayError::Store(format!("blacklist lookup failed: {e}")))?;
        Ok(hit.is_some())
    }

    pub fn blacklist_add(&self, target: i64, kind: BlacklistKind) -> Result<(), RelayError> {
        self.conn
            .execute(
                "INSERT INTO global_blacklist (target_id, kind) VALUES (?1, ?2)
                 ON CONFLICT (target_id, kind) DO NOTHING",
                params![target, kind.as_str()],
            )
            .map_err(|e| RelayError::Store(format!("blacklist insert failed: {e}")))?;
        Ok(())
    }

    pub fn blacklist_remove(&self, target: i64, kind: BlacklistKind) -> Result<(), RelayError> {
        self.conn
            .execute(
                "DELETE FROM global_blacklist WHERE target_id = ?1 AND kind = ?2",
                params![target, kind.as_str()],
            )
            .map_err(|e| RelayError::Store(format!("blacklist delete failed: {e}")))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Plugin disable flag
    // -----------------------------------------------------------------------

    pub fn plugin_disabled(&self, plugin: &str) -> Result<bool, RelayError> {
        let disabled: Option<bool> = self
            .conn
            .query_row(
                "SELECT disabled FROM plugin_permissions WHERE plugin_name = ?1",
                params![plugin],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RelayError::Store(format!("plugin flag lookup failed: {e}")))?;
        Ok(disabled.unwrap_or(false))
    }

    pub fn set_plugin_disabled(&self, plugin: &str, disabled: bool) -> Result<(), RelayError> {
        self.conn
            .execute(
                "INSERT INTO plugin_permissions (plugin_name, disabled) VALUES (?1, ?2)
                 ON CONFLICT (plugin_name) DO UPDATE SET disabled = excluded.disabled",
                params![plugin, disabled],
            )
            .map_err(|e| RelayError::Store(format!("plugin flag upsert failed: {e}")))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Command permission rows
    // -----------------------------------------------------------------------

    /// The persisted permission row for a command, if any.
    pub fn command_permission(
        &self,
        plugin: &str,
        command: &str,
    ) -> Result<Option<CommandPermissionConfig>, RelayError> {
        let row: Option<(bool, String, String, String, String, String)> = self
            .conn
            .query_row(
                "SELECT disabled, level, users, groups, blacklist_users, blacklist_groups
                 FROM command_permissions WHERE plugin_name = ?1 AND command_name = ?2",
                params![plugin, command],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| RelayError::Store(format!("command row lookup failed: {e}")))?;

        let Some((disabled, level, users, groups, bl_users, bl_groups)) = row else {
            return Ok(None);
        };

        Ok(Some(CommandPermissionConfig {
            disabled,
            level: PermissionLevel::from_str(&level)?,
            users: decode_list(&users)?,
            groups: decode_list(&groups)?,
            blacklist_users: decode_list(&bl_users)?,
            blacklist_groups: decode_list(&bl_groups)?,
        }))
    }

    pub fn set_command_permission(
        &self,
        plugin: &str,
        command: &str,
        config: &CommandPermissionConfig,
    ) -> Result<(), RelayError> {
        self.conn
            .execute(
                "INSERT INTO command_permissions
                     (plugin_name, command_name, disabled, level, users, groups,
                      blacklist_users, blacklist_groups)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT (plugin_name, command_name) DO UPDATE SET
                     disabled = excluded.disabled,
                     level = excluded.level,
                     users = excluded.users,
                     groups = excluded.groups,
                     blacklist_users = excluded.blacklist_users,
                     blacklist_groups = excluded.blacklist_groups",
                params![
                    plugin,
                    command,
                    config.disabled,
                    config.level.as_str(),
                    encode_list(&config.users)?,
                    encode_list(&config.groups)?,
                    encode_list(&config.blacklist_users)?,
                    encode_list(&config.blacklist_groups)?,
                ],
            )
            .map_err(|e| RelayError::Store(format!("command row upsert failed: {e}")))?;
        Ok(())
    }

    pub fn remove_command_permission(&self, plugin: &str, command: &str) -> Result<(), RelayError> {
        self.conn
            .execute(
                "DELETE FROM command_permissions WHERE plugin_name = ?1 AND command_name = ?2",
                params![plugin, command],
            )
            .map_err(|e| RelayError::Store(format!("command row delete failed: {e}")))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Group scoping rows
    // -----------------------------------------------------------------------

    /// Whether the group has a disable row at the given scoping.
    ///
    /// `plugin`/`command` narrow the row: `(group, None, None)` is the
    /// group-wide flag, `(group, Some(p), None)` the group+plugin flag,
    /// and `(group, Some(p), Some(c))` the group+plugin+command flag.
    pub fn group_disabled(
        &self,
        group: GroupId,
        plugin: Option<&str>,
        command: Option<&str>,
    ) -> Result<bool, RelayError> {
        let disabled: Option<bool> = self
            .conn
            .query_row(
                "SELECT disabled FROM group_permissions
                 WHERE group_id = ?1 AND plugin_name = ?2 AND command_name = ?3",
                params![group.0, plugin.unwrap_or(""), command.unwrap_or("")],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RelayError::Store(format!("group row lookup failed: {e}")))?;
        Ok(disabled.unwrap_or(false))
    }

    pub fn set_group_disabled(
        &self,
        group: GroupId,
        plugin: Option<&str>,
        command: Option<&str>,
        disabled: bool,
    ) -> Result<(), RelayError> {
        self.conn
            .execute(
                "INSERT INTO group_permissions (group_id, plugin_name, command_name, disabled)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (group_id, plugin_name, command_name)
                 DO UPDATE SET disabled = excluded.disabled",
                params![group.0, plugin.unwrap_or(""), command.unwrap_or(""), disabled],
            )
            .map_err(|e| RelayError::Store(format!("group row upsert failed: {e}")))?;
        Ok(())
    }
}

fn encode_list<T: serde::Serialize>(list: &[T]) -> Result<String, RelayError> {
    serde_json::to_string(list).map_err(|e| RelayError::Store(format!("list encode failed: {e}")))
}

fn decode_list<T: serde::de::DeserializeOwned>(raw: &str) -> Result<Vec<T>, RelayError> {
    serde_json::from_str(raw).map_err(|e| RelayError::Store(format!("list decode failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> PermissionStore {
        PermissionStore::open_in_memory().unwrap()
    }

    #[test]
    fn unknown_user_defaults_to_user_level() {
        let store = store();
        assert_eq!(store.user_level(UserId(1)).unwrap(), PermissionLevel::User);
    }

    #[test]
    fn set_level_is_an_upsert() {
        let store = store();
        store.set_user_level(UserId(1), PermissionLevel::Admin).unwrap();
        store.set_user_level(UserId(1), PermissionLevel::Owner).unwrap();
        assert_eq!(store.user_level(UserId(1)).unwrap(), PermissionLevel::Owner);

        store.remove_user_level(UserId(1)).unwrap();
        assert_eq!(store.user_level(UserId(1)).unwrap(), PermissionLevel::User);
    }

    #[test]
    fn blacklist_add_is_idempotent() {
        let store = store();
        store.blacklist_add(7, BlacklistKind::User).unwrap();
        store.blacklist_add(7, BlacklistKind::User).unwrap();
        assert!(store.blacklist_contains(7, BlacklistKind::User).unwrap());
        // Same id under a different kind is a separate entry.
        assert!(!store.blacklist_contains(7, BlacklistKind::Group).unwrap());

        store.blacklist_remove(7, BlacklistKind::User).unwrap();
        assert!(!store.blacklist_contains(7, BlacklistKind::User).unwrap());
    }

    #[test]
    fn plugin_flag_defaults_to_enabled() {
        let store = store();
        assert!(!store.plugin_disabled("echo").unwrap());
        store.set_plugin_disabled("echo", true).unwrap();
        assert!(store.plugin_disabled("echo").unwrap());
        store.set_plugin_disabled("echo", false).unwrap();
        assert!(!store.plugin_disabled("echo").unwrap());
    }

    #[test]
    fn command_row_round_trip() {
        let store = store();
        assert!(store.command_permission("p", "c").unwrap().is_none());

        let config = CommandPermissionConfig {
            disabled: true,
            level: PermissionLevel::Admin,
            users: vec![UserId(1), UserId(2)],
            groups: vec![GroupId(10)],
            blacklist_users: vec![UserId(3)],
            blacklist_groups: vec![],
        };
        store.set_command_permission("p", "c", &config).unwrap();
        assert_eq!(store.command_permission("p", "c").unwrap(), Some(config));

        store.remove_command_permission("p", "c").unwrap();
        assert!(store.command_permission("p", "c").unwrap().is_none());
    }

    #[test]
    fn command_row_upsert_replaces_whole_row() {
        let store = store();
        let first = CommandPermissionConfig {
            users: vec![UserId(1)],
            ..Default::default()
        };
        store.set_command_permission("p", "c", &first).unwrap();

        let second = CommandPermissionConfig {
            level: PermissionLevel::Owner,
            ..Default::default()
        };
        store.set_command_permission("p", "c", &second).unwrap();

        let row = store.command_permission("p", "c").unwrap().unwrap();
        assert_eq!(row.level, PermissionLevel::Owner);
        assert!(row.users.is_empty(), "old whitelist must not survive");
    }

    #[test]
    fn group_rows_are_scoped_independently() {
        let store = store();
        let group = GroupId(5);

        store.set_group_disabled(group, None, None, true).unwrap();
        assert!(store.group_disabled(group, None, None).unwrap());
        // The narrower scopings have their own rows.
        assert!(!store.group_disabled(group, Some("p"), None).unwrap());
        assert!(!store.group_disabled(group, Some("p"), Some("c")).unwrap());

        store
            .set_group_disabled(group, Some("p"), Some("c"), true)
            .unwrap();
        assert!(store.group_disabled(group, Some("p"), Some("c")).unwrap());

        store.set_group_disabled(group, None, None, false).unwrap();
        assert!(!store.group_disabled(group, None, None).unwrap());
    }

    #[test]
    fn on_disk_store_persists_across_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("perm.db");

        {
            let store = PermissionStore::open(&path).unwrap();
            store.set_user_level(UserId(9), PermissionLevel::Owner).unwrap();
        }

        let store = PermissionStore::open(&path).unwrap();
        assert_eq!(store.user_level(UserId(9)).unwrap(), PermissionLevel::Owner);
    }
}
