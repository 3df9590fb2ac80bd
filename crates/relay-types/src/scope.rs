//! Visibility scope for plugins and commands.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a plugin or command is visible.
///
/// Ordered `Private < Group < All`; the order is used only for
/// subset-checking via [`Scope::contains`], never for per-event decisions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Private chat only.
    Private,
    /// Group chat only.
    Group,
    /// Both private and group chat.
    #[default]
    All,
}

impl Scope {
    /// Whether a command with scope `other` fits inside a plugin with scope
    /// `self`.
    ///
    /// `All` admits everything; `Group` and `Private` admit only themselves.
    pub fn contains(&self, other: Scope) -> bool {
        match self {
            Scope::All => true,
            Scope::Group => other == Scope::Group,
            Scope::Private => other == Scope::Private,
        }
    }

    /// Whether this scope admits an event of the given kind.
    pub fn permits_event(&self, is_group: bool) -> bool {
        match self {
            Scope::All => true,
            Scope::Group => is_group,
            Scope::Private => !is_group,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Private => write!(f, "private"),
            Scope::Group => write!(f, "group"),
            Scope::All => write!(f, "all"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_ordering() {
        assert!(Scope::Private < Scope::Group);
        assert!(Scope::Group < Scope::All);
    }

    #[test]
    fn all_contains_everything() {
        assert!(Scope::All.contains(Scope::Private));
        assert!(Scope::All.contains(Scope::Group));
        assert!(Scope::All.contains(Scope::All));
    }

    #[test]
    fn narrow_scopes_contain_only_themselves() {
        assert!(Scope::Group.contains(Scope::Group));
        assert!(!Scope::Group.contains(Scope::All));
        assert!(!Scope::Group.contains(Scope::Private));
        assert!(Scope::Private.contains(Scope::Private));
        assert!(!Scope::Private.contains(Scope::Group));
    }

    #[test]
    fn permits_event_by_kind() {
        assert!(Scope::All.permits_event(true));
        assert!(Scope::All.permits_event(false));
        assert!(Scope::Group.permits_event(true));
        assert!(!Scope::Group.permits_event(false));
        assert!(Scope::Private.permits_event(false));
        assert!(!Scope::Private.permits_event(true));
    }

    #[test]
    fn default_is_all() {
        assert_eq!(Scope::default(), Scope::All);
    }
}
