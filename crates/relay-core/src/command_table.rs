//! Basename-keyed command routing table.
//!
//! The table maps command basenames to handlers and groups them by root
//! for hierarchical sub-command resolution. Matching walks the longest
//! argv prefix first, so `plugin enable x` resolves `"plugin enable"`
//! before ever considering `"plugin"`. A first token that names a known
//! root without completing any basename is a parse error, distinct from
//! an unknown token -- callers print a usage listing for the former and
//! fall through to message handlers for the latter.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use relay_types::Scope;

use crate::plugin::Command;

/// One routed command together with its owning plugin.
#[derive(Debug, Clone)]
pub struct CommandEntry {
    pub plugin: String,
    /// The owning plugin's declared scope, enforced alongside the
    /// command's own scope at dispatch time.
    pub plugin_scope: Scope,
    pub command: Arc<Command>,
}

/// Outcome of a registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered,
    /// A command with this basename already exists; the earlier one wins.
    DuplicateBasename,
    /// The pattern contains no literal tokens and cannot be routed.
    EmptyBasename,
}

/// Outcome of matching an argv against the table.
#[derive(Debug, Clone)]
pub enum CommandMatch {
    /// A basename matched; `raw_args` holds the tokens after it.
    Matched {
        entry: CommandEntry,
        raw_args: Vec<String>,
    },
    /// The first token is a known root but no basename completed.
    UnknownSub { root: String },
    /// The first token is not a known root.
    NoMatch,
}

/// The routing table. Rebuilt wholesale on every registry change; the
/// lifecycle manager serializes rebuilds against dispatch reads.
#[derive(Debug, Default)]
pub struct CommandTable {
    by_basename: HashMap<String, CommandEntry>,
    /// root -> basenames registered under it.
    roots: HashMap<String, Vec<String>>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one command for a plugin.
    ///
    /// Duplicate basenames are rejected, never overwritten: the earlier
    /// registration keeps answering lookups.
    pub fn register(
        &mut self,
        plugin: &str,
        plugin_scope: Scope,
        command: Arc<Command>,
    ) -> RegisterOutcome {
        if command.basename.is_empty() {
            warn!(plugin, pattern = %command.name, "command has no literal tokens, skipped");
            return RegisterOutcome::EmptyBasename;
        }
        if let Some(existing) = self.by_basename.get(&command.basename) {
            warn!(
                plugin,
                basename = %command.basename,
                registered_by = %existing.plugin,
                "duplicate command basename, skipped"
            );
            return RegisterOutcome::DuplicateBasename;
        }

        self.roots
            .entry(command.root.clone())
            .or_default()
            .push(command.basename.clone());
        self.by_basename.insert(
            command.basename.clone(),
            CommandEntry {
                plugin: plugin.to_string(),
                plugin_scope,
                command,
            },
        );
        RegisterOutcome::Registered
    }

    pub fn clear(&mut self) {
        self.by_basename.clear();
        self.roots.clear();
    }

    pub fn len(&self) -> usize {
        self.by_basename.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_basename.is_empty()
    }

    /// Match a tokenized message against the table.
    pub fn match_argv(&self, argv: &[String]) -> CommandMatch {
        if argv.is_empty() {
            return CommandMatch::NoMatch;
        }

        // Longest basename prefix first.
        for len in (1..=argv.len()).rev() {
            let candidate = argv[..len].join(" ");
            if let Some(entry) = self.by_basename.get(&candidate) {
                return CommandMatch::Matched {
                    entry: entry.clone(),
                    raw_args: argv[len..].to_vec(),
                };
            }
        }

        if self.roots.contains_key(&argv[0]) {
            CommandMatch::UnknownSub {
                root: argv[0].clone(),
            }
        } else {
            CommandMatch::NoMatch
        }
    }

    /// The commands registered under a root, sorted lexicographically by
    /// basename. Used to synthesize usage listings.
    pub fn commands_under_root(&self, root: &str) -> Vec<CommandEntry> {
        let mut basenames = self.roots.get(root).cloned().unwrap_or_default();
        basenames.sort();
        basenames
            .iter()
            .filter_map(|b| self.by_basename.get(b).cloned())
            .collect()
    }

    /// Synthesized usage listing for an unknown sub-command under `root`.
    pub fn usage_for_root(&self, root: &str) -> String {
        let mut out = format!("unknown sub-command. commands under '{root}':");
        for entry in self.commands_under_root(root) {
            out.push('\n');
            out.push_str("  ");
            out.push_str(&entry.command.name);
            if !entry.command.description.is_empty() {
                out.push_str(" - ");
                out.push_str(&entry.command.description);
            }
        }
        out
    }
}
