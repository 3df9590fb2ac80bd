//! Built-in plugin management commands.
//!
//! Ships a plugin exposing `plugin list`, `plugin enable <name>`, and
//! `plugin disable <name>`, wired to the permission resolver's management
//! operations. The enable/disable commands require Owner level.

use std::sync::{Arc, RwLock};

use relay_perm::PermissionResolver;
use relay_types::PermissionLevel;

use crate::args::{ArgSchema, ArgSpec};
use crate::lifecycle::RouterState;
use crate::plugin::{Command, Plugin};

/// The management plugin.
///
/// `state` is the manager's routing state; `plugin list` reads it to show
/// what is active. Load this like any other plugin.
pub fn management_plugin(
    resolver: Arc<PermissionResolver>,
    state: Arc<RwLock<RouterState>>,
) -> Plugin {
    let list_state = Arc::clone(&state);
    let list_resolver = Arc::clone(&resolver);
    let list = Command::new("plugin list", "list active plugins", move |ctx, _args| {
        let state = Arc::clone(&list_state);
        let resolver = Arc::clone(&list_resolver);
        async move {
            let names: Vec<String> = {
                let state = state.read().unwrap_or_else(|p| p.into_inner());
                state.plugins.iter().map(|p| p.meta.name.clone()).collect()
            };
            let mut lines = vec![format!("{} plugin(s) active:", names.len())];
            for name in names {
                let enabled = resolver.plugin_enabled(&name).unwrap_or(true);
                let marker = if enabled { "" } else { " (disabled)" };
                lines.push(format!("  {name}{marker}"));
            }
            ctx.reply_text(lines.join("\n"));
            Ok(())
        }
    })
    .with_permission(PermissionLevel::Admin);

    let enable_resolver = Arc::clone(&resolver);
    let enable = Command::new("plugin enable <name>", "enable a plugin", move |ctx, args| {
        let resolver = Arc::clone(&enable_resolver);
        async move {
            let name = args[0].as_str().unwrap_or_default().to_string();
            resolver.set_plugin_enabled(&name, true)?;
            ctx.reply_text(format!("plugin '{name}' enabled"));
            Ok(())
        }
    })
    .with_args(ArgSpec::Single(ArgSchema::str("name")))
    .with_permission(PermissionLevel::Owner);

    let disable_resolver = Arc::clone(&resolver);
    let disable = Command::new(
        "plugin disable <name>",
        "disable a plugin",
        move |ctx, args| {
            let resolver = Arc::clone(&disable_resolver);
            async move {
                let name = args[0].as_str().unwrap_or_default().to_string();
                resolver.set_plugin_enabled(&name, false)?;
                ctx.reply_text(format!("plugin '{name}' disabled"));
                Ok(())
            }
        },
    )
    .with_args(ArgSpec::Single(ArgSchema::str("name")))
    .with_permission(PermissionLevel::Owner);

    Plugin::new("manager")
        .description("built-in plugin management")
        .command(list)
        .command(enable)
        .command(disable)
}
