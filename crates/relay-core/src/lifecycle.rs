//! Plugin lifecycle: load, unload, reload, and routing-state rebuild.
//!
//! [`PluginManager`] owns the shared [`RouterState`] -- the command table
//! plus the ordered plugin list -- behind one `RwLock`. Every mutation
//! (load, unload, reload) takes the write lock for its whole duration and
//! finishes with the table fully rebuilt, so a dispatch reading under the
//! lock sees either the fully-old or fully-new table, never a partially
//! populated one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{bail, Result};
use tracing::{info, warn};

use crate::command_table::CommandTable;
use crate::config::ConfigProvider;
use crate::plugin::Plugin;

/// The routing state shared between the lifecycle manager and the
/// dispatcher.
#[derive(Debug, Default)]
pub struct RouterState {
    pub table: CommandTable,
    /// Active plugins in registration order. Message handlers iterate in
    /// this order.
    pub plugins: Vec<Arc<Plugin>>,
}

impl RouterState {
    pub fn plugin(&self, name: &str) -> Option<&Arc<Plugin>> {
        self.plugins.iter().find(|p| p.meta.name == name)
    }
}

/// Registers, tears down, and hot-swaps plugins.
pub struct PluginManager {
    state: Arc<RwLock<RouterState>>,
    config: Arc<dyn ConfigProvider>,
    /// source unit -> plugin names it yielded. A reload notification for
    /// a unit swaps all of them.
    units: Mutex<HashMap<String, Vec<String>>>,
}

impl PluginManager {
    pub fn new(config: Arc<dyn ConfigProvider>) -> Self {
        Self {
            state: Arc::new(RwLock::new(RouterState::default())),
            config,
            units: Mutex::new(HashMap::new()),
        }
    }

    /// Handle to the shared routing state, for the dispatcher.
    pub fn state(&self) -> Arc<RwLock<RouterState>> {
        Arc::clone(&self.state)
    }

    /// Names of the currently active plugins, in registration order.
    pub fn active(&self) -> Vec<String> {
        self.read()
            .plugins
            .iter()
            .map(|p| p.meta.name.clone())
            .collect()
    }

    /// Register a plugin.
    ///
    /// A same-named active plugin is unloaded first, which makes load
    /// double as reload. Commands whose scope is wider than the plugin's
    /// declared scope are kept with a warning -- enforcement happens per
    /// event, not at load time. Duplicate command basenames are skipped
    /// with a warning. The plugin's config is resolved through the
    /// provider before `on_load` runs.
    pub fn load(&self, plugin: Plugin) -> Result<()> {
        let mut state = self.write();
        self.load_locked(&mut state, plugin)
    }

    /// Unregister a plugin and rebuild the command table.
    pub fn unload(&self, name: &str) -> Result<()> {
        let mut state = self.write();
        self.unload_locked(&mut state, name)
    }

    /// Swap a plugin for a fresh descriptor in one atomic step.
    pub fn reload(&self, plugin: Plugin) -> Result<()> {
        let mut state = self.write();
        let name = plugin.meta.name.clone();
        if state.plugin(&name).is_some() {
            self.unload_locked(&mut state, &name)?;
        }
        self.load_locked(&mut state, plugin)
    }

    /// The config collaborator reports a change for `name`: re-resolve its
    /// config and swap it in place.
    pub fn on_config_changed(&self, name: &str) -> Result<()> {
        let mut state = self.write();
        let Some(active) = state.plugin(name) else {
            bail!("plugin not active: {name}");
        };
        let fresh = (**active).clone();
        info!(plugin = name, "config changed, reloading");
        self.unload_locked(&mut state, name)?;
        self.load_locked(&mut state, fresh)
    }

    // -----------------------------------------------------------------------
    // Source units
    // -----------------------------------------------------------------------

    /// Load every plugin a source unit yielded, recording the mapping so a
    /// later change event for the unit swaps them all.
    ///
    /// A plugin that fails to load is skipped with a warning; the rest of
    /// the unit still loads.
    pub fn load_unit(&self, unit: &str, plugins: Vec<Plugin>) -> Result<()> {
        let mut loaded = Vec::new();
        {
            let mut state = self.write();
            for plugin in plugins {
                let name = plugin.meta.name.clone();
                match self.load_locked(&mut state, plugin) {
                    Ok(()) => loaded.push(name),
                    Err(e) => warn!(unit, plugin = %name, error = %e, "plugin skipped"),
                }
            }
        }
        self.units
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(unit.to_string(), loaded);
        Ok(())
    }

    /// Unload every plugin a source unit yielded.
    pub fn unload_unit(&self, unit: &str) -> Result<()> {
        let names = self
            .units
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(unit)
            .unwrap_or_default();

        let mut state = self.write();
        for name in names {
            if let Err(e) = self.unload_locked(&mut state, &name) {
                warn!(unit, plugin = %name, error = %e, "unload failed");
            }
        }
        Ok(())
    }

    /// A source unit changed on disk: tear down its old plugins and load
    /// the fresh ones, atomically with respect to dispatch.
    pub fn reload_unit(&self, unit: &str, plugins: Vec<Plugin>) -> Result<()> {
        let old = self
            .units
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(unit)
            .unwrap_or_default();

        let mut loaded = Vec::new();
        {
            let mut state = self.write();
            for name in old {
                if let Err(e) = self.unload_locked(&mut state, &name) {
                    warn!(unit, plugin = %name, error = %e, "unload failed");
                }
            }
            for plugin in plugins {
                let name = plugin.meta.name.clone();
                match self.load_locked(&mut state, plugin) {
                    Ok(()) => loaded.push(name),
                    Err(e) => warn!(unit, plugin = %name, error = %e, "plugin skipped"),
                }
            }
        }
        self.units
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(unit.to_string(), loaded);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Locked internals
    // -----------------------------------------------------------------------

    fn load_locked(&self, state: &mut RouterState, mut plugin: Plugin) -> Result<()> {
        let name = plugin.meta.name.clone();
        if name.trim().is_empty() {
            bail!("plugin descriptor has an empty name");
        }

        if state.plugin(&name).is_some() {
            self.unload_locked(state, &name)?;
        }

        for command in &plugin.commands {
            if !plugin.meta.scope.contains(command.scope) {
                warn!(
                    plugin = %name,
                    command = %command.basename,
                    plugin_scope = %plugin.meta.scope,
                    command_scope = %command.scope,
                    "command scope wider than plugin scope"
                );
            }
        }

        // Merge from the declared defaults, not the previous merge result,
        // so a withdrawn override reverts to the default.
        plugin.config = self.config.get_config(&name, &plugin.default_config);

        for command in &plugin.commands {
            // Outcomes are logged inside the table; nothing here is fatal.
            state
                .table
                .register(&name, plugin.meta.scope, Arc::clone(command));
        }

        if let Some(on_load) = &plugin.on_load {
            on_load();
        }

        info!(
            plugin = %name,
            version = %plugin.meta.version,
            commands = plugin.commands.len(),
            handlers = plugin.handlers.len(),
            "plugin loaded"
        );
        state.plugins.push(Arc::new(plugin));
        Ok(())
    }

    fn unload_locked(&self, state: &mut RouterState, name: &str) -> Result<()> {
        let Some(index) = state.plugins.iter().position(|p| p.meta.name == name) else {
            bail!("plugin not active: {name}");
        };

        let plugin = state.plugins.remove(index);
        if let Some(on_unload) = &plugin.on_unload {
            on_unload();
        }

        // Full rebuild keeps the table consistent with the remaining
        // plugins in one pass.
        state.table.clear();
        let remaining: Vec<Arc<Plugin>> = state.plugins.clone();
        for plugin in &remaining {
            for command in &plugin.commands {
                state
                    .table
                    .register(&plugin.meta.name, plugin.meta.scope, Arc::clone(command));
            }
        }

        info!(plugin = name, "plugin unloaded");
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, RouterState> {
        self.state.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, RouterState> {
        self.state.write().unwrap_or_else(|p| p.into_inner())
    }
}
