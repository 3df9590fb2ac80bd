//! The config collaborator contract.
//!
//! Plugins ship default config blobs; the provider deep-merges persisted
//! overrides on top at load time. Config-changed notifications surface as
//! calls to the lifecycle manager's reload, not through this trait.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

/// Resolves the effective config for a plugin.
pub trait ConfigProvider: Send + Sync {
    /// Deep-merge any persisted overrides into the plugin's defaults.
    fn get_config(&self, plugin: &str, defaults: &Value) -> Value;
}

/// Deep merge: `overlay` wins field-by-field, recursing into objects.
///
/// Later overrides earlier, the same way layered config files merge.
pub fn merge_values(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut merged = base_map.clone();
            for (key, overlay_value) in overlay_map {
                let entry = match merged.get(key) {
                    Some(base_value) => merge_values(base_value, overlay_value),
                    None => overlay_value.clone(),
                };
                merged.insert(key.clone(), entry);
            }
            Value::Object(merged)
        }
        (_, Value::Null) => base.clone(),
        _ => overlay.clone(),
    }
}

/// In-memory provider: overrides set programmatically, merged on demand.
#[derive(Default)]
pub struct MemoryConfigProvider {
    overrides: Mutex<HashMap<String, Value>>,
}

impl MemoryConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or replace) the override blob for a plugin.
    pub fn set_override(&self, plugin: &str, value: Value) {
        self.overrides
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(plugin.to_string(), value);
    }
}

impl ConfigProvider for MemoryConfigProvider {
    fn get_config(&self, plugin: &str, defaults: &Value) -> Value {
        let overrides = self.overrides.lock().unwrap_or_else(|p| p.into_inner());
        match overrides.get(plugin) {
            Some(overlay) => merge_values(defaults, overlay),
            None => defaults.clone(),
        }
    }
}
