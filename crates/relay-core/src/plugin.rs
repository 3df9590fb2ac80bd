//! Plugin descriptors -- what a plugin supplies to the core.
//!
//! Provides:
//! - [`PluginMeta`] -- name, version, description, declared scope
//! - [`Command`] -- an invocation pattern with derived basename/root, an
//!   argument spec, a permission config, and an async handler
//! - [`MessageHandler`] -- a scope-filtered fallback handler returning
//!   [`HandlerFlow`]
//! - [`Plugin`] -- the fully-constructed descriptor the lifecycle manager
//!   registers
//!
//! Descriptors are plain value types with every optional field defaulted
//! at construction; dispatch never probes for absent fields.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use relay_types::{CommandPermissionConfig, Scope};

use crate::args::{ArgSpec, ArgValue};
use crate::context::Context;

/// Boxed async command handler.
pub type CommandFn =
    Arc<dyn Fn(Arc<Context>, Vec<ArgValue>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Boxed async message handler.
pub type MessageFn =
    Arc<dyn Fn(Arc<Context>) -> BoxFuture<'static, anyhow::Result<HandlerFlow>> + Send + Sync>;

/// Lifecycle callback invoked on plugin load/unload.
pub type LifecycleFn = Arc<dyn Fn() + Send + Sync>;

/// What a message handler decided about an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerFlow {
    /// The handler consumed the event; stop iterating.
    Intercept,
    /// Not handled; continue with the next handler.
    Pass,
}

/// Plugin identity and declared attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginMeta {
    pub name: String,
    pub version: String,
    pub description: String,
    pub scope: Scope,
}

/// One registered command.
///
/// `name` is the full invocation pattern (`"echo <msg>"`); `basename` is
/// the literal-token prefix with everything from the first `-`, `<`, or
/// `[` token onward stripped, and `root` is the basename's first token.
/// Commands sharing a root form a sub-command family.
#[derive(Clone)]
pub struct Command {
    pub name: String,
    pub basename: String,
    pub root: String,
    pub description: String,
    pub args: ArgSpec,
    pub scope: Scope,
    pub permission: CommandPermissionConfig,
    handler: CommandFn,
}

impl Command {
    pub fn new<F, Fut>(name: &str, description: &str, handler: F) -> Self
    where
        F: Fn(Arc<Context>, Vec<ArgValue>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let basename = parse_basename(name);
        let root = basename
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();
        Self {
            name: name.to_string(),
            basename,
            root,
            description: description.to_string(),
            args: ArgSpec::None,
            scope: Scope::All,
            permission: CommandPermissionConfig::default(),
            handler: Arc::new(move |ctx, args| Box::pin(handler(ctx, args))),
        }
    }

    pub fn with_args(mut self, args: ArgSpec) -> Self {
        self.args = args;
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Accepts a bare [`relay_types::PermissionLevel`] or a full config.
    pub fn with_permission(mut self, permission: impl Into<CommandPermissionConfig>) -> Self {
        self.permission = permission.into();
        self
    }

    pub async fn invoke(&self, ctx: Arc<Context>, args: Vec<ArgValue>) -> anyhow::Result<()> {
        (self.handler)(ctx, args).await
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("basename", &self.basename)
            .field("root", &self.root)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// A fallback handler run when no command matches.
#[derive(Clone)]
pub struct MessageHandler {
    pub scope: Scope,
    pub permission: Option<CommandPermissionConfig>,
    handler: MessageFn,
}

impl MessageHandler {
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(Arc<Context>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<HandlerFlow>> + Send + 'static,
    {
        Self {
            scope: Scope::All,
            permission: None,
            handler: Arc::new(move |ctx| Box::pin(handler(ctx))),
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_permission(mut self, permission: impl Into<CommandPermissionConfig>) -> Self {
        self.permission = Some(permission.into());
        self
    }

    pub async fn invoke(&self, ctx: Arc<Context>) -> anyhow::Result<HandlerFlow> {
        (self.handler)(ctx).await
    }
}

impl fmt::Debug for MessageHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageHandler")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// A fully-constructed plugin descriptor.
///
/// While registered, the plugin is the unique owner of its commands and
/// handlers; unregistering tears all of them down together.
#[derive(Clone)]
pub struct Plugin {
    pub meta: PluginMeta,
    pub commands: Vec<Arc<Command>>,
    pub handlers: Vec<MessageHandler>,
    /// Declared config defaults. Never mutated after construction, so a
    /// config change can always re-merge from a pristine base.
    pub default_config: serde_json::Value,
    /// Merged config blob, owned by the external config collaborator and
    /// injected at load time.
    pub config: serde_json::Value,
    pub on_load: Option<LifecycleFn>,
    pub on_unload: Option<LifecycleFn>,
}

impl Plugin {
    pub fn new(name: &str) -> Self {
        Self {
            meta: PluginMeta {
                name: name.to_string(),
                version: "0.1.0".to_string(),
                description: String::new(),
                scope: Scope::All,
            },
            commands: Vec::new(),
            handlers: Vec::new(),
            default_config: serde_json::Value::Null,
            config: serde_json::Value::Null,
            on_load: None,
            on_unload: None,
        }
    }

    pub fn version(mut self, version: &str) -> Self {
        self.meta.version = version.to_string();
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.meta.description = description.to_string();
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.meta.scope = scope;
        self
    }

    pub fn command(mut self, command: Command) -> Self {
        self.commands.push(Arc::new(command));
        self
    }

    pub fn handler(mut self, handler: MessageHandler) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Default config the provider merges persisted overrides into.
    pub fn config(mut self, config: serde_json::Value) -> Self {
        self.default_config = config.clone();
        self.config = config;
        self
    }

    pub fn on_load(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_load = Some(Arc::new(f));
        self
    }

    pub fn on_unload(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_unload = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("meta", &self.meta)
            .field("commands", &self.commands.len())
            .field("handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}

/// Strip everything from the first `-`, `<`, or `[` token onward and trim.
///
/// `"echo <msg>"` -> `"echo"`; `"plugin enable <name>"` -> `"plugin enable"`.
fn parse_basename(name: &str) -> String {
    let mut literal = Vec::new();
    for token in name.split_whitespace() {
        if token.starts_with('-') || token.starts_with('<') || token.starts_with('[') {
            break;
        }
        literal.push(token);
    }
    literal.join(" ")
}
