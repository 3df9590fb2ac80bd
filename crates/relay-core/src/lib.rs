//! Dispatch, middleware, and plugin lifecycle for the relay bot framework.
//!
//! The engine that decides, for every inbound chat event, which piece of
//! plugin code handles it, under what middleware and permission
//! constraints, and how plugin registrations are swapped safely while
//! events keep arriving.
//!
//! - [`Plugin`] / [`Command`] / [`MessageHandler`] -- plugin descriptors
//! - [`CommandTable`] -- basename-keyed routing with sub-command roots
//! - [`ArgSpec`] / [`validate`] -- static-arity positional validation
//! - [`Middleware`] / [`Next`] -- continuation-passing interceptor chain
//! - [`Context`] -- per-event reply buffer with idempotent commit and recall
//! - [`Dispatcher`] -- per-event orchestration
//! - [`PluginManager`] -- load/unload/reload behind one routing lock
//! - [`Transport`] / [`ConfigProvider`] -- external collaborator contracts
//! - [`management_plugin`] -- built-in enable/disable commands

pub mod args;
pub mod builtin;
pub mod command_table;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod lifecycle;
pub mod middleware;
pub mod plugin;
pub mod transport;

pub use args::{validate, ArgKind, ArgSchema, ArgSpec, ArgValue, ValidationFailure};
pub use builtin::management_plugin;
pub use command_table::{CommandEntry, CommandMatch, CommandTable, RegisterOutcome};
pub use config::{merge_values, ConfigProvider, MemoryConfigProvider};
pub use context::Context;
pub use dispatch::Dispatcher;
pub use lifecycle::{PluginManager, RouterState};
pub use middleware::{run_chain, MetaKind, Middleware, MiddlewareMeta, Next, RateLimit};
pub use plugin::{Command, HandlerFlow, MessageHandler, Plugin, PluginMeta};
pub use transport::{MemoryTransport, SentMessage, Transport};
