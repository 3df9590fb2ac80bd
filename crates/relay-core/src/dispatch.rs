//! Per-event dispatch: routing, permission, middleware, and fallback.
//!
//! One [`Dispatcher::handle_event`] call per inbound message. The flow:
//! extract text (stripping a leading @-mention of the bot on group
//! events), tokenize, match against the command table, then either run
//! the matched command -- scope check, permission check, middleware,
//! argument validation, handler, commit -- or walk the message-handler
//! chain until one intercepts. Every failure is scoped to the one event:
//! handler and middleware errors are caught here, logged with plugin
//! context, and swallowed.

use std::sync::{Arc, Mutex, RwLock};

use futures_util::future::BoxFuture;
use tracing::{debug, warn};

use relay_perm::{Decision, PermissionResolver};
use relay_types::{MessageEvent, Scope, Segment};

use crate::args::validate;
use crate::command_table::{CommandEntry, CommandMatch};
use crate::context::Context;
use crate::lifecycle::RouterState;
use crate::middleware::{run_chain, MetaKind, Middleware, MiddlewareMeta};
use crate::plugin::{HandlerFlow, MessageHandler, Plugin};
use crate::transport::Transport;

/// Routes inbound events to plugin commands and message handlers.
pub struct Dispatcher {
    state: Arc<RwLock<RouterState>>,
    resolver: Arc<PermissionResolver>,
    transport: Arc<dyn Transport>,
    middleware: Vec<Arc<dyn Middleware>>,
}

/// What the routing lock produced for one event. Computed entirely under
/// the read guard; the guard is dropped before anything awaits.
enum Routed {
    Command(CommandEntry, Vec<String>),
    Usage(String),
    Fallback(Vec<Arc<Plugin>>),
}

impl Dispatcher {
    pub fn new(
        state: Arc<RwLock<RouterState>>,
        resolver: Arc<PermissionResolver>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            state,
            resolver,
            transport,
            middleware: Vec::new(),
        }
    }

    /// Append a middleware to the shared chain. Runs for both command and
    /// message execution, in registration order.
    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Dispatch one inbound event to completion.
    ///
    /// Never returns an error for handler-level failures; those are
    /// logged and swallowed so one event cannot take down its neighbors.
    pub async fn handle_event(&self, event: MessageEvent) {
        let ctx = Arc::new(Context::new(event.clone(), Arc::clone(&self.transport)));

        let text = extract_text(&event);
        if text.is_empty() {
            debug!("empty message text, dispatch aborted");
            return;
        }
        let argv: Vec<String> = text.split_whitespace().map(str::to_string).collect();

        let routed = {
            let state = self.state.read().unwrap_or_else(|p| p.into_inner());
            match state.table.match_argv(&argv) {
                CommandMatch::Matched { entry, raw_args } => Routed::Command(entry, raw_args),
                CommandMatch::UnknownSub { root } => Routed::Usage(state.table.usage_for_root(&root)),
                CommandMatch::NoMatch => Routed::Fallback(state.plugins.clone()),
            }
        };

        match routed {
            Routed::Command(entry, raw_args) => self.run_command(ctx, entry, raw_args).await,
            Routed::Usage(listing) => {
                ctx.reply_text(listing);
                self.commit(&ctx, "usage").await;
            }
            Routed::Fallback(plugins) => self.run_message_handlers(ctx, plugins).await,
        }
    }

    async fn run_command(&self, ctx: Arc<Context>, entry: CommandEntry, raw_args: Vec<String>) {
        let event = &ctx.event;
        let is_group = event.is_group();

        // Scope: both the owning plugin's declared scope and the command's
        // own scope must admit the event.
        let violated = [entry.plugin_scope, entry.command.scope]
            .into_iter()
            .find(|scope| !scope.permits_event(is_group));
        if let Some(scope) = violated {
            let notice = match scope {
                Scope::Group => "this command is only available in group chat",
                Scope::Private => "this command is only available in private chat",
                Scope::All => return,
            };
            ctx.reply_text(notice);
            self.commit(&ctx, &entry.plugin).await;
            return;
        }

        // Permission: a deny drops the event with no reply, so the command
        // does not reveal its existence to unauthorized callers.
        match self.resolver.check(
            event.user_id,
            event.group_id,
            &entry.plugin,
            &entry.command.basename,
            &entry.command.permission,
        ) {
            Ok(Decision::Allow) => {}
            Ok(Decision::Deny) => {
                debug!(
                    plugin = %entry.plugin,
                    command = %entry.command.basename,
                    "permission denied, event dropped"
                );
                return;
            }
            Err(e) => {
                warn!(plugin = %entry.plugin, error = %e, "permission check failed");
                return;
            }
        }

        let meta = MiddlewareMeta {
            kind: MetaKind::Command,
            plugin: entry.plugin.clone(),
            command: Some(entry.command.basename.clone()),
            permission: Some(entry.command.permission.clone()),
            raw_args: Some(raw_args.clone()),
        };

        // Terminal action: validate arguments, then run the handler.
        // Validation failure replies and never invokes the handler.
        let command = Arc::clone(&entry.command);
        let terminal = move |ctx: Arc<Context>| -> BoxFuture<'static, anyhow::Result<()>> {
            let command = Arc::clone(&command);
            let raw_args = raw_args.clone();
            Box::pin(async move {
                match validate(&command.args, &raw_args) {
                    Ok(values) => command.invoke(ctx, values).await,
                    Err(failure) => {
                        ctx.reply_text(failure.render());
                        Ok(())
                    }
                }
            })
        };

        if let Err(e) = run_chain(&self.middleware, Arc::clone(&ctx), &meta, &terminal).await {
            warn!(
                plugin = %entry.plugin,
                command = %entry.command.basename,
                error = %e,
                "command failed"
            );
            return;
        }

        self.commit(&ctx, &entry.plugin).await;
    }

    async fn run_message_handlers(&self, ctx: Arc<Context>, plugins: Vec<Arc<Plugin>>) {
        let event = &ctx.event;
        let is_group = event.is_group();

        for plugin in &plugins {
            if !plugin.meta.scope.permits_event(is_group) {
                continue;
            }
            for handler in &plugin.handlers {
                if !handler.scope.permits_event(is_group) {
                    continue;
                }

                // Handler-level permission is optional; absent means open.
                if let Some(permission) = &handler.permission {
                    match self.resolver.check(
                        event.user_id,
                        event.group_id,
                        &plugin.meta.name,
                        "",
                        permission,
                    ) {
                        Ok(Decision::Allow) => {}
                        Ok(Decision::Deny) => continue,
                        Err(e) => {
                            warn!(plugin = %plugin.meta.name, error = %e, "permission check failed");
                            continue;
                        }
                    }
                }

                match self.run_one_handler(&ctx, plugin, handler).await {
                    Ok(HandlerFlow::Intercept) => {
                        self.commit(&ctx, &plugin.meta.name).await;
                        return;
                    }
                    Ok(HandlerFlow::Pass) => {}
                    Err(e) => {
                        // One broken handler must not silence the rest.
                        warn!(plugin = %plugin.meta.name, error = %e, "message handler failed");
                    }
                }
            }
        }
    }

    async fn run_one_handler(
        &self,
        ctx: &Arc<Context>,
        plugin: &Arc<Plugin>,
        handler: &MessageHandler,
    ) -> anyhow::Result<HandlerFlow> {
        let meta = MiddlewareMeta {
            kind: MetaKind::Message,
            plugin: plugin.meta.name.clone(),
            command: None,
            permission: handler.permission.clone(),
            raw_args: None,
        };

        // The chain's terminal returns (), so the handler's tri-state
        // outcome travels out through a shared slot. A middleware that
        // short-circuits leaves it at Pass.
        let flow = Arc::new(Mutex::new(HandlerFlow::Pass));
        let handler = handler.clone();
        let slot = Arc::clone(&flow);
        let terminal = move |ctx: Arc<Context>| -> BoxFuture<'static, anyhow::Result<()>> {
            let handler = handler.clone();
            let slot = Arc::clone(&slot);
            Box::pin(async move {
                let outcome = handler.invoke(ctx).await?;
                *slot.lock().unwrap_or_else(|p| p.into_inner()) = outcome;
                Ok(())
            })
        };

        run_chain(&self.middleware, Arc::clone(ctx), &meta, &terminal).await?;
        let flow = *flow.lock().unwrap_or_else(|p| p.into_inner());
        Ok(flow)
    }

    async fn commit(&self, ctx: &Context, plugin: &str) {
        if let Err(e) = ctx.commit().await {
            warn!(plugin, error = %e, "reply commit failed");
        }
    }
}

/// Extract the dispatchable text of an event.
///
/// On group events a leading @-mention of the bot is stripped before the
/// text is assembled, so `@bot echo hi` and `echo hi` route identically.
fn extract_text(event: &MessageEvent) -> String {
    let mut segments = event.segments.as_slice();
    if event.is_group() {
        if let Some(Segment::At { target }) = segments.first() {
            if *target == event.self_id.0 {
                segments = &segments[1..];
            }
        }
    }
    Segment::text_of(segments).trim().to_string()
}
