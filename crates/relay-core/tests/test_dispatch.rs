//! Integration tests for end-to-end event dispatch.
//!
//! Exercises the full path: lifecycle manager -> command table ->
//! permission resolver -> middleware -> argument validation -> handler ->
//! reply commit, plus the message-handler fallback chain.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use relay_core::{
    management_plugin, ArgSchema, ArgSpec, Command, Context, Dispatcher, HandlerFlow,
    MemoryConfigProvider, MemoryTransport, MessageHandler, Middleware, MiddlewareMeta, Next,
    Plugin, PluginManager,
};
use relay_perm::{PermissionResolver, PermissionStore};
use relay_types::{MessageEvent, PermissionLevel, Scope, Segment, UserId};

const SELF_ID: i64 = 99;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Bot {
    manager: PluginManager,
    resolver: Arc<PermissionResolver>,
    transport: Arc<MemoryTransport>,
    dispatcher: Dispatcher,
}

fn bot() -> Bot {
    let manager = PluginManager::new(Arc::new(MemoryConfigProvider::new()));
    let resolver = Arc::new(PermissionResolver::new(
        PermissionStore::open_in_memory().unwrap(),
        UserId(SELF_ID),
    ));
    let transport = Arc::new(MemoryTransport::new());
    let dispatcher = Dispatcher::new(
        manager.state(),
        Arc::clone(&resolver),
        transport.clone() as Arc<dyn relay_core::Transport>,
    );
    Bot {
        manager,
        resolver,
        transport,
        dispatcher,
    }
}

fn echo_plugin() -> Plugin {
    Plugin::new("echo").command(
        Command::new("echo <msg>", "repeats its argument", |ctx: Arc<Context>, args| async move {
            ctx.reply_text(args[0].as_str().unwrap_or_default().to_string());
            Ok(())
        })
        .with_args(ArgSpec::Single(ArgSchema::str("msg"))),
    )
}

fn private(user: i64, text: &str) -> MessageEvent {
    MessageEvent::private(1, user, SELF_ID, vec![Segment::text(text)])
}

fn group(user: i64, group_id: i64, text: &str) -> MessageEvent {
    MessageEvent::group(1, user, group_id, SELF_ID, vec![Segment::text(text)])
}

// ---------------------------------------------------------------------------
// Command path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn echo_end_to_end() {
    let bot = bot();
    bot.manager.load(echo_plugin()).unwrap();

    bot.dispatcher.handle_event(private(10, "echo hi")).await;

    assert_eq!(bot.transport.sent_text(), vec!["hi"]);
}

#[tokio::test]
async fn missing_argument_replies_validation_failure() {
    let bot = bot();
    bot.manager.load(echo_plugin()).unwrap();

    bot.dispatcher.handle_event(private(10, "echo")).await;

    let sent = bot.transport.sent_text();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("invalid arguments"));
    assert!(sent[0].contains("msg"));
}

#[tokio::test]
async fn group_mention_of_bot_is_stripped() {
    let bot = bot();
    bot.manager.load(echo_plugin()).unwrap();

    let event = MessageEvent::group(
        1,
        10,
        20,
        SELF_ID,
        vec![Segment::At { target: SELF_ID }, Segment::text(" echo hello")],
    );
    bot.dispatcher.handle_event(event).await;

    assert_eq!(bot.transport.sent_text(), vec!["hello"]);
    // The reply went back to the group.
    assert_eq!(bot.transport.sent()[0].group.map(|g| g.0), Some(20));
}

#[tokio::test]
async fn empty_message_is_dropped() {
    let bot = bot();
    bot.manager.load(echo_plugin()).unwrap();

    let event = MessageEvent::group(1, 10, 20, SELF_ID, vec![Segment::At { target: SELF_ID }]);
    bot.dispatcher.handle_event(event).await;

    assert!(bot.transport.sent().is_empty());
}

#[tokio::test]
async fn unknown_subcommand_lists_siblings_sorted() {
    let bot = bot();
    bot.manager
        .load(management_plugin(
            Arc::clone(&bot.resolver),
            bot.manager.state(),
        ))
        .unwrap();

    bot.dispatcher
        .handle_event(private(10, "plugin frobnicate"))
        .await;

    let sent = bot.transport.sent_text();
    assert_eq!(sent.len(), 1);
    let disable_at = sent[0].find("plugin disable <name>").unwrap();
    let enable_at = sent[0].find("plugin enable <name>").unwrap();
    let list_at = sent[0].find("plugin list").unwrap();
    assert!(disable_at < enable_at && enable_at < list_at, "sorted listing");
}

#[tokio::test]
async fn unknown_subcommand_stops_before_message_handlers() {
    let bot = bot();
    bot.manager
        .load(management_plugin(
            Arc::clone(&bot.resolver),
            bot.manager.state(),
        ))
        .unwrap();
    let fired = Arc::new(AtomicUsize::new(0));
    let f = Arc::clone(&fired);
    bot.manager
        .load(
            Plugin::new("catchall").handler(MessageHandler::new(move |ctx: Arc<Context>| {
                let fired = Arc::clone(&f);
                async move {
                    fired.fetch_add(1, Ordering::SeqCst);
                    ctx.reply_text("fell through");
                    Ok(HandlerFlow::Intercept)
                }
            })),
        )
        .unwrap();

    bot.dispatcher
        .handle_event(private(10, "plugin frobnicate"))
        .await;

    // The usage reply is the whole response; the fallback chain never runs.
    let sent = bot.transport.sent_text();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("unknown sub-command"));
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_root_falls_through_silently() {
    let bot = bot();
    bot.manager.load(echo_plugin()).unwrap();

    bot.dispatcher.handle_event(private(10, "frobnicate")).await;

    assert!(bot.transport.sent().is_empty());
}

#[tokio::test]
async fn handler_error_is_contained() {
    let bot = bot();
    bot.manager
        .load(Plugin::new("boom").command(Command::new("boom", "", |_ctx, _args| async {
            anyhow::bail!("kaboom")
        })))
        .unwrap();

    bot.dispatcher.handle_event(private(10, "boom")).await;
    // The event is abandoned; nothing is sent and nothing panics.
    assert!(bot.transport.sent().is_empty());
}

// ---------------------------------------------------------------------------
// Scope enforcement
// ---------------------------------------------------------------------------

#[tokio::test]
async fn group_scoped_plugin_rejects_private_event_with_notice() {
    let bot = bot();
    // Plugin declares "group", command claims "all": kept at load with a
    // warning, rejected per event.
    let plugin = Plugin::new("groupy").scope(Scope::Group).command(
        Command::new("gonly <x>", "", |_ctx, _args| async { Ok(()) }).with_scope(Scope::All),
    );
    bot.manager.load(plugin).unwrap();

    bot.dispatcher.handle_event(private(10, "gonly x")).await;

    let sent = bot.transport.sent_text();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("group"));
}

#[tokio::test]
async fn group_scoped_command_runs_in_group() {
    let bot = bot();
    let plugin = Plugin::new("groupy").scope(Scope::Group).command(
        Command::new("gonly", "", |ctx: Arc<Context>, _args| async move {
            ctx.reply_text("ran");
            Ok(())
        })
        .with_scope(Scope::Group),
    );
    bot.manager.load(plugin).unwrap();

    bot.dispatcher.handle_event(group(10, 20, "gonly")).await;

    assert_eq!(bot.transport.sent_text(), vec!["ran"]);
}

// ---------------------------------------------------------------------------
// Permission integration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn denied_caller_gets_no_reply_at_all() {
    let bot = bot();
    bot.manager
        .load(
            Plugin::new("admin").command(
                Command::new("secret", "", |ctx: Arc<Context>, _args| async move {
                    ctx.reply_text("classified");
                    Ok(())
                })
                .with_permission(PermissionLevel::Owner),
            ),
        )
        .unwrap();

    bot.dispatcher.handle_event(private(10, "secret")).await;
    assert!(bot.transport.sent().is_empty(), "deny must be silent");

    // The self identity bypasses the level requirement.
    bot.dispatcher.handle_event(private(SELF_ID, "secret")).await;
    assert_eq!(bot.transport.sent_text(), vec!["classified"]);
}

#[tokio::test]
async fn owner_manages_plugins_through_builtin_commands() {
    let bot = bot();
    bot.manager.load(echo_plugin()).unwrap();
    bot.manager
        .load(management_plugin(
            Arc::clone(&bot.resolver),
            bot.manager.state(),
        ))
        .unwrap();
    bot.resolver.add_owner(UserId(5)).unwrap();

    bot.dispatcher
        .handle_event(private(5, "plugin disable echo"))
        .await;
    assert_eq!(bot.transport.sent_text(), vec!["plugin 'echo' disabled"]);

    // The disabled plugin's command is now silently denied for others.
    bot.dispatcher.handle_event(private(10, "echo hi")).await;
    assert_eq!(bot.transport.sent().len(), 1);

    bot.dispatcher
        .handle_event(private(5, "plugin enable echo"))
        .await;
    bot.dispatcher.handle_event(private(10, "echo hi")).await;
    assert_eq!(
        bot.transport.sent_text(),
        vec!["plugin 'echo' disabled", "plugin 'echo' enabled", "hi"]
    );
}

#[tokio::test]
async fn non_owner_cannot_reach_management_commands() {
    let bot = bot();
    bot.manager.load(echo_plugin()).unwrap();
    bot.manager
        .load(management_plugin(
            Arc::clone(&bot.resolver),
            bot.manager.state(),
        ))
        .unwrap();

    bot.dispatcher
        .handle_event(private(10, "plugin disable echo"))
        .await;
    assert!(bot.transport.sent().is_empty());

    // echo is untouched.
    bot.dispatcher.handle_event(private(10, "echo hi")).await;
    assert_eq!(bot.transport.sent_text(), vec!["hi"]);
}

// ---------------------------------------------------------------------------
// Message-handler fallback
// ---------------------------------------------------------------------------

#[tokio::test]
async fn handlers_run_in_registration_order_until_intercept() {
    let bot = bot();
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));

    let o1 = Arc::clone(&order);
    let first = Plugin::new("first").handler(MessageHandler::new(move |_ctx| {
        let order = Arc::clone(&o1);
        async move {
            order.lock().unwrap().push("first");
            Ok(HandlerFlow::Pass)
        }
    }));

    let o2 = Arc::clone(&order);
    let second = Plugin::new("second").handler(MessageHandler::new(move |ctx: Arc<Context>| {
        let order = Arc::clone(&o2);
        async move {
            order.lock().unwrap().push("second");
            ctx.reply_text("caught");
            Ok(HandlerFlow::Intercept)
        }
    }));

    let o3 = Arc::clone(&order);
    let third = Plugin::new("third").handler(MessageHandler::new(move |_ctx| {
        let order = Arc::clone(&o3);
        async move {
            order.lock().unwrap().push("third");
            Ok(HandlerFlow::Intercept)
        }
    }));

    bot.manager.load(first).unwrap();
    bot.manager.load(second).unwrap();
    bot.manager.load(third).unwrap();

    bot.dispatcher.handle_event(private(10, "just chatting")).await;

    assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    assert_eq!(bot.transport.sent_text(), vec!["caught"]);
}

#[tokio::test]
async fn broken_handler_does_not_stop_iteration() {
    let bot = bot();
    let broken = Plugin::new("broken")
        .handler(MessageHandler::new(|_ctx| async { anyhow::bail!("oops") }));
    let working = Plugin::new("working").handler(MessageHandler::new(
        move |ctx: Arc<Context>| async move {
            ctx.reply_text("recovered");
            Ok(HandlerFlow::Intercept)
        },
    ));

    bot.manager.load(broken).unwrap();
    bot.manager.load(working).unwrap();

    bot.dispatcher.handle_event(private(10, "hello there")).await;

    assert_eq!(bot.transport.sent_text(), vec!["recovered"]);
}

#[tokio::test]
async fn group_only_handler_skipped_for_private_events() {
    let bot = bot();
    let plugin = Plugin::new("groupwatch").handler(
        MessageHandler::new(move |ctx: Arc<Context>| async move {
            ctx.reply_text("seen");
            Ok(HandlerFlow::Intercept)
        })
        .with_scope(Scope::Group),
    );
    bot.manager.load(plugin).unwrap();

    bot.dispatcher.handle_event(private(10, "hello")).await;
    assert!(bot.transport.sent().is_empty());

    bot.dispatcher.handle_event(group(10, 20, "hello")).await;
    assert_eq!(bot.transport.sent_text(), vec!["seen"]);
}

// ---------------------------------------------------------------------------
// Middleware over the dispatch path
// ---------------------------------------------------------------------------

struct CountingGate {
    seen: Arc<AtomicUsize>,
    block: bool,
}

#[async_trait]
impl Middleware for CountingGate {
    async fn handle(
        &self,
        ctx: Arc<Context>,
        meta: &MiddlewareMeta,
        next: Next<'_>,
    ) -> anyhow::Result<()> {
        self.seen.fetch_add(1, Ordering::SeqCst);
        if self.block {
            return Ok(());
        }
        next.run(ctx, meta).await
    }
}

#[tokio::test]
async fn middleware_sees_both_command_and_message_work() {
    let bot = bot();
    let seen = Arc::new(AtomicUsize::new(0));
    let dispatcher = bot.dispatcher.with_middleware(Arc::new(CountingGate {
        seen: Arc::clone(&seen),
        block: false,
    }));

    bot.manager.load(echo_plugin()).unwrap();
    bot.manager
        .load(
            Plugin::new("watch").handler(MessageHandler::new(|_ctx| async {
                Ok(HandlerFlow::Pass)
            })),
        )
        .unwrap();

    dispatcher.handle_event(private(10, "echo hi")).await;
    dispatcher.handle_event(private(10, "unmatched text")).await;

    // Once for the command, once for the single message handler.
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn blocking_middleware_drops_the_command_silently() {
    let bot = bot();
    let seen = Arc::new(AtomicUsize::new(0));
    let dispatcher = bot.dispatcher.with_middleware(Arc::new(CountingGate {
        seen: Arc::clone(&seen),
        block: true,
    }));

    bot.manager.load(echo_plugin()).unwrap();
    dispatcher.handle_event(private(10, "echo hi")).await;

    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert!(bot.transport.sent().is_empty());
}
