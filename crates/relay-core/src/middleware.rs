//! Ordered interceptor chain shared by command and message execution.
//!
//! Middleware compose via explicit continuation: interceptor *i* receives
//! a [`Next`] and must call [`Next::run`] to proceed to interceptor *i+1*
//! or, at the end of the chain, to the terminal action. Not calling it
//! silently drops the unit of work -- the designed short-circuit, used
//! for things like rate limiting. One registered list serves both paths,
//! distinguished only by [`MiddlewareMeta::kind`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tracing::warn;

use relay_types::{CommandPermissionConfig, UserId};

use crate::context::Context;

/// What kind of unit of work is flowing through the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaKind {
    Command,
    Message,
}

/// Read-only description of the in-flight unit of work.
#[derive(Debug, Clone)]
pub struct MiddlewareMeta {
    pub kind: MetaKind,
    pub plugin: String,
    /// The matched basename; `None` on the message path.
    pub command: Option<String>,
    /// The permission config in effect, if any.
    pub permission: Option<CommandPermissionConfig>,
    /// Raw tokens after the basename; `None` on the message path.
    pub raw_args: Option<Vec<String>>,
}

/// The terminal action at the end of the chain.
pub type Terminal<'a> =
    &'a (dyn Fn(Arc<Context>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync);

/// An interceptor in the chain.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(
        &self,
        ctx: Arc<Context>,
        meta: &MiddlewareMeta,
        next: Next<'_>,
    ) -> anyhow::Result<()>;
}

/// The remainder of the chain from the current position onward.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    terminal: Terminal<'a>,
}

impl<'a> Next<'a> {
    /// Proceed to the next interceptor, or to the terminal action when the
    /// chain is exhausted.
    pub async fn run(self, ctx: Arc<Context>, meta: &MiddlewareMeta) -> anyhow::Result<()> {
        match self.chain.split_first() {
            Some((head, rest)) => {
                head.handle(
                    ctx,
                    meta,
                    Next {
                        chain: rest,
                        terminal: self.terminal,
                    },
                )
                .await
            }
            None => (self.terminal)(ctx).await,
        }
    }
}

/// Run a chain to completion for one unit of work.
pub async fn run_chain(
    chain: &[Arc<dyn Middleware>],
    ctx: Arc<Context>,
    meta: &MiddlewareMeta,
    terminal: Terminal<'_>,
) -> anyhow::Result<()> {
    Next { chain, terminal }.run(ctx, meta).await
}

// ---------------------------------------------------------------------------
// Rate limiting
// ---------------------------------------------------------------------------

/// Token bucket for one caller.
#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    max_tokens: u32,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(rate_per_minute: u32, burst: u32) -> Self {
        Self {
            tokens: burst as f64,
            max_tokens: burst,
            refill_rate: rate_per_minute as f64 / 60.0,
            last_refill: Instant::now(),
        }
    }

    fn try_consume(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens as f64);
            self.last_refill = now;
        }
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Per-user rate limiting middleware.
///
/// When a caller's bucket is exhausted the chain is not continued, which
/// drops the event without a reply.
pub struct RateLimit {
    rate_per_minute: u32,
    burst: u32,
    buckets: Mutex<HashMap<UserId, TokenBucket>>,
}

impl RateLimit {
    pub fn new(rate_per_minute: u32, burst: u32) -> Self {
        Self {
            rate_per_minute,
            burst,
            buckets: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Middleware for RateLimit {
    async fn handle(
        &self,
        ctx: Arc<Context>,
        meta: &MiddlewareMeta,
        next: Next<'_>,
    ) -> anyhow::Result<()> {
        let user = ctx.event.user_id;
        let allowed = {
            let mut buckets = self.buckets.lock().unwrap_or_else(|p| p.into_inner());
            buckets
                .entry(user)
                .or_insert_with(|| TokenBucket::new(self.rate_per_minute, self.burst))
                .try_consume()
        };

        if !allowed {
            warn!(user = user.0, plugin = %meta.plugin, "rate limited, event dropped");
            return Ok(());
        }

        next.run(ctx, meta).await
    }
}
