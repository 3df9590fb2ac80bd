//! Per-event context: reply accumulation, commit, and recall.
//!
//! One [`Context`] exists per inbound event. Handlers and middleware push
//! segments into its reply buffer; [`Context::commit`] flushes the buffer
//! through the transport exactly once per reply cycle. A send-in-progress
//! flag makes a concurrent second commit a no-op. Recall timers spawned
//! from a context outlive it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::warn;

use relay_types::{MessageEvent, MessageId, Segment, UserId};

use crate::transport::Transport;

/// Per-event dispatch context handed to handlers and middleware.
pub struct Context {
    pub event: MessageEvent,
    transport: Arc<dyn Transport>,
    reply: Mutex<Vec<Segment>>,
    sending: AtomicBool,
}

impl Context {
    pub fn new(event: MessageEvent, transport: Arc<dyn Transport>) -> Self {
        Self {
            event,
            transport,
            reply: Mutex::new(Vec::new()),
            sending: AtomicBool::new(false),
        }
    }

    pub fn self_id(&self) -> UserId {
        self.event.self_id
    }

    /// Append a segment to the pending reply.
    pub fn reply(&self, segment: Segment) {
        self.reply
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(segment);
    }

    /// Append a text segment to the pending reply.
    pub fn reply_text(&self, text: impl Into<String>) {
        self.reply(Segment::text(text));
    }

    pub fn has_reply(&self) -> bool {
        !self.reply.lock().unwrap_or_else(|p| p.into_inner()).is_empty()
    }

    /// Flush and send the accumulated reply.
    ///
    /// Addressing follows the triggering event: group events reply to the
    /// group, private events to the sender. While one commit is in flight
    /// any further commit on the same context is a no-op; the buffer is
    /// taken before the send, so it is empty after either call. An empty
    /// buffer sends nothing.
    pub async fn commit(&self) -> anyhow::Result<Option<MessageId>> {
        if self
            .sending
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(None);
        }

        let segments = std::mem::take(&mut *self.reply.lock().unwrap_or_else(|p| p.into_inner()));
        if segments.is_empty() {
            self.sending.store(false, Ordering::SeqCst);
            return Ok(None);
        }

        let result = match self.event.group_id {
            Some(group) => self.transport.send_group_message(group, segments).await,
            None => {
                self.transport
                    .send_private_message(self.event.user_id, segments)
                    .await
            }
        };

        self.sending.store(false, Ordering::SeqCst);
        Ok(Some(result?))
    }

    /// Schedule deletion of a sent message after a delay.
    ///
    /// The timer holds its own transport handle and keeps running after
    /// the context is dropped.
    pub fn recall_after(&self, message: MessageId, delay: Duration) {
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = transport.delete_message(message).await {
                warn!(message = message.0, error = %e, "recall failed");
            }
        });
    }
}
