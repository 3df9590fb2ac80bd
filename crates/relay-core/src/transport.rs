//! The message-transport collaborator.
//!
//! The core depends only on this shape; the wire protocol behind it is
//! someone else's problem. [`MemoryTransport`] is an in-process sink used
//! by tests and local harnesses.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use relay_types::{GroupId, MessageId, RelayError, Segment, UserId};

/// Opaque client for the chat backend.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self) -> Result<(), RelayError>;

    async fn send_group_message(
        &self,
        group: GroupId,
        segments: Vec<Segment>,
    ) -> Result<MessageId, RelayError>;

    async fn send_private_message(
        &self,
        user: UserId,
        segments: Vec<Segment>,
    ) -> Result<MessageId, RelayError>;

    /// Recall a previously sent message.
    async fn delete_message(&self, message: MessageId) -> Result<(), RelayError>;
}

/// A message captured by [`MemoryTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub message_id: MessageId,
    /// `None` for private messages.
    pub group: Option<GroupId>,
    pub user: Option<UserId>,
    pub segments: Vec<Segment>,
}

/// In-memory transport that records every send and delete.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    next_id: AtomicI64,
    sent: Mutex<Vec<SentMessage>>,
    deleted: Mutex<Vec<MessageId>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far, in order.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Messages deleted so far.
    pub fn deleted(&self) -> Vec<MessageId> {
        self.deleted
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Concatenated text of all sent messages. Test convenience.
    pub fn sent_text(&self) -> Vec<String> {
        self.sent()
            .iter()
            .map(|m| Segment::text_of(&m.segments))
            .collect()
    }

    fn record(&self, group: Option<GroupId>, user: Option<UserId>, segments: Vec<Segment>) -> MessageId {
        let id = MessageId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.sent
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(SentMessage {
                message_id: id,
                group,
                user,
                segments,
            });
        id
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self) -> Result<(), RelayError> {
        Ok(())
    }

    async fn send_group_message(
        &self,
        group: GroupId,
        segments: Vec<Segment>,
    ) -> Result<MessageId, RelayError> {
        Ok(self.record(Some(group), None, segments))
    }

    async fn send_private_message(
        &self,
        user: UserId,
        segments: Vec<Segment>,
    ) -> Result<MessageId, RelayError> {
        Ok(self.record(None, Some(user), segments))
    }

    async fn delete_message(&self, message: MessageId) -> Result<(), RelayError> {
        self.deleted
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(message);
        Ok(())
    }
}
