//! Inbound message events delivered by the transport.

use serde::{Deserialize, Serialize};

use crate::ids::{GroupId, MessageId, UserId};
use crate::segment::Segment;

/// One inbound chat message, group or private.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEvent {
    /// Backend identifier of the triggering message.
    pub message_id: MessageId,
    /// The sender.
    pub user_id: UserId,
    /// The group the message arrived in; `None` for private chat.
    pub group_id: Option<GroupId>,
    /// The bot's own identity on this connection.
    pub self_id: UserId,
    /// Raw message content.
    pub segments: Vec<Segment>,
}

impl MessageEvent {
    /// Build a group message event.
    pub fn group(
        message_id: i64,
        user_id: i64,
        group_id: i64,
        self_id: i64,
        segments: Vec<Segment>,
    ) -> Self {
        Self {
            message_id: MessageId(message_id),
            user_id: UserId(user_id),
            group_id: Some(GroupId(group_id)),
            self_id: UserId(self_id),
            segments,
        }
    }

    /// Build a private message event.
    pub fn private(message_id: i64, user_id: i64, self_id: i64, segments: Vec<Segment>) -> Self {
        Self {
            message_id: MessageId(message_id),
            user_id: UserId(user_id),
            group_id: None,
            self_id: UserId(self_id),
            segments,
        }
    }

    /// Whether this event arrived in a group.
    pub fn is_group(&self) -> bool {
        self.group_id.is_some()
    }
}
