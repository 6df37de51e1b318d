use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, Notification};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, name: String },

    /// The connection now receives events for this event's forum
    Joined { event_id: Uuid },

    /// The user may not view this event's forum
    JoinDenied { event_id: Uuid },

    /// A message or reply was posted
    NewMessage { event_id: Uuid, message: Message },

    /// A message was soft-deleted; its replies remain
    MessageDeleted { event_id: Uuid, message_id: Uuid },

    /// A message was pinned or unpinned
    MessagePinned {
        event_id: Uuid,
        message_id: Uuid,
        pinned: bool,
    },

    /// A message's tally changed
    MessageVoted {
        event_id: Uuid,
        message_id: Uuid,
        score: i64,
    },

    /// Targeted to a single user
    Notification { notification: Notification },
}

impl GatewayEvent {
    /// Returns the event room this gateway event is scoped to.
    /// Events that return `None` are connection- or user-targeted.
    pub fn event_id(&self) -> Option<Uuid> {
        match self {
            Self::NewMessage { event_id, .. }
            | Self::MessageDeleted { event_id, .. }
            | Self::MessagePinned { event_id, .. }
            | Self::MessageVoted { event_id, .. } => Some(*event_id),
            _ => None,
        }
    }

    /// Structural changes invalidate the whole tree; clients refetch on these.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::NewMessage { .. } | Self::MessageDeleted { .. } | Self::MessagePinned { .. }
        )
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Start receiving an event's forum updates
    JoinEvent { event_id: Uuid },

    /// Stop receiving an event's forum updates
    LeaveEvent { event_id: Uuid },
}
