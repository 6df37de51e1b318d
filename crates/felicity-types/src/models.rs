use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account role as issued by the core API in the JWT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Participant,
    Organizer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Participant => "participant",
            Self::Organizer => "organizer",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "participant" => Ok(Self::Participant),
            "organizer" => Ok(Self::Organizer),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// A forum post. `content` is `None` once the message has been deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub event_id: Uuid,
    pub author_id: Uuid,
    pub author_name: String,
    pub author_role: Role,
    pub parent_id: Option<Uuid>,
    pub content: Option<String>,
    pub is_pinned: bool,
    pub is_announcement: bool,
    pub is_deleted: bool,
    pub score: i64,
    pub created_at: DateTime<Utc>,
}

/// A message with its replies, as returned by the thread listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageNode {
    #[serde(flatten)]
    pub message: Message,
    /// The requesting user's current vote on this message.
    pub my_vote: i8,
    pub depth: u32,
    /// Number of descendants, not just direct children.
    pub reply_count: usize,
    pub children: Vec<MessageNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub event_id: Option<Uuid>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Event metadata as known by the core API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventInfo {
    pub id: Uuid,
    pub name: String,
    pub organizer_id: Uuid,
}

/// What a user may do in one event's forum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForumAccess {
    pub can_view: bool,
    pub can_post: bool,
    pub can_moderate: bool,
}

impl ForumAccess {
    pub const NONE: Self = Self {
        can_view: false,
        can_post: false,
        can_moderate: false,
    };

    /// Resolve access for a user on an event.
    ///
    /// Admins and the owning organizer moderate; registered participants
    /// post. Organizers of other events are treated like unregistered users.
    pub fn resolve(user_id: Uuid, role: Role, event: &EventInfo, registered: bool) -> Self {
        match role {
            Role::Admin => Self {
                can_view: true,
                can_post: true,
                can_moderate: true,
            },
            Role::Organizer if event.organizer_id == user_id => Self {
                can_view: true,
                can_post: true,
                can_moderate: true,
            },
            _ if registered => Self {
                can_view: true,
                can_post: true,
                can_moderate: false,
            },
            _ => Self::NONE,
        }
    }
}
