use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Notification, Role};
use crate::vote::VoteValue;

// -- JWT Claims --

/// JWT claims issued by the core API. Shared by the REST middleware and the
/// WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub role: Role,
    pub exp: usize,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostMessageRequest {
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub is_announcement: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PinResponse {
    pub message_id: Uuid,
    pub pinned: bool,
}

// -- Votes --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VoteRequest {
    pub value: VoteValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteResponse {
    pub message_id: Uuid,
    pub score: i64,
    pub my_vote: VoteValue,
}

// -- Notifications --

#[derive(Debug, Serialize, Deserialize)]
pub struct NotificationList {
    pub unread: u32,
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkAllReadResponse {
    pub updated: usize,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
