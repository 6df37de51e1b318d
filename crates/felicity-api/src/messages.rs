use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, SubsecRound, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use felicity_db::models::MessageRow;
use felicity_db::{DeleteOutcome, PinOutcome, ReplyOutcome, timestamp};
use felicity_types::api::{Claims, PinResponse, PostMessageRequest};
use felicity_types::events::GatewayEvent;
use felicity_types::models::{Message, MessageNode, Role};
use felicity_types::thread;
use felicity_types::vote::VoteValue;

use crate::access;
use crate::error::ApiError;
use crate::middleware::BearerToken;
use crate::notifications;
use crate::state::{AppState, blocking};

pub const MAX_CONTENT_CHARS: usize = 2000;

/// GET /api/forum/{event_id}/messages
pub async fn list_messages(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Extension(BearerToken(token)): Extension<BearerToken>,
) -> Result<Json<Vec<MessageNode>>, ApiError> {
    access::resolve(&state, &claims, &token, event_id).await?.require_view()?;

    let eid = event_id.to_string();
    let uid = claims.sub.to_string();
    let (rows, vote_rows) = blocking(&state, move |db| {
        let rows = db.list_messages(&eid)?;
        let votes = db.votes_for_user(&eid, &uid)?;
        Ok((rows, votes))
    })
    .await?;

    let my_votes: HashMap<Uuid, VoteValue> = vote_rows
        .into_iter()
        .filter_map(|v| {
            let id = v.message_id.parse().ok()?;
            let value = VoteValue::try_from(v.value).ok()?;
            Some((id, value))
        })
        .collect();

    let messages = rows.into_iter().map(message_from_row).collect();
    Ok(Json(thread::build(messages, &my_votes)))
}

/// POST /api/forum/{event_id}/messages
pub async fn post_message(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Extension(BearerToken(token)): Extension<BearerToken>,
    Json(req): Json<PostMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let standing = access::resolve(&state, &claims, &token, event_id).await?;
    standing.require_post()?;

    if req.is_announcement {
        standing.require_moderate()?;
        if req.parent_id.is_some() {
            return Err(ApiError::bad_request("announcements cannot be replies"));
        }
    }

    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::bad_request("message content is empty"));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(ApiError::bad_request(format!(
            "message content exceeds {} characters",
            MAX_CONTENT_CHARS
        )));
    }

    let now = Utc::now().trunc_subsecs(6);
    let message = Message {
        id: Uuid::new_v4(),
        event_id,
        author_id: claims.sub,
        author_name: claims.name.clone(),
        author_role: claims.role,
        parent_id: req.parent_id,
        content: Some(content),
        is_pinned: false,
        is_announcement: req.is_announcement,
        is_deleted: false,
        score: 0,
        created_at: now,
    };

    let row = row_from_message(&message);
    let parent_author = if message.parent_id.is_some() {
        let outcome = blocking(&state, move |db| db.insert_reply(&row, thread::MAX_DEPTH)).await?;
        match outcome {
            ReplyOutcome::Inserted { parent_author_id } => {
                Some(parse_uuid(&parent_author_id, "author_id", &parent_author_id))
            }
            ReplyOutcome::ParentMissing => {
                return Err(ApiError::bad_request("parent message does not belong to this event"));
            }
            ReplyOutcome::ParentDeleted => return Err(ApiError::bad_request("cannot reply to a deleted message")),
            ReplyOutcome::TooDeep => {
                return Err(ApiError::bad_request(format!(
                    "replies cannot nest deeper than {} levels",
                    thread::MAX_DEPTH
                )));
            }
        }
    } else {
        blocking(&state, move |db| db.insert_message(&row)).await?;
        None
    };

    info!(
        "{} ({}) posted {} in forum {}",
        claims.name, claims.sub, message.id, event_id
    );

    state.dispatcher.publish(&GatewayEvent::NewMessage {
        event_id,
        message: message.clone(),
    });

    if let Some(parent_author) = parent_author.filter(|author| *author != claims.sub) {
        notifications::notify(
            &state,
            parent_author,
            notifications::KIND_FORUM_REPLY,
            format!("New reply in {}", standing.event.name),
            format!("{} replied to your message", claims.name),
            Some(event_id),
        )
        .await;
    }

    if message.is_announcement {
        notifications::announce(&state, &claims, &standing.event).await;
    }

    Ok((StatusCode::CREATED, Json(message)))
}

/// DELETE /api/forum/{event_id}/messages/{message_id}
pub async fn delete_message(
    State(state): State<AppState>,
    Path((event_id, message_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
    Extension(BearerToken(token)): Extension<BearerToken>,
) -> Result<StatusCode, ApiError> {
    let standing = access::resolve(&state, &claims, &token, event_id).await?;
    standing.require_view()?;

    let message = message_in_event(&state, event_id, message_id).await?;
    let is_author = message.author_id == claims.sub.to_string();
    if !is_author && !standing.access.can_moderate {
        return Err(ApiError::Forbidden("only the author or a moderator can delete this message"));
    }

    let mid = message_id.to_string();
    let outcome = blocking(&state, move |db| db.soft_delete_message(&mid)).await?;

    match outcome {
        DeleteOutcome::Deleted => {
            info!("{} ({}) deleted {} in forum {}", claims.name, claims.sub, message_id, event_id);
            state.dispatcher.publish(&GatewayEvent::MessageDeleted {
                event_id,
                message_id,
            });
            Ok(StatusCode::NO_CONTENT)
        }
        DeleteOutcome::AlreadyDeleted => Ok(StatusCode::NO_CONTENT),
        DeleteOutcome::NotFound => Err(ApiError::NotFound("message")),
    }
}

/// POST /api/forum/{event_id}/messages/{message_id}/pin
pub async fn pin_message(
    State(state): State<AppState>,
    Path((event_id, message_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
    Extension(BearerToken(token)): Extension<BearerToken>,
) -> Result<Json<PinResponse>, ApiError> {
    access::resolve(&state, &claims, &token, event_id)
        .await?
        .require_moderate()?;

    message_in_event(&state, event_id, message_id).await?;

    let mid = message_id.to_string();
    let pinned = match blocking(&state, move |db| db.toggle_pin(&mid)).await? {
        PinOutcome::Pinned(pinned) => pinned,
        PinOutcome::Deleted => return Err(ApiError::bad_request("cannot pin a deleted message")),
        PinOutcome::NotFound => return Err(ApiError::NotFound("message")),
    };

    state.dispatcher.publish(&GatewayEvent::MessagePinned {
        event_id,
        message_id,
        pinned,
    });

    Ok(Json(PinResponse { message_id, pinned }))
}

/// Load a message and make sure it belongs to the event in the path.
pub(crate) async fn message_in_event(
    state: &AppState,
    event_id: Uuid,
    message_id: Uuid,
) -> Result<MessageRow, ApiError> {
    let mid = message_id.to_string();
    blocking(state, move |db| db.get_message(&mid))
        .await?
        .filter(|m| m.event_id == event_id.to_string())
        .ok_or(ApiError::NotFound("message"))
}

pub(crate) fn message_from_row(row: MessageRow) -> Message {
    let author_role = row.author_role.parse().unwrap_or_else(|e| {
        warn!("Corrupt author_role on message '{}': {}", row.id, e);
        Role::Participant
    });

    Message {
        id: parse_uuid(&row.id, "id", &row.id),
        event_id: parse_uuid(&row.event_id, "event_id", &row.id),
        author_id: parse_uuid(&row.author_id, "author_id", &row.id),
        author_name: row.author_name,
        author_role,
        parent_id: row.parent_id.as_deref().map(|p| parse_uuid(p, "parent_id", &row.id)),
        content: if row.is_deleted { None } else { Some(row.content) },
        is_pinned: row.is_pinned,
        is_announcement: row.is_announcement,
        is_deleted: row.is_deleted,
        score: row.score,
        created_at: parse_timestamp(&row.created_at, &row.id),
    }
}

fn row_from_message(message: &Message) -> MessageRow {
    MessageRow {
        id: message.id.to_string(),
        event_id: message.event_id.to_string(),
        author_id: message.author_id.to_string(),
        author_name: message.author_name.clone(),
        author_role: message.author_role.as_str().to_string(),
        parent_id: message.parent_id.map(|p| p.to_string()),
        content: message.content.clone().unwrap_or_default(),
        is_pinned: message.is_pinned,
        is_announcement: message.is_announcement,
        is_deleted: message.is_deleted,
        score: message.score,
        created_at: timestamp(message.created_at),
    }
}

pub(crate) fn parse_uuid(raw: &str, field: &str, row_id: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}' on row '{}': {}", field, raw, row_id, e);
        Uuid::default()
    })
}

pub(crate) fn parse_timestamp(raw: &str, row_id: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>().unwrap_or_else(|e| {
        warn!("Corrupt created_at '{}' on row '{}': {}", raw, row_id, e);
        DateTime::default()
    })
}
