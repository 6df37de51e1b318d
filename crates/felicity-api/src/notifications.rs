use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{SubsecRound, Utc};
use serde::Deserialize;
use tracing::{debug, error, info};
use uuid::Uuid;

use felicity_db::models::NotificationRow;
use felicity_db::timestamp;
use felicity_types::api::{Claims, MarkAllReadResponse, NotificationList};
use felicity_types::events::GatewayEvent;
use felicity_types::models::{EventInfo, Notification};

use crate::error::ApiError;
use crate::messages::{parse_timestamp, parse_uuid};
use crate::state::{AppState, blocking};

pub const KIND_FORUM_REPLY: &str = "forum_reply";
pub const KIND_FORUM_ANNOUNCEMENT: &str = "forum_announcement";

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

/// Store a notification and push it to the user's open connections.
/// Failures are logged; they never fail the action that caused them.
pub async fn notify(
    state: &AppState,
    user_id: Uuid,
    kind: &str,
    title: String,
    message: String,
    event_id: Option<Uuid>,
) {
    let notification = Notification {
        id: Uuid::new_v4(),
        user_id,
        kind: kind.to_string(),
        title,
        message,
        event_id,
        read: false,
        created_at: Utc::now().trunc_subsecs(6),
    };

    let row = NotificationRow {
        id: notification.id.to_string(),
        user_id: user_id.to_string(),
        kind: notification.kind.clone(),
        title: notification.title.clone(),
        message: notification.message.clone(),
        event_id: event_id.map(|e| e.to_string()),
        read: false,
        created_at: timestamp(notification.created_at),
    };

    if let Err(e) = blocking(state, move |db| db.insert_notification(&row)).await {
        error!("Failed to store notification for {}: {}", user_id, e);
        return;
    }

    let delivered = state
        .dispatcher
        .send_to_user(user_id, GatewayEvent::Notification { notification })
        .await;
    debug!("Notification for {} pushed to {} connections", user_id, delivered);
}

/// Tell everyone else who has posted in the event's forum about a new
/// announcement.
pub async fn announce(state: &AppState, author: &Claims, event: &EventInfo) {
    let eid = event.id.to_string();
    let authors = match blocking(state, move |db| db.forum_authors(&eid)).await {
        Ok(authors) => authors,
        Err(e) => {
            error!("Failed to load forum members of {}: {}", event.id, e);
            return;
        }
    };

    let recipients: Vec<Uuid> = authors
        .iter()
        .filter_map(|raw| raw.parse().ok())
        .filter(|user_id| *user_id != author.sub)
        .collect();

    for user_id in &recipients {
        notify(
            state,
            *user_id,
            KIND_FORUM_ANNOUNCEMENT,
            format!("Announcement in {}", event.name),
            format!("{} posted an announcement", author.name),
            Some(event.id),
        )
        .await;
    }
    info!("Announcement in {} sent to {} forum members", event.id, recipients.len());
}

/// GET /api/notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    Query(query): Query<NotificationQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<NotificationList>, ApiError> {
    let uid = claims.sub.to_string();
    let limit = query.limit.clamp(1, 200);

    let (rows, unread) = blocking(&state, move |db| {
        let rows = db.list_notifications(&uid, limit)?;
        let unread = db.unread_notification_count(&uid)?;
        Ok((rows, unread))
    })
    .await?;

    let notifications = rows.into_iter().map(notification_from_row).collect();
    Ok(Json(NotificationList {
        unread,
        notifications,
    }))
}

/// PATCH /api/notifications/{notification_id}/read
pub async fn mark_read(
    State(state): State<AppState>,
    Path(notification_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    let nid = notification_id.to_string();
    let uid = claims.sub.to_string();
    if blocking(&state, move |db| db.mark_notification_read(&nid, &uid)).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("notification"))
    }
}

/// PATCH /api/notifications/read-all
pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<MarkAllReadResponse>, ApiError> {
    let uid = claims.sub.to_string();
    let updated = blocking(&state, move |db| db.mark_all_notifications_read(&uid)).await?;
    Ok(Json(MarkAllReadResponse { updated }))
}

fn notification_from_row(row: NotificationRow) -> Notification {
    Notification {
        id: parse_uuid(&row.id, "id", &row.id),
        user_id: parse_uuid(&row.user_id, "user_id", &row.id),
        event_id: row.event_id.as_deref().map(|e| parse_uuid(e, "event_id", &row.id)),
        created_at: parse_timestamp(&row.created_at, &row.id),
        kind: row.kind,
        title: row.title,
        message: row.message,
        read: row.read,
    }
}
