use axum::{
    Extension, Json,
    extract::{Path, State},
};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tracing::warn;
use uuid::Uuid;

use felicity_gateway::RoomAuthorizer;
use felicity_types::api::Claims;
use felicity_types::models::{EventInfo, ForumAccess, Role};

use crate::error::ApiError;
use crate::middleware::BearerToken;
use crate::state::{AppState, AppStateInner};

/// A caller's standing in one event's forum.
#[derive(Debug, Clone)]
pub struct EventAccess {
    pub event: EventInfo,
    pub access: ForumAccess,
}

impl EventAccess {
    pub fn require_view(&self) -> Result<(), ApiError> {
        if self.access.can_view {
            Ok(())
        } else {
            Err(ApiError::Forbidden("you do not have access to this forum"))
        }
    }

    pub fn require_post(&self) -> Result<(), ApiError> {
        self.require_view()?;
        if self.access.can_post {
            Ok(())
        } else {
            Err(ApiError::Forbidden("you cannot post in this forum"))
        }
    }

    pub fn require_moderate(&self) -> Result<(), ApiError> {
        self.require_view()?;
        if self.access.can_moderate {
            Ok(())
        } else {
            Err(ApiError::Forbidden("only the organizer can moderate this forum"))
        }
    }
}

/// Look the event up in the core API and work out what the caller may do.
pub async fn resolve(
    state: &AppStateInner,
    claims: &Claims,
    token: &str,
    event_id: Uuid,
) -> Result<EventAccess, ApiError> {
    let event = state
        .directory
        .event(event_id, token)
        .await?
        .ok_or(ApiError::NotFound("event"))?;

    // Only participants gain access through registration
    let registered = match claims.role {
        Role::Participant => state.directory.is_registered(event_id, claims.sub, token).await?,
        Role::Organizer | Role::Admin => false,
    };

    let access = ForumAccess::resolve(claims.sub, claims.role, &event, registered);
    Ok(EventAccess { event, access })
}

/// GET /api/forum/{event_id}/access
pub async fn check_access(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Extension(BearerToken(token)): Extension<BearerToken>,
) -> Result<Json<ForumAccess>, ApiError> {
    let standing = resolve(&state, &claims, &token, event_id).await?;
    Ok(Json(standing.access))
}

impl RoomAuthorizer for AppStateInner {
    fn can_join<'a>(&'a self, claims: &'a Claims, token: &'a str, event_id: Uuid) -> BoxFuture<'a, bool> {
        async move {
            match resolve(self, claims, token, event_id).await {
                Ok(standing) => standing.access.can_view,
                Err(e) => {
                    warn!("Room access check for {} on {} failed: {}", claims.sub, event_id, e);
                    false
                }
            }
        }
        .boxed()
    }
}
