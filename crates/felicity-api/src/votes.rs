use axum::{
    Extension, Json,
    extract::{Path, State},
};
use tracing::debug;
use uuid::Uuid;

use felicity_db::VoteOutcome;
use felicity_types::api::{Claims, VoteRequest, VoteResponse};
use felicity_types::events::GatewayEvent;

use crate::access;
use crate::error::ApiError;
use crate::messages::message_in_event;
use crate::middleware::BearerToken;
use crate::state::{AppState, blocking};

/// POST /api/forum/{event_id}/messages/{message_id}/vote
///
/// Re-sending the value already held clears the vote.
pub async fn vote(
    State(state): State<AppState>,
    Path((event_id, message_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
    Extension(BearerToken(token)): Extension<BearerToken>,
    Json(req): Json<VoteRequest>,
) -> Result<Json<VoteResponse>, ApiError> {
    access::resolve(&state, &claims, &token, event_id)
        .await?
        .require_post()?;

    message_in_event(&state, event_id, message_id).await?;

    let mid = message_id.to_string();
    let uid = claims.sub.to_string();
    let outcome = blocking(&state, move |db| db.cast_vote(&mid, &uid, req.value)).await?;

    let (score, my_vote) = match outcome {
        VoteOutcome::Recorded { score, value } => (score, value),
        VoteOutcome::Deleted => return Err(ApiError::bad_request("cannot vote on a deleted message")),
        VoteOutcome::NotFound => return Err(ApiError::NotFound("message")),
    };

    debug!("{} voted {:?} on {} (score {})", claims.sub, my_vote, message_id, score);

    state.dispatcher.publish(&GatewayEvent::MessageVoted {
        event_id,
        message_id,
        score,
    });

    Ok(Json(VoteResponse {
        message_id,
        score,
        my_vote,
    }))
}
