use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{delete, get, patch, post},
};

use felicity_gateway::RoomAuthorizer;
use felicity_gateway::connection;

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{access, messages, notifications, votes};

/// All forum routes. Transport layers (CORS, tracing) are added by the server.
pub fn router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/api/forum/{event_id}/access", get(access::check_access))
        .route(
            "/api/forum/{event_id}/messages",
            get(messages::list_messages).post(messages::post_message),
        )
        .route(
            "/api/forum/{event_id}/messages/{message_id}",
            delete(messages::delete_message),
        )
        .route(
            "/api/forum/{event_id}/messages/{message_id}/pin",
            post(messages::pin_message),
        )
        .route(
            "/api/forum/{event_id}/messages/{message_id}/vote",
            post(votes::vote),
        )
        .route("/api/notifications", get(notifications::list_notifications))
        .route("/api/notifications/read-all", patch(notifications::mark_all_read))
        .route(
            "/api/notifications/{notification_id}/read",
            patch(notifications::mark_read),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    // Browsers cannot set headers on a WebSocket upgrade; the gateway
    // authenticates with an Identify frame instead.
    let ws_route = Router::new()
        .route("/api/forum/ws", get(ws_upgrade))
        .with_state(state);

    Router::new()
        .route("/health", get(health))
        .merge(protected_routes)
        .merge(ws_route)
}

async fn health() -> &'static str {
    "ok"
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        let dispatcher = state.dispatcher.clone();
        let jwt_secret = state.jwt_secret.clone();
        let authorizer: Arc<dyn RoomAuthorizer> = state;
        connection::handle_connection(socket, dispatcher, jwt_secret, authorizer)
    })
}
