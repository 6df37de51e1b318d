use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::{debug, info, warn};
use uuid::Uuid;

use felicity_types::api::Claims;
use felicity_types::events::{GatewayCommand, GatewayEvent};

use crate::RoomAuthorizer;
use crate::dispatcher::{Dispatcher, RoomMessage};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

type Rooms = Arc<RwLock<HashSet<Uuid>>>;

/// Handle a single WebSocket connection: Identify handshake, then the event loop.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    jwt_secret: String,
    authorizer: Arc<dyn RoomAuthorizer>,
) {
    let (mut sender, mut receiver) = socket.split();

    let Some((claims, token)) = handshake(&mut receiver, &mut sender, &jwt_secret, IDENTIFY_TIMEOUT).await else {
        return;
    };

    run_connection_loop(sender, receiver, dispatcher, claims, token, authorizer).await;
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    dispatcher: Dispatcher,
    claims: Claims,
    token: String,
    authorizer: Arc<dyn RoomAuthorizer>,
) {
    let (conn_id, mut conn_rx) = dispatcher.register_connection(claims.sub).await;
    let mut broadcast_rx = dispatcher.subscribe();

    // Event rooms this connection joined (shared between send and recv tasks).
    let rooms: Rooms = Arc::new(RwLock::new(HashSet::new()));
    let send_rooms = rooms.clone();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward room broadcasts + targeted events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let msg = match result {
                        Ok(msg) => msg,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            // Clients refetch on structural events, so skipped ones are recoverable
                            warn!("Broadcast receiver lagged by {} messages", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    let Some(frame) = room_frame(&send_rooms, &msg) else {
                        continue;
                    };

                    if sender.send(frame).await.is_err() {
                        break;
                    }
                }
                result = conn_rx.recv() => {
                    let Some(event) = result else { break };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let recv_dispatcher = dispatcher.clone();
    let recv_claims = claims.clone();
    let recv_rooms = rooms.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(
                            &recv_dispatcher,
                            conn_id,
                            &recv_claims,
                            &token,
                            cmd,
                            &recv_rooms,
                            authorizer.as_ref(),
                        )
                        .await;
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            recv_claims.name,
                            recv_claims.sub,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.unregister_connection(conn_id).await;
    info!("{} ({}) disconnected from gateway", claims.name, claims.sub);
}

/// Identify the client and answer with `ready`. On failure the client is
/// sent a Close frame and `None` is returned.
async fn handshake<R, W>(
    receiver: &mut R,
    sender: &mut W,
    jwt_secret: &str,
    limit: Duration,
) -> Option<(Claims, String)>
where
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
    W: Sink<Message> + Unpin,
{
    let Some((claims, token)) = wait_for_identify(receiver, jwt_secret, limit).await else {
        warn!("WebSocket client failed to identify, closing");
        let _ = sender.send(Message::Close(None)).await;
        return None;
    };

    info!("{} ({}) connected to gateway", claims.name, claims.sub);

    let ready = GatewayEvent::Ready {
        user_id: claims.sub,
        name: claims.name.clone(),
    };
    send_event(sender, &ready).await.ok()?;

    Some((claims, token))
}

/// The first text frame must be a valid Identify. Control frames before it
/// are skipped.
async fn wait_for_identify<R>(receiver: &mut R, jwt_secret: &str, limit: Duration) -> Option<(Claims, String)>
where
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let identify = async {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    let Ok(GatewayCommand::Identify { token }) = serde_json::from_str::<GatewayCommand>(&text) else {
                        debug!("First frame was not Identify");
                        return None;
                    };

                    let token_data = decode::<Claims>(
                        &token,
                        &DecodingKey::from_secret(jwt_secret.as_bytes()),
                        &Validation::default(),
                    )
                    .ok()?;

                    return Some((token_data.claims, token));
                }
                Message::Close(_) => return None,
                _ => {}
            }
        }
        None
    };

    tokio::time::timeout(limit, identify).await.ok().flatten()
}

async fn handle_command(
    dispatcher: &Dispatcher,
    conn_id: Uuid,
    claims: &Claims,
    token: &str,
    cmd: GatewayCommand,
    rooms: &Rooms,
    authorizer: &dyn RoomAuthorizer,
) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // Already handled

        GatewayCommand::JoinEvent { event_id } => {
            if !authorizer.can_join(claims, token, event_id).await {
                info!("{} ({}) denied forum room {}", claims.name, claims.sub, event_id);
                dispatcher
                    .send_to_connection(conn_id, GatewayEvent::JoinDenied { event_id })
                    .await;
                return;
            }

            rooms.write().unwrap_or_else(|e| e.into_inner()).insert(event_id);
            debug!("{} ({}) joined forum room {}", claims.name, claims.sub, event_id);
            dispatcher
                .send_to_connection(conn_id, GatewayEvent::Joined { event_id })
                .await;
        }

        GatewayCommand::LeaveEvent { event_id } => {
            rooms.write().unwrap_or_else(|e| e.into_inner()).remove(&event_id);
            debug!("{} ({}) left forum room {}", claims.name, claims.sub, event_id);
        }
    }
}

fn is_member(rooms: &Rooms, event_id: Uuid) -> bool {
    rooms.read().unwrap_or_else(|e| e.into_inner()).contains(&event_id)
}

/// The frame to forward for a room message, if this connection joined the room.
fn room_frame(rooms: &Rooms, msg: &RoomMessage) -> Option<Message> {
    is_member(rooms, msg.event_id).then(|| Message::Text(msg.json.to_string().into()))
}

async fn send_event<W>(sender: &mut W, event: &GatewayEvent) -> Result<(), ()>
where
    W: Sink<Message> + Unpin,
{
    let text = serde_json::to_string(event).map_err(|e| warn!("Failed to serialize event: {}", e))?;
    sender.send(Message::Text(text.into())).await.map_err(|_| ())
}
