//! Event gateway: one WebSocket per signed-in client.
//!
//! Each socket gets a bounded outbound queue; anything pushed to the user
//! (messages, notifications, rosters, relayed call signals) goes through it,
//! so events for one socket leave in the order they were queued. Inbound
//! frames are decoded into [`ClientEvent`]s and handed to the signaling
//! relay.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use parley_shared::protocol::{ClientEvent, ServerEvent};
use parley_shared::types::{ConnectionId, UserId};
use serde::Deserialize;
use tokio::sync::{broadcast::error::RecvError, mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::AppState;
use crate::error::ServerError;
use crate::presence::PresenceRegistry;

#[derive(Clone)]
pub struct Gateway {
    presence: PresenceRegistry,
    connections: Arc<RwLock<HashMap<ConnectionId, mpsc::Sender<ServerEvent>>>>,
    queue_capacity: usize,
}

/// The receiving side of one registered connection.
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub events: mpsc::Receiver<ServerEvent>,
}

impl Gateway {
    pub fn new(presence: PresenceRegistry, queue_capacity: usize) -> Self {
        Self {
            presence,
            connections: Arc::new(RwLock::new(HashMap::new())),
            queue_capacity: queue_capacity.max(1),
        }
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    /// Open a connection for `user_id` and register it as the user's
    /// current socket.
    pub async fn connect(&self, user_id: UserId) -> ConnectionHandle {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.queue_capacity);

        // Queue first, so the roster announced by `register` reaches it.
        self.connections.write().await.insert(id, tx);
        if let Some(replaced) = self.presence.register(user_id, id).await {
            debug!(user = %user_id, replaced = %replaced, "Newer connection took over user");
        }

        info!(user = %user_id, connection = %id, "Client connected");
        ConnectionHandle { id, events: rx }
    }

    pub async fn disconnect(&self, user_id: UserId, connection: ConnectionId) {
        self.connections.write().await.remove(&connection);
        self.presence.release(&user_id, connection).await;
        info!(user = %user_id, connection = %connection, "Client disconnected");
    }

    /// Push `event` to the user's registered socket. `false` means the user
    /// is offline or the socket is not keeping up; callers treat it as a
    /// skipped notification, not a failure.
    pub async fn send_to_user(&self, user_id: UserId, event: ServerEvent) -> bool {
        let Some(connection) = self.presence.lookup(&user_id).await else {
            debug!(user = %user_id, event = event.name(), "Recipient offline, push skipped");
            return false;
        };
        self.send_to_connection(connection, event).await
    }

    pub async fn send_to_connection(&self, connection: ConnectionId, event: ServerEvent) -> bool {
        let connections = self.connections.read().await;
        let Some(tx) = connections.get(&connection) else {
            return false;
        };

        let name = event.name();
        match tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(connection = %connection, event = name, "Dropping event for slow connection");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Push `event` to every open socket. Returns how many accepted it.
    pub async fn broadcast(&self, event: ServerEvent) -> usize {
        let connections = self.connections.read().await;
        let mut delivered = 0;
        for (connection, tx) in connections.iter() {
            if tx.try_send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                debug!(connection = %connection, event = event.name(), "Broadcast skipped connection");
            }
        }
        delivered
    }

    /// Forward every roster change to all sockets as `getOnlineUsers`.
    pub fn spawn_roster_fanout(&self) -> JoinHandle<()> {
        let gateway = self.clone();
        let mut rosters = self.presence.subscribe();
        tokio::spawn(async move {
            loop {
                let roster = match rosters.recv().await {
                    Ok(roster) => roster,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Roster fanout lagged, sending current roster");
                        gateway.presence.roster().await
                    }
                    Err(RecvError::Closed) => break,
                };
                gateway.broadcast(ServerEvent::OnlineUsers(roster)).await;
            }
        })
    }
}

// ---------------------------------------------------------------------------
// WebSocket transport
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocketQuery {
    user_id: Option<String>,
}

/// `GET /socket?userId=<uuid>`
pub async fn socket_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<SocketQuery>,
    State(state): State<AppState>,
) -> Result<Response, ServerError> {
    let raw = query
        .user_id
        .ok_or_else(|| ServerError::BadRequest("Missing userId query parameter".into()))?;
    let user_id: UserId = raw
        .parse()
        .map_err(|_| ServerError::BadRequest(format!("Invalid userId: {raw}")))?;

    let known = state
        .storage
        .run("user_exists", move |db| db.user_exists(user_id))
        .await?;
    if !known {
        return Err(ServerError::Unauthorized(format!("Unknown user {user_id}")));
    }

    Ok(ws.on_upgrade(move |socket| run_connection(socket, user_id, state)))
}

async fn run_connection(socket: WebSocket, user_id: UserId, state: AppState) {
    let ConnectionHandle {
        id: connection,
        mut events,
    } = state.gateway.connect(user_id).await;
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(WsMessage::Text(text))) => {
                        dispatch_inbound(&state, user_id, &text).await;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(user = %user_id, error = %e, "Socket read failed");
                        break;
                    }
                }
            }
            outbound = events.recv() => {
                let Some(event) = outbound else { break };
                let frame = match event.to_frame() {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(event = event.name(), error = %e, "Failed to encode event");
                        continue;
                    }
                };
                if sink.send(WsMessage::Text(frame)).await.is_err() {
                    debug!(user = %user_id, "Socket write failed");
                    break;
                }
            }
        }
    }

    state.gateway.disconnect(user_id, connection).await;
}

async fn dispatch_inbound(state: &AppState, user_id: UserId, text: &str) {
    match ClientEvent::from_frame(text) {
        Ok(event) => {
            let name = event.name();
            let outcome = state.relay.relay(user_id, event).await;
            debug!(user = %user_id, event = name, ?outcome, "Inbound event handled");
        }
        Err(e) => {
            debug!(user = %user_id, error = %e, "Ignoring unrecognised frame");
        }
    }
}
