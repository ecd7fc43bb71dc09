//! Rockboard Signaling Relay
//!
//! Relays annotation signals between the participants of a live session.
//!
//! ## Protocol
//!
//! Messages are JSON with the following format:
//! ```json
//! { "type": "join", "session": "session-id" }
//! { "type": "signal", "signal": { "type": "drawingSignal", "data": "...", "to": [] } }
//! { "type": "signal", "signal": { "type": "reset", "to": [] } }
//! { "type": "leave" }
//! ```
//!
//! A signal with an empty `to` reaches every participant, the sender included.
//! Otherwise it reaches only the listed connection ids.

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use rockboard_core::relay::{ClientMessage, ServerMessage};
use std::{collections::HashSet, sync::Arc};
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Per-session broadcast buffer.
pub const CHANNEL_CAPACITY: usize = 256;

/// A server message routed within one session.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Connection that caused the message.
    pub from: String,
    /// Recipients; empty means every participant.
    pub to: Vec<String>,
    /// Whether the originating connection receives it too.
    pub echo: bool,
    pub message: ServerMessage,
}

impl Envelope {
    /// Presence notice for everyone but `from`.
    pub fn presence(from: &str, message: ServerMessage) -> Self {
        Self {
            from: from.to_string(),
            to: Vec::new(),
            echo: false,
            message,
        }
    }

    /// Whether `connection_id` should receive this envelope.
    pub fn is_for(&self, connection_id: &str) -> bool {
        if self.from == connection_id && !self.echo {
            return false;
        }
        self.to.is_empty() || self.to.iter().any(|id| id == connection_id)
    }
}

/// Session state
struct Session {
    /// Broadcast channel for this session
    tx: broadcast::Sender<Envelope>,
    /// Connected participant IDs
    participants: HashSet<String>,
}

impl Session {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            participants: HashSet::new(),
        }
    }
}

/// Shared application state
#[derive(Default)]
pub struct AppState {
    /// Active sessions
    sessions: DashMap<String, Session>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a participant to a session, creating it if needed.
    /// Returns the session's receiver and its participant count.
    pub fn join_session(
        &self,
        session_id: &str,
        connection_id: &str,
    ) -> (broadcast::Receiver<Envelope>, usize) {
        let mut session = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(Session::new);
        session.participants.insert(connection_id.to_string());
        (session.tx.subscribe(), session.participants.len())
    }

    /// Remove a participant; empty sessions are dropped.
    ///
    /// The emptiness check and the removal happen under one shard lock, so a
    /// concurrent join either keeps the session alive or creates a new one.
    pub fn leave_session(&self, session_id: &str, connection_id: &str) {
        if let Some(mut session) = self.sessions.get_mut(session_id) {
            session.participants.remove(connection_id);
        }
        if self
            .sessions
            .remove_if(session_id, |_, session| session.participants.is_empty())
            .is_some()
        {
            debug!("Session {} closed", session_id);
        }
    }

    /// Number of participants in a session.
    pub fn participant_count(&self, session_id: &str) -> usize {
        self.sessions
            .get(session_id)
            .map(|session| session.participants.len())
            .unwrap_or(0)
    }

    /// Number of active sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Route an envelope to a session's participants.
    pub fn broadcast(&self, session_id: &str, envelope: Envelope) {
        if let Some(session) = self.sessions.get(session_id) {
            let _ = session.tx.send(envelope);
        }
    }
}

/// Build the relay router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Index page
async fn index() -> &'static str {
    "Rockboard Signaling Relay - Connect via WebSocket at /ws"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn text(message: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            warn!("Failed to serialize server message: {}", e);
            None
        }
    }
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id = Uuid::new_v4().to_string();
    info!("New connection: {}", connection_id);

    let (mut sender, mut receiver) = socket.split();
    let mut current_session: Option<String> = None;
    let mut session_rx: Option<broadcast::Receiver<Envelope>> = None;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(body))) => {
                        let reply = match serde_json::from_str::<ClientMessage>(&body) {
                            Ok(ClientMessage::Join { session }) => {
                                if let Some(ref old) = current_session {
                                    state.leave_session(old, &connection_id);
                                    state.broadcast(old, Envelope::presence(&connection_id, ServerMessage::ParticipantLeft {
                                        connection_id: connection_id.clone(),
                                    }));
                                }

                                let (rx, participant_count) = state.join_session(&session, &connection_id);
                                session_rx = Some(rx);
                                current_session = Some(session.clone());

                                state.broadcast(&session, Envelope::presence(&connection_id, ServerMessage::ParticipantJoined {
                                    connection_id: connection_id.clone(),
                                }));
                                info!("Connection {} joined session {}", connection_id, session);

                                Some(ServerMessage::Joined {
                                    session,
                                    connection_id: connection_id.clone(),
                                    participant_count,
                                })
                            }
                            Ok(ClientMessage::Leave) => {
                                if let Some(ref session) = current_session {
                                    state.leave_session(session, &connection_id);
                                    state.broadcast(session, Envelope::presence(&connection_id, ServerMessage::ParticipantLeft {
                                        connection_id: connection_id.clone(),
                                    }));
                                    info!("Connection {} left session {}", connection_id, session);
                                }
                                current_session = None;
                                session_rx = None;
                                None
                            }
                            Ok(ClientMessage::Signal { signal }) => match current_session {
                                Some(ref session) => {
                                    debug!("Signal {} from {} in {}", signal.tag, connection_id, session);
                                    state.broadcast(session, Envelope {
                                        from: connection_id.clone(),
                                        to: signal.to.clone(),
                                        echo: true,
                                        message: ServerMessage::Signal {
                                            from: connection_id.clone(),
                                            signal,
                                        },
                                    });
                                    None
                                }
                                None => Some(ServerMessage::Error {
                                    message: "Join a session before signaling".to_string(),
                                }),
                            },
                            Err(e) => {
                                warn!("Invalid message from {}: {}", connection_id, e);
                                Some(ServerMessage::Error {
                                    message: format!("Invalid message: {}", e),
                                })
                            }
                        };

                        if let Some(out) = reply.as_ref().and_then(text) {
                            if sender.send(out).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Ok(_)) => {} // Ignore binary, ping/pong
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", connection_id, e);
                        break;
                    }
                }
            }

            envelope = async {
                match &mut session_rx {
                    Some(rx) => loop {
                        match rx.recv().await {
                            Ok(envelope) => break Some(envelope),
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                warn!("Connection {} lagged, {} signals lost", connection_id, skipped);
                            }
                            Err(broadcast::error::RecvError::Closed) => break None,
                        }
                    },
                    None => std::future::pending::<Option<Envelope>>().await,
                }
            } => {
                match envelope {
                    Some(envelope) if envelope.is_for(&connection_id) => {
                        if let Some(out) = text(&envelope.message) {
                            if sender.send(out).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(_) => {}
                    None => session_rx = None,
                }
            }
        }
    }

    // Cleanup on disconnect
    if let Some(ref session) = current_session {
        state.leave_session(session, &connection_id);
        state.broadcast(
            session,
            Envelope::presence(
                &connection_id,
                ServerMessage::ParticipantLeft {
                    connection_id: connection_id.clone(),
                },
            ),
        );
    }
    info!("Connection closed: {}", connection_id);
}
