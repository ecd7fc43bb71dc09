//! Relay protocol and native WebSocket client.
//!
//! A relay server plays the role of the live session's signaling channel:
//! clients join a session and every `signal` they send is fanned out to the
//! session's participants (the sender included) or to the listed `to` ids.

use crate::channel::InboundSignal;
use crate::codec::WireMessage;
use serde::{Deserialize, Serialize};

/// Messages sent to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a session
    Join { session: String },
    /// Leave current session
    Leave,
    /// Fan out a signal to the session
    Signal { signal: WireMessage },
}

/// Messages received from the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirm session join
    Joined {
        session: String,
        connection_id: String,
        participant_count: usize,
    },
    /// Another participant joined
    ParticipantJoined { connection_id: String },
    /// Another participant left
    ParticipantLeft { connection_id: String },
    /// Signal from a participant (possibly ourselves)
    Signal { from: String, signal: WireMessage },
    /// Error message
    Error { message: String },
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Events from the relay client
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    /// Connected to relay
    Connected,
    /// Disconnected from relay
    Disconnected,
    /// Joined a session
    Joined {
        session: String,
        connection_id: String,
        participant_count: usize,
    },
    /// A participant joined the session
    ParticipantJoined { connection_id: String },
    /// A participant left the session
    ParticipantLeft { connection_id: String },
    /// A signal was delivered
    Signal(InboundSignal),
    /// Error occurred
    Error { message: String },
}

impl From<ServerMessage> for RelayEvent {
    fn from(msg: ServerMessage) -> Self {
        match msg {
            ServerMessage::Joined {
                session,
                connection_id,
                participant_count,
            } => RelayEvent::Joined {
                session,
                connection_id,
                participant_count,
            },
            ServerMessage::ParticipantJoined { connection_id } => {
                RelayEvent::ParticipantJoined { connection_id }
            }
            ServerMessage::ParticipantLeft { connection_id } => {
                RelayEvent::ParticipantLeft { connection_id }
            }
            ServerMessage::Signal { from, signal } => RelayEvent::Signal(InboundSignal {
                from: Some(from),
                message: signal,
            }),
            ServerMessage::Error { message } => RelayEvent::Error { message },
        }
    }
}

// ============================================================================
// Native WebSocket Client
// ============================================================================

#[cfg(not(target_arch = "wasm32"))]
mod native_client {
    use super::*;
    use crate::channel::{ChannelError, SignalingChannel};
    use std::collections::VecDeque;
    use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;
    use tungstenite::{Message, connect};
    use url::Url;

    /// Commands sent to the WebSocket thread.
    enum WsCommand {
        Send(String),
        Close,
    }

    /// Relay client for native platforms.
    ///
    /// Uses a background thread for non-blocking operation. Signals are
    /// buffered for [`SignalingChannel::poll_signals`]; every other event is
    /// returned by [`RelayChannel::poll_events`].
    pub struct RelayChannel {
        state: ConnectionState,
        events: Vec<RelayEvent>,
        inbound: VecDeque<InboundSignal>,
        session: Option<String>,
        connection_id: Option<String>,
        /// Channel to send commands to the WebSocket thread.
        cmd_tx: Option<Sender<WsCommand>>,
        /// Channel to receive events from the WebSocket thread.
        event_rx: Option<Receiver<RelayEvent>>,
        /// Handle to the WebSocket thread.
        _thread: Option<JoinHandle<()>>,
    }

    impl RelayChannel {
        /// Create a new disconnected client.
        pub fn new() -> Self {
            Self {
                state: ConnectionState::Disconnected,
                events: Vec::new(),
                inbound: VecDeque::new(),
                session: None,
                connection_id: None,
                cmd_tx: None,
                event_rx: None,
                _thread: None,
            }
        }

        /// Connect to a relay server.
        pub fn connect(&mut self, url: &str) -> Result<(), String> {
            if self.cmd_tx.is_some() {
                return Err("Already connected".to_string());
            }

            let parsed_url = Url::parse(url).map_err(|e| format!("Invalid URL: {}", e))?;
            if parsed_url.scheme() != "ws" && parsed_url.scheme() != "wss" {
                return Err(format!("Invalid WebSocket URL scheme: {}", parsed_url.scheme()));
            }

            self.state = ConnectionState::Connecting;

            let (cmd_tx, cmd_rx) = channel::<WsCommand>();
            let (event_tx, event_rx) = channel::<RelayEvent>();
            let url = url.to_string();

            let handle = thread::spawn(move || run_socket(url, cmd_rx, event_tx));

            self.cmd_tx = Some(cmd_tx);
            self.event_rx = Some(event_rx);
            self._thread = Some(handle);

            Ok(())
        }

        /// Disconnect from the relay.
        pub fn disconnect(&mut self) {
            if let Some(tx) = self.cmd_tx.take() {
                let _ = tx.send(WsCommand::Close);
            }
            self.event_rx = None;
            self._thread = None;
            self.session = None;
            self.connection_id = None;
            self.state = ConnectionState::Disconnected;
        }

        /// Request to join a session.
        pub fn join(&mut self, session: &str) -> Result<(), ChannelError> {
            self.send(&ClientMessage::Join {
                session: session.to_string(),
            })
        }

        /// Leave the current session.
        pub fn leave(&mut self) -> Result<(), ChannelError> {
            if self.session.is_none() {
                return Ok(());
            }
            self.send(&ClientMessage::Leave)?;
            self.session = None;
            Ok(())
        }

        /// Send a protocol message.
        pub fn send(&self, msg: &ClientMessage) -> Result<(), ChannelError> {
            let tx = self.cmd_tx.as_ref().ok_or(ChannelError::NotConnected)?;
            let json =
                serde_json::to_string(msg).map_err(|e| ChannelError::SendFailed(e.to_string()))?;
            tx.send(WsCommand::Send(json))
                .map_err(|e| ChannelError::SendFailed(e.to_string()))
        }

        /// Poll for pending non-signal events (non-blocking).
        pub fn poll_events(&mut self) -> Vec<RelayEvent> {
            self.pump();
            std::mem::take(&mut self.events)
        }

        /// Get current connection state.
        pub fn state(&self) -> ConnectionState {
            self.state
        }

        /// Check if connected.
        pub fn is_connected(&self) -> bool {
            self.state == ConnectionState::Connected
        }

        /// Session joined, once confirmed by the relay.
        pub fn session(&self) -> Option<&str> {
            self.session.as_deref()
        }

        /// Our connection id within the session.
        pub fn connection_id(&self) -> Option<&str> {
            self.connection_id.as_deref()
        }

        /// Drain the socket thread's events into the local buffers.
        fn pump(&mut self) {
            let Some(rx) = self.event_rx.as_ref() else {
                return;
            };
            let mut drained = Vec::new();
            while let Ok(event) = rx.try_recv() {
                drained.push(event);
            }
            for event in drained {
                match event {
                    RelayEvent::Signal(signal) => {
                        self.inbound.push_back(signal);
                        continue;
                    }
                    RelayEvent::Connected => self.state = ConnectionState::Connected,
                    RelayEvent::Disconnected => {
                        self.state = ConnectionState::Disconnected;
                        self.session = None;
                    }
                    RelayEvent::Error { .. } => {
                        if self.state != ConnectionState::Connected {
                            self.state = ConnectionState::Error;
                        }
                    }
                    RelayEvent::Joined {
                        ref session,
                        ref connection_id,
                        ..
                    } => {
                        self.session = Some(session.clone());
                        self.connection_id = Some(connection_id.clone());
                    }
                    RelayEvent::ParticipantJoined { .. } | RelayEvent::ParticipantLeft { .. } => {}
                }
                self.events.push(event);
            }
        }
    }

    impl SignalingChannel for RelayChannel {
        fn signal(&mut self, message: &WireMessage) -> Result<(), ChannelError> {
            self.pump();
            if self.session.is_none() {
                return Err(ChannelError::NotConnected);
            }
            self.send(&ClientMessage::Signal {
                signal: message.clone(),
            })
        }

        fn poll_signals(&mut self) -> Vec<InboundSignal> {
            self.pump();
            self.inbound.drain(..).collect()
        }
    }

    impl Default for RelayChannel {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Drop for RelayChannel {
        fn drop(&mut self) {
            self.disconnect();
        }
    }

    /// Socket loop run on the background thread.
    fn run_socket(url: String, cmd_rx: Receiver<WsCommand>, event_tx: Sender<RelayEvent>) {
        log::info!("Relay thread: connecting to {}", url);

        let (mut socket, response) = match connect(&url) {
            Ok(pair) => pair,
            Err(e) => {
                log::error!("Relay connection failed: {}", e);
                let _ = event_tx.send(RelayEvent::Error {
                    message: format!("Connection failed: {}", e),
                });
                return;
            }
        };
        log::info!("Relay connected, status: {}", response.status());
        let _ = event_tx.send(RelayEvent::Connected);

        // Short read timeout so commands are picked up between reads
        match socket.get_mut() {
            tungstenite::stream::MaybeTlsStream::Plain(tcp) => {
                let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
                let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
            }
            #[allow(unreachable_patterns)]
            _ => {
                log::debug!("TLS or other stream - using default timeout handling");
            }
        }

        loop {
            match cmd_rx.try_recv() {
                Ok(WsCommand::Send(msg)) => {
                    log::debug!("Relay sending: {}", truncate(&msg));
                    if let Err(e) = socket.send(Message::Text(msg)) {
                        log::error!("Relay send error: {}", e);
                        let _ = event_tx.send(RelayEvent::Error {
                            message: format!("Send failed: {}", e),
                        });
                        break;
                    }
                }
                Ok(WsCommand::Close) => {
                    log::info!("Relay close requested");
                    let _ = socket.close(None);
                    break;
                }
                Err(TryRecvError::Disconnected) => {
                    log::info!("Relay command channel disconnected");
                    break;
                }
                Err(TryRecvError::Empty) => {}
            }

            match socket.read() {
                Ok(Message::Text(txt)) => {
                    log::debug!("Relay received: {}", truncate(&txt));
                    match serde_json::from_str::<ServerMessage>(&txt) {
                        Ok(server_msg) => {
                            let _ = event_tx.send(RelayEvent::from(server_msg));
                        }
                        Err(e) => log::warn!("Failed to parse relay message: {}", e),
                    }
                }
                Ok(Message::Ping(data)) => {
                    let _ = socket.send(Message::Pong(data));
                }
                Ok(Message::Close(_)) => {
                    log::info!("Relay sent close frame");
                    break;
                }
                Ok(_) => {}
                Err(tungstenite::Error::Io(ref e))
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(e) => {
                    log::error!("Relay read error: {}", e);
                    break;
                }
            }
        }

        log::info!("Relay thread exiting");
        let _ = event_tx.send(RelayEvent::Disconnected);
    }

    /// At most 100 bytes of a message, cut on a char boundary.
    fn truncate(msg: &str) -> &str {
        let mut end = msg.len().min(100);
        while !msg.is_char_boundary(end) {
            end -= 1;
        }
        &msg[..end]
    }

}

#[cfg(not(target_arch = "wasm32"))]
pub use native_client::RelayChannel;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_serialize() {
        let msg = ClientMessage::Join {
            session: "wall-3".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"join","session":"wall-3"}"#);
    }

    #[test]
    fn test_signal_envelope_nests_wire_message() {
        let msg = ClientMessage::Signal {
            signal: WireMessage {
                tag: "reset".to_string(),
                data: None,
                to: vec![],
            },
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"signal","signal":{"type":"reset","to":[]}}"#);
        let back: ClientMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_server_message_deserialize() {
        let json = r#"{"type":"joined","session":"wall-3","connection_id":"abc","participant_count":2}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            RelayEvent::from(msg),
            RelayEvent::Joined {
                session: "wall-3".to_string(),
                connection_id: "abc".to_string(),
                participant_count: 2,
            }
        );
    }

    #[test]
    fn test_server_signal_becomes_inbound() {
        let json = r#"{"type":"signal","from":"abc","signal":{"type":"reset","to":[]}}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        let RelayEvent::Signal(inbound) = RelayEvent::from(msg) else {
            panic!("expected a signal");
        };
        assert_eq!(inbound.from.as_deref(), Some("abc"));
        assert_eq!(inbound.message.tag, "reset");
    }
}
