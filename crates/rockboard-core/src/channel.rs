//! Signaling channel contract and an in-process loopback implementation.
//!
//! The live session's signaling channel is external to the overlay: the overlay
//! only sends wire messages into it and drains what it delivered. Delivery is
//! at-least-once and ordered per sender; nothing stronger is assumed.

use crate::codec::WireMessage;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use thiserror::Error;

/// Channel errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("Not connected to a session")]
    NotConnected,
    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// A signal delivered by the channel.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundSignal {
    /// Connection id of the sender, when the channel reports it.
    pub from: Option<String>,
    pub message: WireMessage,
}

/// Send/receive contract of the session's signaling channel.
pub trait SignalingChannel {
    /// Hand a message to the channel for fan-out to its recipients.
    fn signal(&mut self, message: &WireMessage) -> Result<(), ChannelError>;

    /// Drain signals delivered since the last poll (non-blocking), in delivery order.
    fn poll_signals(&mut self) -> Vec<InboundSignal>;
}

#[derive(Default)]
struct HubState {
    next_id: u64,
    inboxes: HashMap<String, VecDeque<InboundSignal>>,
}

/// In-process session: every connected [`LoopbackChannel`] receives the
/// signals addressed to it, the sender included.
#[derive(Clone, Default)]
pub struct LoopbackHub {
    state: Rc<RefCell<HubState>>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a new participant.
    pub fn connect(&self) -> LoopbackChannel {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = format!("participant-{}", state.next_id);
        state.inboxes.insert(id.clone(), VecDeque::new());
        log::debug!("Loopback participant joined: {}", id);
        LoopbackChannel {
            id,
            state: Rc::clone(&self.state),
            connected: true,
        }
    }

    /// Number of connected participants.
    pub fn participant_count(&self) -> usize {
        self.state.borrow().inboxes.len()
    }
}

/// One participant's end of a [`LoopbackHub`].
pub struct LoopbackChannel {
    id: String,
    state: Rc<RefCell<HubState>>,
    connected: bool,
}

impl LoopbackChannel {
    /// Connection id of this participant.
    pub fn connection_id(&self) -> &str {
        &self.id
    }

    /// Check if still part of the session.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Leave the session. Pending signals are discarded.
    pub fn disconnect(&mut self) {
        if self.connected {
            self.state.borrow_mut().inboxes.remove(&self.id);
            self.connected = false;
            log::debug!("Loopback participant left: {}", self.id);
        }
    }
}

impl SignalingChannel for LoopbackChannel {
    fn signal(&mut self, message: &WireMessage) -> Result<(), ChannelError> {
        if !self.connected {
            return Err(ChannelError::NotConnected);
        }
        let mut state = self.state.borrow_mut();
        for (id, inbox) in state.inboxes.iter_mut() {
            if message.is_addressed_to(id) {
                inbox.push_back(InboundSignal {
                    from: Some(self.id.clone()),
                    message: message.clone(),
                });
            }
        }
        Ok(())
    }

    fn poll_signals(&mut self) -> Vec<InboundSignal> {
        self.state
            .borrow_mut()
            .inboxes
            .get_mut(&self.id)
            .map(|inbox| inbox.drain(..).collect())
            .unwrap_or_default()
    }
}

impl Drop for LoopbackChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}
