use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use crossbeam_channel::{Receiver, Sender};
use log::{debug, error};

use crate::error::{Error, Result};

/// Indicates the state of the transport session.
///
/// ```text
/// NotStarted → Negotiating → Connected → HandshakeInProgress → Established
/// ```
///
/// Any state may move to `Failed` on an unrecoverable I/O, negotiation or
/// handshake error, and every state moves to `Closed` on teardown.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Unspecified = 0,

    /// Connectivity establishment has not been requested yet.
    NotStarted = 1,

    /// The ICE agent is running connectivity checks.
    Negotiating = 2,

    /// ICE selected a candidate pair; the UDP path is usable.
    Connected = 3,

    /// The DTLS handshake is running over the selected path.
    HandshakeInProgress = 4,

    /// The handshake produced a secure transport.
    Established = 5,

    Failed = 6,

    Closed = 7,
}

const CONNECTION_STATE_NOT_STARTED_STR: &str = "not-started";
const CONNECTION_STATE_NEGOTIATING_STR: &str = "negotiating";
const CONNECTION_STATE_CONNECTED_STR: &str = "connected";
const CONNECTION_STATE_HANDSHAKE_IN_PROGRESS_STR: &str = "handshake-in-progress";
const CONNECTION_STATE_ESTABLISHED_STR: &str = "established";
const CONNECTION_STATE_FAILED_STR: &str = "failed";
const CONNECTION_STATE_CLOSED_STR: &str = "closed";
const UNSPECIFIED_STR: &str = "Unspecified";

impl From<&str> for ConnectionState {
    fn from(raw: &str) -> Self {
        match raw {
            CONNECTION_STATE_NOT_STARTED_STR => ConnectionState::NotStarted,
            CONNECTION_STATE_NEGOTIATING_STR => ConnectionState::Negotiating,
            CONNECTION_STATE_CONNECTED_STR => ConnectionState::Connected,
            CONNECTION_STATE_HANDSHAKE_IN_PROGRESS_STR => ConnectionState::HandshakeInProgress,
            CONNECTION_STATE_ESTABLISHED_STR => ConnectionState::Established,
            CONNECTION_STATE_FAILED_STR => ConnectionState::Failed,
            CONNECTION_STATE_CLOSED_STR => ConnectionState::Closed,
            _ => ConnectionState::Unspecified,
        }
    }
}

impl From<u8> for ConnectionState {
    fn from(v: u8) -> Self {
        match v {
            1 => ConnectionState::NotStarted,
            2 => ConnectionState::Negotiating,
            3 => ConnectionState::Connected,
            4 => ConnectionState::HandshakeInProgress,
            5 => ConnectionState::Established,
            6 => ConnectionState::Failed,
            7 => ConnectionState::Closed,
            _ => ConnectionState::Unspecified,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            ConnectionState::NotStarted => CONNECTION_STATE_NOT_STARTED_STR,
            ConnectionState::Negotiating => CONNECTION_STATE_NEGOTIATING_STR,
            ConnectionState::Connected => CONNECTION_STATE_CONNECTED_STR,
            ConnectionState::HandshakeInProgress => CONNECTION_STATE_HANDSHAKE_IN_PROGRESS_STR,
            ConnectionState::Established => CONNECTION_STATE_ESTABLISHED_STR,
            ConnectionState::Failed => CONNECTION_STATE_FAILED_STR,
            ConnectionState::Closed => CONNECTION_STATE_CLOSED_STR,
            ConnectionState::Unspecified => UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}

impl ConnectionState {
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Failed, _) => false,
            (_, Failed) => true,
            (NotStarted, Negotiating)
            | (Negotiating, Connected)
            | (Connected, HandshakeInProgress)
            | (HandshakeInProgress, Established) => true,
            _ => false,
        }
    }

    /// Whether the selected UDP path is usable, secured or not.
    pub fn is_ice_connected(self) -> bool {
        matches!(
            self,
            ConnectionState::Connected
                | ConnectionState::HandshakeInProgress
                | ConnectionState::Established
        )
    }
}

/// Events surfaced to the owner of a transport manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    StateChange(ConnectionState),
    /// The session failed and will not recover without new negotiation.
    Failed(String),
}

/// Session state shared between the manager and its background threads.
pub(crate) struct SessionState {
    state: AtomicU8,
    events_tx: Sender<TransportEvent>,
    events_rx: Receiver<TransportEvent>,
}

impl SessionState {
    pub(crate) fn new() -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        Self {
            state: AtomicU8::new(ConnectionState::NotStarted as u8),
            events_tx,
            events_rx,
        }
    }

    pub(crate) fn get(&self) -> ConnectionState {
        self.state.load(Ordering::SeqCst).into()
    }

    pub(crate) fn events(&self) -> Receiver<TransportEvent> {
        self.events_rx.clone()
    }

    /// Moves to `next` if the transition is valid from the current state and
    /// returns the previous state.
    pub(crate) fn transition(&self, next: ConnectionState) -> Result<ConnectionState> {
        let mut current = self.get();
        loop {
            if !current.can_transition_to(next) {
                return Err(Error::ErrInvalidStateTransition(
                    current.to_string(),
                    next.to_string(),
                ));
            }
            match self.state.compare_exchange(
                current as u8,
                next as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual.into(),
            }
        }

        debug!("transport state changed: {current} -> {next}");
        let _ = self.events_tx.send(TransportEvent::StateChange(next));
        Ok(current)
    }

    /// Moves to `Failed` and reports why. Returns false when the session was
    /// already failed or closed.
    pub(crate) fn fail(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        match self.transition(ConnectionState::Failed) {
            Ok(prev) => {
                error!("transport failed in state {prev}: {reason}");
                let _ = self.events_tx.send(TransportEvent::Failed(reason));
                true
            }
            Err(_) => {
                debug!("ignore failure in terminal state: {reason}");
                false
            }
        }
    }
}
