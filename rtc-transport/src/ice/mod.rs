pub mod candidate;
pub mod monitor;
pub mod rand;

use std::fmt;
use std::net::{SocketAddr, UdpSocket};

use crossbeam_channel::Sender;

use crate::error::Result;
use candidate::{RTCIceCandidate, RTCIceParameters};

/// An enum showing the state of a ICE Connection List of supported States.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum IceConnectionState {
    #[default]
    Unspecified,

    /// ICE agent is gathering addresses.
    New,

    /// ICE agent has been given local and remote candidates, and is attempting to find a match.
    Checking,

    /// ICE agent has a pairing, but is still checking other pairs.
    Connected,

    /// ICE agent has finished.
    Completed,

    /// ICE agent never could successfully connect.
    Failed,

    /// ICE agent connected successfully, but has entered a failed state.
    Disconnected,

    /// ICE agent has finished and is no longer handling requests.
    Closed,
}

impl fmt::Display for IceConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::Unspecified => "Unspecified",
            Self::New => "New",
            Self::Checking => "Checking",
            Self::Connected => "Connected",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Disconnected => "Disconnected",
            Self::Closed => "Closed",
        };
        write!(f, "{s}")
    }
}

impl From<u8> for IceConnectionState {
    fn from(v: u8) -> Self {
        match v {
            1 => Self::New,
            2 => Self::Checking,
            3 => Self::Connected,
            4 => Self::Completed,
            5 => Self::Failed,
            6 => Self::Disconnected,
            7 => Self::Closed,
            _ => Self::Unspecified,
        }
    }
}

impl From<IceConnectionState> for u8 {
    fn from(state: IceConnectionState) -> Self {
        match state {
            IceConnectionState::Unspecified => 0,
            IceConnectionState::New => 1,
            IceConnectionState::Checking => 2,
            IceConnectionState::Connected => 3,
            IceConnectionState::Completed => 4,
            IceConnectionState::Failed => 5,
            IceConnectionState::Disconnected => 6,
            IceConnectionState::Closed => 7,
        }
    }
}

impl IceConnectionState {
    /// A candidate pair was selected and the path can carry traffic.
    pub fn is_established(self) -> bool {
        matches!(self, Self::Connected | Self::Completed)
    }

    /// Negotiation ended without a usable path.
    pub fn is_failed(self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }
}

/// The connectivity negotiation engine, consumed as a black box.
///
/// Candidate gathering, pair checks and STUN exchanges live behind this
/// trait. The transport manager only starts the checks, listens for state
/// changes and reads the selected remote address and local parameters.
pub trait IceAgent: Send {
    fn local_parameters(&self) -> RTCIceParameters;

    fn local_candidates(&self) -> Vec<RTCIceCandidate>;

    /// Whether the agent runs in the controlling role.
    fn is_controlling(&self) -> bool;

    fn set_remote_ufrag(&mut self, ufrag: &str) -> Result<()>;

    fn set_remote_pwd(&mut self, pwd: &str) -> Result<()>;

    fn add_remote_candidate(&mut self, candidate: &RTCIceCandidate) -> Result<()>;

    /// Begins connectivity checks on `socket` and returns without waiting for
    /// them. Every state change afterwards is sent on `state_changes`.
    fn start_connectivity_checks(
        &mut self,
        socket: UdpSocket,
        state_changes: Sender<IceConnectionState>,
    ) -> Result<()>;

    fn connection_state(&self) -> IceConnectionState;

    /// Remote address of the selected candidate pair.
    fn selected_remote_addr(&self) -> Option<SocketAddr>;

    fn close(&mut self) -> Result<()>;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ice_connection_state_u8() {
        for v in 0..=8u8 {
            let state = IceConnectionState::from(v);
            if v <= 7 {
                assert_eq!(u8::from(state), v);
            } else {
                assert_eq!(state, IceConnectionState::Unspecified);
            }
        }
    }

    #[test]
    fn test_ice_connection_state_predicates() {
        let tests = vec![
            (IceConnectionState::New, false, false),
            (IceConnectionState::Checking, false, false),
            (IceConnectionState::Connected, true, false),
            (IceConnectionState::Completed, true, false),
            (IceConnectionState::Disconnected, false, false),
            (IceConnectionState::Failed, false, true),
            (IceConnectionState::Closed, false, true),
        ];

        for (state, established, failed) in tests {
            assert_eq!(state.is_established(), established, "{state}");
            assert_eq!(state.is_failed(), failed, "{state}");
        }
    }
}
