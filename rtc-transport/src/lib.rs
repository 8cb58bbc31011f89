#![warn(rust_2018_idioms)]

//! Transport establishment for a real-time media endpoint.
//!
//! A [`TransportManager`] drives ICE connectivity negotiation for one UDP
//! socket and then runs a DTLS handshake over the negotiated path. Datagrams
//! move through [`module`] chains: the incoming chain demultiplexes by the
//! first payload byte (RFC 7983) and the outgoing chain merges every sender
//! into the socket through a [`module::muxer::Muxer`].
//!
//! The ICE agent and the DTLS engine are collaborators supplied by the caller
//! through the [`ice::IceAgent`] and [`dtls::DtlsEngine`] traits.

pub mod config;
pub mod dtls;
pub mod error;
pub mod ice;
pub mod manager;
pub mod module;
pub mod packet;
pub mod shutdown;
pub mod socket;
pub mod state;

pub use config::{PortRange, TransportConfig, RECEIVE_MTU};
pub use error::{Error, Result};
pub use manager::description::{RTCTransportDescription, RemoteTransportParameters};
pub use manager::TransportManager;
pub use packet::{Packet, TransportContext};
pub use state::{ConnectionState, TransportEvent};
