use bytes::Bytes;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Instant;

/// Local and peer address a datagram travelled between.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TransportContext {
    /// Local socket address, either IPv4 or IPv6
    pub local_addr: SocketAddr,
    /// Peer socket address, either IPv4 or IPv6
    pub peer_addr: SocketAddr,
}

impl Default for TransportContext {
    fn default() -> Self {
        let unspecified = SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 0);
        Self {
            local_addr: unspecified,
            peer_addr: unspecified,
        }
    }
}

/// An immutable datagram moving through a module chain.
///
/// The payload is a reference-counted [`Bytes`], so handing a packet to the
/// next stage never copies and no stage can mutate what another stage sees.
/// Packets built from a reused receive buffer must go through
/// [`Packet::copy_from_slice`] so that each one owns its bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    /// Received/Sent time
    pub now: Instant,
    pub transport: TransportContext,
    payload: Bytes,
}

impl Packet {
    pub fn new(now: Instant, transport: TransportContext, payload: Bytes) -> Self {
        Self {
            now,
            transport,
            payload,
        }
    }

    /// Copies `buf` into a freshly allocated payload.
    pub fn copy_from_slice(now: Instant, transport: TransportContext, buf: &[u8]) -> Self {
        Self::new(now, transport, Bytes::copy_from_slice(buf))
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// First byte of the payload, used for protocol classification.
    pub fn first_byte(&self) -> Option<u8> {
        self.payload.first().copied()
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("peer_addr", &self.transport.peer_addr)
            .field("len", &self.payload.len())
            .field("first_byte", &self.first_byte())
            .finish()
    }
}
