use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;

use crate::dtls::bridge::{handshake_bridge, QueueDatagramTransport};
use crate::error::Result;
use crate::module::demuxer::{match_dtls, Demuxer, PacketPath};
use crate::module::muxer::Muxer;
use crate::module::ModuleChain;
use crate::packet::{Packet, TransportContext};
use crate::shutdown::ShutdownSignal;
use crate::socket::SocketWriter;
use crate::state::SessionState;

pub(crate) const INCOMING_CHAIN: &str = "incoming";
pub(crate) const OUTGOING_CHAIN: &str = "outgoing";
pub(crate) const DTLS_PATH: &str = "dtls";

/// Both directions of a session's packet flow, ready to be handed to the
/// threads that drive them.
///
/// ```text
///  socket ─► incoming: Demuxer ─┬─ [20..63] dtls: DtlsReceiver ─► queue ─► engine
///                               └─ (unmatched, dropped)
///  engine ─► dtls input ─► outgoing: Muxer ─► SocketWriter ─► socket
/// ```
pub(crate) struct Pipelines {
    pub(crate) incoming: ModuleChain,
    pub(crate) outgoing: Muxer,
    pub(crate) dtls_transport: QueueDatagramTransport,
}

/// Builds the incoming and outgoing pipelines for traffic between `socket`
/// and `remote`.
pub(crate) fn build_pipelines(
    socket: &UdpSocket,
    remote: SocketAddr,
    queue_capacity: usize,
    session: Arc<SessionState>,
    shutdown: ShutdownSignal,
) -> Result<Pipelines> {
    let transport = TransportContext {
        local_addr: socket.local_addr()?,
        peer_addr: remote,
    };

    let mut outgoing = Muxer::new(
        "outgoing-muxer",
        ModuleChain::new(OUTGOING_CHAIN)
            .with_module(Box::new(SocketWriter::new(socket.try_clone()?, session))),
    );
    let (dtls_receiver, dtls_transport) = handshake_bridge(
        queue_capacity,
        outgoing.attach_input(DTLS_PATH),
        transport,
        shutdown,
    );

    let demuxer = Demuxer::new("demuxer").with_packet_path(PacketPath::new(
        DTLS_PATH,
        |p: &Packet| match_dtls(p.payload()),
        ModuleChain::new(DTLS_PATH).with_module(Box::new(dtls_receiver)),
    ));
    let incoming = ModuleChain::new(INCOMING_CHAIN).with_module(Box::new(demuxer));

    Ok(Pipelines {
        incoming,
        outgoing,
        dtls_transport,
    })
}
