
use std::io;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use rand::{rng, Rng};

use crate::config::{PortRange, RECEIVE_MTU};
use crate::error::{is_transient_io_error, Error, Result};
use crate::module::{Module, ModuleChain};
use crate::packet::{Packet, TransportContext};
use crate::shutdown::ShutdownSignal;
use crate::state::SessionState;

/// Binds a UDP socket on `ip` to the first free port of `range`, starting
/// the search at a random offset so concurrent sessions spread out.
pub fn bind_udp_in_range(ip: IpAddr, range: PortRange) -> Result<UdpSocket> {
    range.validate()?;
    if range.is_ephemeral() {
        return Ok(UdpSocket::bind(SocketAddr::new(ip, 0))?);
    }

    let span = range.len();
    let offset = rng().random_range(0..span);
    for i in 0..span {
        let port = range.min + ((offset + i) % span) as u16;
        match UdpSocket::bind(SocketAddr::new(ip, port)) {
            Ok(socket) => {
                debug!("bound udp socket on {ip}:{port}");
                return Ok(socket);
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                trace!("port {port} in use");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(Error::ErrPortSpaceExhausted)
}

/// Spawns the receive loop. The loop owns `incoming` and feeds it one
/// datagram at a time, each copied out of the shared read buffer.
///
/// The loop exits when `shutdown` fires, checked after every read timeout,
/// or on a fatal socket error, which fails `session`.
pub(crate) fn spawn_receive_loop(
    socket: UdpSocket,
    incoming: ModuleChain,
    read_timeout: Duration,
    shutdown: ShutdownSignal,
    session: Arc<SessionState>,
) -> Result<JoinHandle<()>> {
    socket.set_read_timeout(Some(read_timeout))?;
    let local_addr = socket.local_addr()?;

    let handle = thread::Builder::new()
        .name("udp-receive-loop".to_owned())
        .spawn(move || {
            if let Err(err) = receive_loop(&socket, local_addr, incoming, &shutdown) {
                session.fail(format!("udp receive failed: {err}"));
            }
            debug!("receive loop on {local_addr} exited");
        })?;

    Ok(handle)
}

fn receive_loop(
    socket: &UdpSocket,
    local_addr: SocketAddr,
    mut incoming: ModuleChain,
    shutdown: &ShutdownSignal,
) -> Result<()> {
    let mut buf = vec![0u8; RECEIVE_MTU];

    while !shutdown.is_shutdown() {
        match socket.recv_from(&mut buf) {
            Ok((n, peer_addr)) => {
                trace!("read {n} bytes from {peer_addr}");
                let packet = Packet::copy_from_slice(
                    Instant::now(),
                    TransportContext {
                        local_addr,
                        peer_addr,
                    },
                    &buf[..n],
                );
                incoming.process_packets(vec![packet]);
            }
            Err(e) if is_transient_io_error(&e) => {
                if !matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) {
                    debug!("transient udp receive error on {local_addr}: {e}");
                }
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

/// Terminal module of the outgoing pipeline. Sends each packet as one
/// datagram to the packet's peer address.
pub struct SocketWriter {
    name: String,
    socket: UdpSocket,
    session: Arc<SessionState>,
}

impl SocketWriter {
    pub(crate) fn new(socket: UdpSocket, session: Arc<SessionState>) -> Self {
        Self {
            name: "socket-writer".to_owned(),
            socket,
            session,
        }
    }
}

impl Module for SocketWriter {
    fn name(&self) -> &str {
        &self.name
    }

    fn process_packets(&mut self, packets: Vec<Packet>) -> Result<Vec<Packet>> {
        for packet in packets {
            let peer_addr = packet.transport.peer_addr;
            match self.socket.send_to(packet.payload(), peer_addr) {
                Ok(n) => trace!("wrote {n} bytes to {peer_addr}"),
                Err(e) => {
                    let err = Error::from(e);
                    if !err.is_transient() {
                        self.session
                            .fail(format!("udp send to {peer_addr} failed: {err}"));
                        return Err(err);
                    }
                    warn!("dropped {} bytes to {peer_addr}: {err}", packet.len());
                }
            }
        }
        Ok(vec![])
    }
}
