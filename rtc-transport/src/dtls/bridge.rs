#[cfg(test)]
mod bridge_test;

use std::time::{Duration, Instant};

use crossbeam_channel::{select, Receiver, Sender, TrySendError};
use log::{trace, warn};

use super::HandshakeTransport;
use crate::config::RECEIVE_MTU;
use crate::error::{Error, Result};
use crate::module::muxer::MuxerInput;
use crate::module::Module;
use crate::packet::{Packet, TransportContext};
use crate::shutdown::ShutdownSignal;

/// Creates the two halves of a handshake bridge sharing one bounded queue of
/// `capacity` datagrams.
///
/// The [`DtlsReceiver`] terminates the handshake path of the incoming
/// pipeline; the [`QueueDatagramTransport`] is handed to the handshake engine.
/// Outgoing datagrams are pushed into `sender` stamped with `transport`.
pub fn handshake_bridge(
    capacity: usize,
    sender: MuxerInput,
    transport: TransportContext,
    shutdown: ShutdownSignal,
) -> (DtlsReceiver, QueueDatagramTransport) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    (
        DtlsReceiver {
            name: "dtls-receiver".to_owned(),
            tx,
            overflow: rx.clone(),
            dropped: 0,
        },
        QueueDatagramTransport {
            rx,
            sender,
            transport,
            shutdown,
        },
    )
}

/// Sink module queueing handshake datagrams for the engine.
///
/// When the engine falls behind and the queue is full, the oldest queued
/// datagram is discarded to make room. Handshake flights are retransmitted
/// as a whole, so a stale datagram is worth less than a fresh one.
pub struct DtlsReceiver {
    name: String,
    tx: Sender<Packet>,
    overflow: Receiver<Packet>,
    dropped: usize,
}

impl DtlsReceiver {
    /// Datagrams discarded so far because the queue was full.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    fn enqueue(&mut self, mut packet: Packet) -> Result<()> {
        loop {
            match self.tx.try_send(packet) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(p)) => {
                    packet = p;
                    if let Ok(oldest) = self.overflow.try_recv() {
                        self.dropped += 1;
                        warn!(
                            "{}: queue full, dropped oldest datagram of {} bytes ({} dropped so far)",
                            self.name,
                            oldest.len(),
                            self.dropped
                        );
                    }
                }
                Err(TrySendError::Disconnected(_)) => return Err(Error::ErrBufferClosed),
            }
        }
    }
}

impl Module for DtlsReceiver {
    fn name(&self) -> &str {
        &self.name
    }

    fn process_packets(&mut self, packets: Vec<Packet>) -> Result<Vec<Packet>> {
        for packet in packets {
            trace!("{}: queue {} bytes", self.name, packet.len());
            self.enqueue(packet)?;
        }
        Ok(vec![])
    }
}

/// Blocking datagram transport over the bridge queue.
pub struct QueueDatagramTransport {
    rx: Receiver<Packet>,
    sender: MuxerInput,
    transport: TransportContext,
    shutdown: ShutdownSignal,
}

impl QueueDatagramTransport {
    fn copy_out(buf: &mut [u8], packet: &Packet) -> usize {
        let n = buf.len().min(packet.len());
        buf[..n].copy_from_slice(&packet.payload()[..n]);
        if n < packet.len() {
            warn!(
                "truncated handshake datagram of {} bytes to {n}",
                packet.len()
            );
        }
        n
    }
}

impl HandshakeTransport for QueueDatagramTransport {
    fn receive(&self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if self.shutdown.is_shutdown() {
            return Err(Error::ErrUseClosedNetworkConn);
        }

        select! {
            recv(self.rx) -> msg => match msg {
                Ok(packet) => Ok(Self::copy_out(buf, &packet)),
                Err(_) => Err(Error::ErrUseClosedNetworkConn),
            },
            recv(self.shutdown.receiver()) -> _ => Err(Error::ErrUseClosedNetworkConn),
            default(timeout) => Err(Error::ErrTimeout),
        }
    }

    fn send(&self, buf: &[u8]) -> Result<()> {
        if buf.len() > RECEIVE_MTU {
            return Err(Error::ErrPacketTooBig);
        }
        if self.shutdown.is_shutdown() {
            return Err(Error::ErrUseClosedNetworkConn);
        }

        let packet = Packet::copy_from_slice(Instant::now(), self.transport, buf);
        self.sender.push(vec![packet])?;
        Ok(())
    }

    fn receive_limit(&self) -> usize {
        RECEIVE_MTU
    }

    fn send_limit(&self) -> usize {
        RECEIVE_MTU
    }
}
