#[cfg(test)]
mod demuxer_test;

use log::{debug, trace};

use super::{Module, ModuleChain};
use crate::error::Result;
use crate::packet::Packet;

/// match_range is a MatchFunc that accepts packets with the first byte in [lower..upper]
pub fn match_range(lower: u8, upper: u8, buf: &[u8]) -> bool {
    if buf.is_empty() {
        return false;
    }
    let b = buf[0];
    b >= lower && b <= upper
}

/// MatchFuncs as described in RFC7983
/// <https://tools.ietf.org/html/rfc7983>
///              +----------------+
///              |        [0..3] -+--> forward to STUN
///              |                |
///              |      [16..19] -+--> forward to ZRTP
///              |                |
///  packet -->  |      [20..63] -+--> forward to DTLS
///              |                |
///              |      [64..79] -+--> forward to TURN Channel
///              |                |
///              |    [128..191] -+--> forward to RTP/RTCP
///              +----------------+
/// match_dtls is a MatchFunc that accepts packets with the first byte in [20..63]
/// as defied in RFC7983
pub fn match_dtls(b: &[u8]) -> bool {
    match_range(20, 63, b)
}

/// match_srtp is a MatchFunc that accepts packets with the first byte in [128..191]
/// as defied in RFC7983
pub fn match_srtp(b: &[u8]) -> bool {
    match_range(128, 191, b)
}

/// match_stun is a MatchFunc that accepts packets with the first byte in [0..3]
/// as defied in RFC7983
pub fn match_stun(b: &[u8]) -> bool {
    match_range(0, 3, b)
}

pub type PacketPredicate = Box<dyn Fn(&Packet) -> bool + Send>;

/// A predicate paired with the sub-chain that receives the packets it accepts.
pub struct PacketPath {
    name: String,
    predicate: PacketPredicate,
    path: ModuleChain,
}

impl PacketPath {
    pub fn new<F>(name: impl Into<String>, predicate: F, path: ModuleChain) -> Self
    where
        F: Fn(&Packet) -> bool + Send + 'static,
    {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
            path,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, packet: &Packet) -> bool {
        (self.predicate)(packet)
    }
}

/// Demuxer routes each packet to the first registered path whose predicate
/// accepts it.
///
/// Paths are evaluated in registration order and evaluation stops at the first
/// match. Packets no path accepts go to the default path when one is set and
/// are dropped otherwise. The output of the demuxer is whatever the sub-chains
/// produce, in path order.
pub struct Demuxer {
    name: String,
    paths: Vec<PacketPath>,
    default_path: Option<ModuleChain>,
}

impl Demuxer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            paths: vec![],
            default_path: None,
        }
    }

    /// Registers a path after every existing one.
    pub fn add_packet_path(&mut self, path: PacketPath) {
        self.paths.push(path);
    }

    pub fn with_packet_path(mut self, path: PacketPath) -> Self {
        self.add_packet_path(path);
        self
    }

    pub fn set_default_path(&mut self, path: ModuleChain) {
        self.default_path = Some(path);
    }

    pub fn path_names(&self) -> Vec<&str> {
        self.paths.iter().map(|p| p.name()).collect()
    }

    /// Index of the first path accepting `packet`.
    pub fn classify(&self, packet: &Packet) -> Option<usize> {
        self.paths.iter().position(|path| path.matches(packet))
    }
}

impl Module for Demuxer {
    fn name(&self) -> &str {
        &self.name
    }

    fn process_packets(&mut self, packets: Vec<Packet>) -> Result<Vec<Packet>> {
        let mut partitions: Vec<Vec<Packet>> = self.paths.iter().map(|_| vec![]).collect();
        let mut unmatched = vec![];

        for packet in packets {
            if packet.is_empty() {
                debug!("drop invalid packet due to zero length");
                continue;
            }
            match self.classify(&packet) {
                Some(index) => partitions[index].push(packet),
                None if self.default_path.is_some() => unmatched.push(packet),
                None => {
                    trace!(
                        "{}: drop unrouted packet from {} with first byte {:?}",
                        self.name,
                        packet.transport.peer_addr,
                        packet.first_byte()
                    );
                }
            }
        }

        let mut outs = vec![];
        for (path, batch) in self.paths.iter_mut().zip(partitions) {
            if !batch.is_empty() {
                trace!("{}: route {} packet(s) to {}", self.name, batch.len(), path.name);
                outs.extend(path.path.process_packets(batch));
            }
        }
        if let Some(default_path) = self.default_path.as_mut() {
            if !unmatched.is_empty() {
                outs.extend(default_path.process_packets(unmatched));
            }
        }

        Ok(outs)
    }
}
