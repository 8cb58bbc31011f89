
use std::sync::{Arc, Mutex};

use log::{debug, trace};

use super::{Module, ModuleChain};
use crate::error::{Error, Result};
use crate::packet::Packet;

/// Muxer merges packets pushed by any number of independent inputs into one
/// downstream chain.
///
/// Each push holds the downstream lock for the whole batch, so the downstream
/// chain observes a single total order: the order in which pushes reach the
/// muxer. Packets from one input keep their relative order; no other
/// interleaving across inputs is promised.
///
/// [`Muxer::close`] drops the downstream chain even while inputs are still
/// held elsewhere; later pushes fail with `ErrUseClosedNetworkConn`.
pub struct Muxer {
    name: String,
    downstream: Arc<Mutex<Option<ModuleChain>>>,
    inputs: Vec<String>,
}

impl Muxer {
    pub fn new(name: impl Into<String>, downstream: ModuleChain) -> Self {
        Self {
            name: name.into(),
            downstream: Arc::new(Mutex::new(Some(downstream))),
            inputs: vec![],
        }
    }

    /// Creates a new input. Inputs are cheap handles that may be moved to
    /// other threads.
    pub fn attach_input(&mut self, name: impl Into<String>) -> MuxerInput {
        let name = name.into();
        self.inputs.push(name.clone());
        MuxerInput {
            name,
            muxer: self.name.clone(),
            downstream: Arc::clone(&self.downstream),
        }
    }

    pub fn input_names(&self) -> &[String] {
        &self.inputs
    }

    /// Drops the downstream chain and everything it owns.
    pub fn close(&self) -> Result<()> {
        if let Some(downstream) = self.downstream.lock()?.take() {
            debug!("{}: closed downstream chain {}", self.name, downstream.name());
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        match self.downstream.lock() {
            Ok(downstream) => downstream.is_none(),
            Err(_) => true,
        }
    }
}

fn forward(
    downstream: &Mutex<Option<ModuleChain>>,
    packets: Vec<Packet>,
) -> Result<Vec<Packet>> {
    let mut downstream = downstream.lock()?;
    let chain = downstream.as_mut().ok_or(Error::ErrUseClosedNetworkConn)?;
    Ok(chain.process_packets(packets))
}

impl Module for Muxer {
    fn name(&self) -> &str {
        &self.name
    }

    fn process_packets(&mut self, packets: Vec<Packet>) -> Result<Vec<Packet>> {
        forward(&self.downstream, packets)
    }
}

/// A source feeding a [`Muxer`].
#[derive(Clone)]
pub struct MuxerInput {
    name: String,
    muxer: String,
    downstream: Arc<Mutex<Option<ModuleChain>>>,
}

impl MuxerInput {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pushes a batch through the muxer's downstream chain on the calling
    /// thread and returns what the chain produced. Fails once the muxer is
    /// closed.
    pub fn push(&self, packets: Vec<Packet>) -> Result<Vec<Packet>> {
        trace!(
            "{}: input {} pushed {} packet(s)",
            self.muxer,
            self.name,
            packets.len()
        );
        forward(&self.downstream, packets)
    }
}
