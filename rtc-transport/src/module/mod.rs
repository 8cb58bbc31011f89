
pub mod demuxer;
pub mod muxer;

use log::{error, trace};

use crate::error::Result;
use crate::packet::Packet;

/// A single packet processing stage.
///
/// A module receives packets in batches and returns what the next stage should
/// see. It may drop, transform, split or pass through packets, and a terminal
/// sink returns nothing. Order within a batch is preserved unless a module
/// documents otherwise.
pub trait Module: Send {
    fn name(&self) -> &str;

    /// Handles a batch and returns the batch for the next module.
    fn process_packets(&mut self, packets: Vec<Packet>) -> Result<Vec<Packet>>;
}

/// An ordered pipeline of modules.
///
/// Modules are attached before the first packet is pushed; a chain is never
/// mutated while it is processing.
pub struct ModuleChain {
    name: String,
    modules: Vec<Box<dyn Module>>,
}

impl ModuleChain {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            modules: vec![],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_module(&mut self, module: Box<dyn Module>) {
        self.modules.push(module);
    }

    pub fn with_module(mut self, module: Box<dyn Module>) -> Self {
        self.add_module(module);
        self
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    /// Threads a batch through every module in order and returns what the
    /// last module produced.
    ///
    /// A module error is contained here: it is logged and the batch that
    /// module was handling is dropped, so a failing stage never takes down the
    /// loop that feeds the chain.
    pub fn process_packets(&mut self, packets: Vec<Packet>) -> Vec<Packet> {
        let mut batch = packets;
        for module in self.modules.iter_mut() {
            if batch.is_empty() {
                break;
            }
            let count = batch.len();
            batch = match module.process_packets(batch) {
                Ok(out) => out,
                Err(err) => {
                    error!(
                        "{}: module {} dropped {} packet(s): {}",
                        self.name,
                        module.name(),
                        count,
                        err
                    );
                    return vec![];
                }
            };
            trace!(
                "{}: module {} {} -> {} packet(s)",
                self.name,
                module.name(),
                count,
                batch.len()
            );
        }
        batch
    }
}
