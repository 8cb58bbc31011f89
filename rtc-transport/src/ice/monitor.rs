
use std::net::UdpSocket;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{select, Receiver, Sender};
use log::{debug, info, warn};

use super::{IceAgent, IceConnectionState};
use crate::error::Result;
use crate::shutdown::ShutdownSignal;

/// Transitions of the negotiation that the transport reacts to. Each variant
/// is emitted at most once per session.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConnectivityEvent {
    /// The agent first reported an established pair.
    Connected,
    /// The agent reported that negotiation failed or was closed.
    Failed(IceConnectionState),
}

/// Wraps the ICE agent and turns its stream of state changes into single
/// [`ConnectivityEvent`]s.
///
/// The agent reports changes on a channel rather than through a callback, so
/// the reaction to a transition always runs on a thread the transport owns and
/// never re-enters the agent from its own worker.
pub struct ConnectivityMonitor {
    agent: Arc<Mutex<Box<dyn IceAgent>>>,
    latest: Arc<AtomicU8>,
}

impl ConnectivityMonitor {
    pub fn new(agent: Box<dyn IceAgent>) -> Self {
        let latest = Arc::new(AtomicU8::new(agent.connection_state().into()));
        Self {
            agent: Arc::new(Mutex::new(agent)),
            latest,
        }
    }

    pub(crate) fn agent(&self) -> &Arc<Mutex<Box<dyn IceAgent>>> {
        &self.agent
    }

    /// Latest state reported by the agent.
    pub fn state(&self) -> IceConnectionState {
        self.latest.load(Ordering::SeqCst).into()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_established()
    }

    /// Starts connectivity checks and a watcher thread translating agent state
    /// changes. Returns the receiver of [`ConnectivityEvent`]s and the watcher
    /// handle; the watcher exits once `shutdown` fires or the agent drops its
    /// side of the state channel.
    pub fn start(
        &self,
        socket: UdpSocket,
        shutdown: ShutdownSignal,
    ) -> Result<(Receiver<ConnectivityEvent>, JoinHandle<()>)> {
        let (state_tx, state_rx) = crossbeam_channel::unbounded();
        let (event_tx, event_rx) = crossbeam_channel::unbounded();

        {
            let mut agent = self.agent.lock()?;
            agent.start_connectivity_checks(socket, state_tx)?;
            self.latest
                .store(agent.connection_state().into(), Ordering::SeqCst);
        }

        let latest = Arc::clone(&self.latest);
        let handle = thread::Builder::new()
            .name("ice-state-watcher".to_owned())
            .spawn(move || watch_ice_state(state_rx, event_tx, latest, shutdown))?;

        Ok((event_rx, handle))
    }
}

fn watch_ice_state(
    state_rx: Receiver<IceConnectionState>,
    event_tx: Sender<ConnectivityEvent>,
    latest: Arc<AtomicU8>,
    shutdown: ShutdownSignal,
) {
    let mut connected_fired = false;
    let mut failed_fired = false;

    loop {
        let state = select! {
            recv(state_rx) -> msg => match msg {
                Ok(state) => state,
                Err(_) => {
                    debug!("ice agent closed its state channel");
                    return;
                }
            },
            recv(shutdown.receiver()) -> _ => {
                debug!("ice state watcher shutting down");
                return;
            }
        };

        let prev: IceConnectionState = latest.swap(state.into(), Ordering::SeqCst).into();
        info!("ice_state_change, old_state={prev}, new_state={state}");

        let event = if state.is_established() {
            if connected_fired {
                debug!("ignore repeated established notification {state}");
                continue;
            }
            connected_fired = true;
            ConnectivityEvent::Connected
        } else if state.is_failed() {
            if failed_fired {
                continue;
            }
            failed_fired = true;
            ConnectivityEvent::Failed(state)
        } else {
            continue;
        };

        if event_tx.send(event).is_err() {
            warn!("connectivity event {event:?} has no listener");
            return;
        }
    }
}
