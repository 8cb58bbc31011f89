pub mod description;
mod pipeline;

use std::collections::HashMap;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{select, Receiver};
use log::{debug, info, warn};

use crate::config::TransportConfig;
use crate::dtls::fingerprint::{fingerprints_by_algorithm, RTCDtlsFingerprint};
use crate::dtls::{DtlsEngine, SecureTransport, CONNECTION_ROLE_ACTPASS};
use crate::error::{flatten_errs, Error, Result};
use crate::ice::monitor::{ConnectivityEvent, ConnectivityMonitor};
use crate::ice::rand::generate_cand_id;
use crate::ice::IceAgent;
use crate::module::muxer::Muxer;
use crate::shutdown::{shutdown_channel, ShutdownSignal, ShutdownTrigger};
use crate::socket::{bind_udp_in_range, spawn_receive_loop};
use crate::state::{ConnectionState, SessionState, TransportEvent};
use description::{RTCTransportDescription, RemoteTransportParameters};
use pipeline::build_pipelines;

/// TransportManager drives one session from connectivity negotiation to an
/// established secure transport over a single UDP socket.
///
/// The socket is bound at construction so that [`describe`](Self::describe)
/// can advertise it before negotiation starts. Once the ICE agent reports an
/// established pair the manager builds the packet pipelines, starts the
/// receive loop and runs the DTLS handshake on its own thread.
///
/// Dropping the manager closes it.
pub struct TransportManager {
    internal: Arc<TransportInternal>,
    shutdown: Mutex<ShutdownTrigger>,
    orchestrator: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

struct TransportInternal {
    config: TransportConfig,
    session: Arc<SessionState>,
    monitor: ConnectivityMonitor,
    local_addr: SocketAddr,
    local_fingerprint: RTCDtlsFingerprint,
    shutdown: ShutdownSignal,
    started: AtomicBool,

    socket: Mutex<Option<UdpSocket>>,
    dtls_engine: Mutex<Option<Box<dyn DtlsEngine>>>,
    outgoing: Mutex<Option<Muxer>>,
    secure_transport: Mutex<Option<Arc<dyn SecureTransport>>>,
    candidate_ids: Mutex<HashMap<String, String>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl TransportManager {
    /// Binds the session socket and takes ownership of the collaborators.
    pub fn new(
        config: TransportConfig,
        ice_agent: Box<dyn IceAgent>,
        dtls_engine: Box<dyn DtlsEngine>,
    ) -> Result<Self> {
        let socket = bind_udp_in_range(config.local_ip(), config.port_range)?;
        let local_addr = socket.local_addr()?;
        let local_fingerprint = dtls_engine.local_fingerprint();
        let (trigger, shutdown) = shutdown_channel();

        debug!("transport manager bound to {local_addr}");

        Ok(Self {
            internal: Arc::new(TransportInternal {
                config,
                session: Arc::new(SessionState::new()),
                monitor: ConnectivityMonitor::new(ice_agent),
                local_addr,
                local_fingerprint,
                shutdown,
                started: AtomicBool::new(false),
                socket: Mutex::new(Some(socket)),
                dtls_engine: Mutex::new(Some(dtls_engine)),
                outgoing: Mutex::new(None),
                secure_transport: Mutex::new(None),
                candidate_ids: Mutex::new(HashMap::new()),
                threads: Mutex::new(vec![]),
            }),
            shutdown: Mutex::new(trigger),
            orchestrator: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    /// Hands the remote parameters to the collaborators and starts
    /// connectivity checks. May be called once per session.
    pub fn start_connectivity_establishment(
        &self,
        params: RemoteTransportParameters,
    ) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ErrTransportClosed);
        }
        params.validate_credentials()?;
        let remote_fingerprints = fingerprints_by_algorithm(&params.fingerprints)?;

        if self.internal.started.swap(true, Ordering::SeqCst) {
            return Err(Error::ErrConnectivityAlreadyStarted);
        }

        let result = self.start(params, remote_fingerprints);
        if let Err(err) = &result {
            self.internal
                .session
                .fail(format!("failed to start connectivity establishment: {err}"));
        }
        result
    }

    fn start(
        &self,
        params: RemoteTransportParameters,
        remote_fingerprints: HashMap<String, String>,
    ) -> Result<()> {
        let internal = &self.internal;

        {
            let mut dtls_engine = internal.dtls_engine.lock()?;
            let engine = dtls_engine.as_mut().ok_or(Error::ErrDtlsEngineConsumed)?;
            engine.set_remote_fingerprints(remote_fingerprints)?;
        }

        {
            let mut agent = internal.monitor.agent().lock()?;
            if let Some(ufrag) = &params.ufrag {
                agent.set_remote_ufrag(ufrag)?;
            }
            if let Some(pwd) = &params.pwd {
                agent.set_remote_pwd(pwd)?;
            }
            for candidate in &params.candidates {
                agent.add_remote_candidate(candidate)?;
            }
        }

        let agent_socket = match internal.socket.lock()?.as_ref() {
            Some(socket) => socket.try_clone()?,
            None => return Err(Error::ErrTransportClosed),
        };

        internal.session.transition(ConnectionState::Negotiating)?;

        let (events, watcher) = internal
            .monitor
            .start(agent_socket, internal.shutdown.clone())?;
        internal.threads.lock()?.push(watcher);

        let orchestrator_internal = Arc::clone(internal);
        let handle = thread::Builder::new()
            .name("transport-orchestrator".to_owned())
            .spawn(move || orchestrator_internal.run(events))?;
        *self.orchestrator.lock()? = Some(handle);

        info!(
            "started connectivity establishment on {} with {} remote candidate(s)",
            internal.local_addr,
            params.candidates.len()
        );
        Ok(())
    }

    /// Whether the secure transport is established.
    pub fn is_connected(&self) -> bool {
        self.internal.session.get() == ConnectionState::Established
    }

    /// Whether the UDP path is usable, secured or not.
    pub fn is_ice_connected(&self) -> bool {
        self.internal.session.get().is_ice_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.internal.session.get()
    }

    /// Receiver of every state change and failure of the session.
    pub fn events(&self) -> Receiver<TransportEvent> {
        self.internal.session.events()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.internal.local_addr
    }

    /// Secure transport produced by the handshake, once established. Cleared
    /// by [`close`](Self::close).
    pub fn secure_transport(&self) -> Option<Arc<dyn SecureTransport>> {
        match self.internal.secure_transport.lock() {
            Ok(secure_transport) => secure_transport.clone(),
            Err(_) => None,
        }
    }

    /// Current local parameters for the outbound signaling payload. Reads the
    /// agent on every call, so candidates gathered later are included.
    pub fn describe(&self) -> Result<RTCTransportDescription> {
        let internal = &self.internal;
        let (ice_parameters, mut candidates) = {
            let agent = internal.monitor.agent().lock()?;
            (agent.local_parameters(), agent.local_candidates())
        };

        let mut candidate_ids = internal.candidate_ids.lock()?;
        for candidate in candidates.iter_mut().filter(|c| c.id.is_empty()) {
            candidate.id = candidate_ids
                .entry(candidate.to_string())
                .or_insert_with(generate_cand_id)
                .clone();
        }

        Ok(RTCTransportDescription {
            ice_parameters,
            candidates,
            fingerprint: internal.local_fingerprint.clone(),
            setup: CONNECTION_ROLE_ACTPASS.to_owned(),
            rtcp_mux: true,
        })
    }

    /// Stops every background thread, aborts an in-flight handshake and
    /// releases the socket. Calling close again is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let internal = &self.internal;
        let mut close_errs: Vec<Error> = vec![];

        match self.shutdown.lock() {
            Ok(mut trigger) => trigger.trigger(),
            Err(err) => close_errs.push(err.into()),
        }

        match internal.monitor.agent().lock() {
            Ok(mut agent) => {
                if let Err(err) = agent.close() {
                    close_errs.push(err);
                }
            }
            Err(err) => close_errs.push(err.into()),
        }

        // The orchestrator may still register threads, so it is joined first.
        match self.orchestrator.lock() {
            Ok(mut orchestrator) => {
                if let Some(handle) = orchestrator.take() {
                    if handle.join().is_err() {
                        close_errs.push(Error::Other("orchestrator thread panicked".to_owned()));
                    }
                }
            }
            Err(err) => close_errs.push(err.into()),
        }

        let threads = match internal.threads.lock() {
            Ok(mut threads) => threads.drain(..).collect(),
            Err(err) => {
                close_errs.push(err.into());
                vec![]
            }
        };
        for handle in threads {
            let name = handle.thread().name().unwrap_or("unnamed").to_owned();
            if handle.join().is_err() {
                close_errs.push(Error::Other(format!("{name} thread panicked")));
            }
        }

        // The handshake engine may keep its transport inside the secure
        // transport, and callers may still hold that. Closing the muxer drops
        // the socket writer regardless of who holds an input.
        match internal.outgoing.lock() {
            Ok(mut outgoing) => {
                if let Some(muxer) = outgoing.take() {
                    if let Err(err) = muxer.close() {
                        close_errs.push(err);
                    }
                }
            }
            Err(err) => close_errs.push(err.into()),
        }
        match internal.secure_transport.lock() {
            Ok(mut secure_transport) => {
                secure_transport.take();
            }
            Err(err) => close_errs.push(err.into()),
        }
        match internal.socket.lock() {
            Ok(mut socket) => {
                socket.take();
            }
            Err(err) => close_errs.push(err.into()),
        }

        let _ = internal.session.transition(ConnectionState::Closed);
        info!("transport manager on {} closed", internal.local_addr);

        flatten_errs(close_errs)
    }
}

impl Drop for TransportManager {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("failed to close transport manager: {err}");
        }
    }
}

impl TransportInternal {
    fn run(self: Arc<Self>, events: Receiver<ConnectivityEvent>) {
        loop {
            let event = select! {
                recv(events) -> msg => match msg {
                    Ok(event) => event,
                    Err(_) => break,
                },
                recv(self.shutdown.receiver()) -> _ => break,
            };

            match event {
                ConnectivityEvent::Connected => {
                    if let Err(err) = self.on_ice_connected() {
                        if self.shutdown.is_shutdown() {
                            debug!("abandon secure transport setup on shutdown: {err}");
                        } else {
                            self.session
                                .fail(format!("failed to set up secure transport: {err}"));
                        }
                    }
                }
                ConnectivityEvent::Failed(state) => {
                    self.session.fail(format!("ice connection {state}"));
                }
            }
        }
        debug!("transport orchestrator exited");
    }

    /// Builds the pipelines and launches the receive loop and the handshake.
    fn on_ice_connected(self: &Arc<Self>) -> Result<()> {
        self.session.transition(ConnectionState::Connected)?;

        let (remote, controlling) = {
            let agent = self.monitor.agent().lock()?;
            (agent.selected_remote_addr(), agent.is_controlling())
        };
        let remote = remote.ok_or(Error::ErrNoCandidatePairs)?;
        let role = self.config.resolve_dtls_role(controlling);
        info!("ice connected to {remote}, starting dtls handshake as {role}");

        let socket = self.socket.lock()?.take().ok_or(Error::ErrTransportClosed)?;
        let mut engine = self
            .dtls_engine
            .lock()?
            .take()
            .ok_or(Error::ErrDtlsEngineConsumed)?;

        let pipelines = build_pipelines(
            &socket,
            remote,
            self.config.receive_queue_capacity(),
            Arc::clone(&self.session),
            self.shutdown.clone(),
        )?;
        *self.outgoing.lock()? = Some(pipelines.outgoing);

        let receiver = spawn_receive_loop(
            socket,
            pipelines.incoming,
            self.config.socket_read_timeout(),
            self.shutdown.clone(),
            Arc::clone(&self.session),
        )?;
        self.threads.lock()?.push(receiver);

        self.session.transition(ConnectionState::HandshakeInProgress)?;

        let internal = Arc::clone(self);
        let dtls_transport = pipelines.dtls_transport;
        let handshake = thread::Builder::new()
            .name("dtls-handshake".to_owned())
            .spawn(move || {
                let result = engine.handshake(role, Box::new(dtls_transport));
                internal.on_handshake_done(result);
            })?;
        self.threads.lock()?.push(handshake);

        Ok(())
    }

    fn on_handshake_done(&self, result: Result<Arc<dyn SecureTransport>>) {
        match result {
            Ok(secure_transport) => {
                match self.secure_transport.lock() {
                    Ok(mut slot) => *slot = Some(secure_transport),
                    Err(err) => {
                        self.session.fail(err.to_string());
                        return;
                    }
                }
                match self.session.transition(ConnectionState::Established) {
                    Ok(_) => info!("dtls handshake with remote completed"),
                    Err(err) => debug!("handshake completed too late: {err}"),
                }
            }
            Err(err) if self.shutdown.is_shutdown() => {
                debug!("dtls handshake aborted by shutdown: {err}");
            }
            Err(err) => {
                self.session.fail(format!("dtls handshake failed: {err}"));
            }
        }
    }
}
