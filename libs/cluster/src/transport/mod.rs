//! Cluster Transport
//!
//! Owns the static topology and one link slot per peer. Members listed
//! before the local node are passive: this node dials them. Members listed
//! after it dial this node and are accepted as server sessions. Exactly one
//! link exists per pair.
//!
//! Every link, inbound or outbound, counts towards the connected count;
//! the local node counts itself once at start.

pub mod client;
pub mod server;

use crate::codec::EnvelopeCodec;
use crate::config::{ClusterConfig, ClusterTimings, SystemConfig};
use crate::envelope::Envelope;
use crate::error::{ClusterError, Result};
use crate::protocol::PackageType;
use crate::router::RemoteSender;
use crate::runtime::LocalRuntime;
use crate::types::{ErrorCode, SystemId};
use network::{ConnectionHandle, Connector, FrameCodec, Session, SessionRegistry, TcpAcceptor};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Current link to one peer
#[derive(Debug, Clone, Default)]
pub enum PeerLink {
    #[default]
    Disconnected,
    /// Outbound link dialed by this node
    Client(ConnectionHandle),
    /// Inbound link accepted by this node
    Session(Arc<Session<SystemId>>),
}

impl PeerLink {
    pub fn connection(&self) -> Option<&ConnectionHandle> {
        match self {
            PeerLink::Disconnected => None,
            PeerLink::Client(handle) => Some(handle),
            PeerLink::Session(session) => Some(session.connection()),
        }
    }

    pub fn is_connected(&self) -> bool {
        !matches!(self, PeerLink::Disconnected)
    }
}

/// Topology entry and link slot for one peer
#[derive(Debug)]
pub struct PeerInfo {
    config: SystemConfig,
    passive: bool,
    link: RwLock<PeerLink>,
}

impl PeerInfo {
    fn new(config: SystemConfig, passive: bool) -> Self {
        Self {
            config,
            passive,
            link: RwLock::new(PeerLink::Disconnected),
        }
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn system_id(&self) -> SystemId {
        self.config.system_id
    }

    /// Whether this node dials the peer
    pub fn is_passive(&self) -> bool {
        self.passive
    }

    pub fn link(&self) -> PeerLink {
        self.link.read().clone()
    }
}

/// Link manager for one cluster member
pub struct ClusterTransport {
    local_system_id: SystemId,
    local_index: usize,
    members: Vec<SystemConfig>,
    peers: HashMap<SystemId, Arc<PeerInfo>>,
    connected: AtomicUsize,
    started: AtomicBool,
    codec: EnvelopeCodec,
    frame_codec: FrameCodec,
    runtime: Arc<dyn LocalRuntime>,
    connector: Arc<dyn Connector>,
    sessions: SessionRegistry<SystemId>,
    timings: ClusterTimings,
}

impl ClusterTransport {
    pub fn new(
        config: &ClusterConfig,
        codec: EnvelopeCodec,
        runtime: Arc<dyn LocalRuntime>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        let local_index = config.local_index().ok_or_else(|| {
            ClusterError::configuration(
                format!("local system {} is not a cluster member", config.local_system_id),
                Some("local_system_id"),
            )
        })?;

        let peers = config
            .systems
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != local_index)
            .map(|(index, system)| {
                (
                    system.system_id,
                    Arc::new(PeerInfo::new(system.clone(), index < local_index)),
                )
            })
            .collect();

        Ok(Self {
            local_system_id: config.local_system_id,
            local_index,
            members: config.systems.clone(),
            peers,
            connected: AtomicUsize::new(0),
            started: AtomicBool::new(false),
            codec,
            frame_codec: FrameCodec::new(config.timings.max_frame_size),
            runtime,
            connector,
            sessions: SessionRegistry::new(),
            timings: config.timings.clone(),
        })
    }

    /// Bind the configured port if needed, then run until every member is linked
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let acceptor = match self.listen_addr() {
            Some(addr) => Some(TcpAcceptor::bind(addr).await?),
            None => None,
        };
        self.start_with_listener(acceptor).await
    }

    /// Start links using a pre-bound listener.
    ///
    /// Returns once the connected count reaches the member count. Peers
    /// that never come up keep this waiting.
    pub async fn start_with_listener(self: &Arc<Self>, acceptor: Option<TcpAcceptor>) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ClusterError::configuration("cluster transport already started", None));
        }

        info!(
            system_id = %self.local_system_id,
            members = self.members.len(),
            "Starting cluster transport"
        );
        self.connected.fetch_add(1, Ordering::SeqCst);

        match acceptor {
            Some(acceptor) if self.accepts_inbound() => {
                tokio::spawn(server::run_accept_loop(Arc::clone(self), acceptor));
            }
            Some(_) => {
                warn!(system_id = %self.local_system_id, "Last member accepts no links, dropping listener");
            }
            None if self.accepts_inbound() => {
                return Err(ClusterError::configuration(
                    "a listener is required for members that accept links",
                    Some("port"),
                ));
            }
            None => {}
        }

        for peer in self.passive_peers() {
            info!(system_id = %peer.system_id(), "Starting client link");
            tokio::spawn(client::ClientLifecycle::new(Arc::clone(self), peer).run());
        }

        loop {
            let connected = self.connected_count();
            if connected >= self.members.len() {
                break;
            }
            info!(connected, total = self.members.len(), "Waiting for cluster members");
            tokio::time::sleep(self.timings.startup_poll_interval()).await;
        }

        info!(system_id = %self.local_system_id, "Cluster transport started");
        Ok(())
    }

    /// Encode an envelope and queue it on the target's link
    pub fn send(&self, target: SystemId, envelope: &Envelope) -> Result<()> {
        let encoded = self.codec.encode(envelope)?;
        let peer = self
            .peers
            .get(&target)
            .ok_or(ClusterError::UnknownSystem { system_id: target })?;

        let link = peer.link.read();
        let connection = link
            .connection()
            .ok_or(ClusterError::PeerDisconnected { system_id: target })?;
        connection.send(u8::from(encoded.package_type), &encoded.payload)?;

        debug!(
            system_id = %target,
            kind = envelope.kind(),
            len = encoded.payload.len(),
            "Queued envelope"
        );
        Ok(())
    }

    /// Decode a non-handshake package and hand it to the local runtime
    pub fn deliver_inbound(&self, package_type: PackageType, payload: &[u8]) {
        match self.codec.decode(package_type, payload) {
            Ok(envelope) => self.runtime.local_route(envelope),
            Err(e) => error!(
                package_type = ?package_type,
                error = %e,
                category = e.category(),
                "Failed to decode inbound envelope"
            ),
        }
    }

    /// Attach an inbound session to the peer it registered as
    pub(crate) fn bind_session(
        &self,
        system_id: SystemId,
        session: &Arc<Session<SystemId>>,
    ) -> std::result::Result<(), ErrorCode> {
        let peer = self.peers.get(&system_id).ok_or(ErrorCode::UNKNOWN_SYSTEM)?;
        if peer.passive {
            return Err(ErrorCode::PASSIVE_SYSTEM);
        }

        {
            let mut link = peer.link.write();
            if link.is_connected() {
                return Err(ErrorCode::DUPLICATE_REGISTRATION);
            }
            session
                .bind(system_id)
                .map_err(|_| ErrorCode::DUPLICATE_REGISTRATION)?;
            *link = PeerLink::Session(Arc::clone(session));
        }

        self.connected.fetch_add(1, Ordering::SeqCst);
        info!(system_id = %system_id, session_id = session.id(), "Peer registered");
        Ok(())
    }

    /// Detach a closed session if it still owns the peer's link
    pub(crate) fn release_session(&self, system_id: SystemId, session: &Arc<Session<SystemId>>) {
        let Some(peer) = self.peers.get(&system_id) else {
            return;
        };

        let released = {
            let mut link = peer.link.write();
            match &*link {
                PeerLink::Session(current) if Arc::ptr_eq(current, session) => {
                    *link = PeerLink::Disconnected;
                    true
                }
                _ => false,
            }
        };

        if released {
            self.connected.fetch_sub(1, Ordering::SeqCst);
            info!(system_id = %system_id, session_id = session.id(), "Peer session closed");
        }
    }

    /// Install an outbound link after a successful registration
    pub(crate) fn install_client(&self, system_id: SystemId, handle: ConnectionHandle) -> bool {
        let Some(peer) = self.peers.get(&system_id) else {
            return false;
        };

        {
            let mut link = peer.link.write();
            if link.is_connected() {
                return false;
            }
            *link = PeerLink::Client(handle);
        }

        self.connected.fetch_add(1, Ordering::SeqCst);
        true
    }

    /// Clear an outbound link if it is still the installed one
    pub(crate) fn clear_client(&self, system_id: SystemId, handle: &ConnectionHandle) -> bool {
        let Some(peer) = self.peers.get(&system_id) else {
            return false;
        };

        let cleared = {
            let mut link = peer.link.write();
            match &*link {
                PeerLink::Client(current) if current.same_connection(handle) => {
                    *link = PeerLink::Disconnected;
                    true
                }
                _ => false,
            }
        };

        if cleared {
            self.connected.fetch_sub(1, Ordering::SeqCst);
        }
        cleared
    }

    pub fn local_system_id(&self) -> SystemId {
        self.local_system_id
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn connected_count(&self) -> usize {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self, system_id: SystemId) -> bool {
        if system_id == self.local_system_id {
            return true;
        }
        self.peers
            .get(&system_id)
            .is_some_and(|peer| peer.link.read().is_connected())
    }

    /// Whether any member dials this node
    pub fn accepts_inbound(&self) -> bool {
        self.local_index + 1 < self.members.len()
    }

    /// Configured host and port of the local member, if it listens
    pub fn listen_addr(&self) -> Option<(&str, u16)> {
        if !self.accepts_inbound() {
            return None;
        }
        let local = &self.members[self.local_index];
        Some((local.host.as_str(), local.port))
    }

    pub fn peer(&self, system_id: SystemId) -> Option<&Arc<PeerInfo>> {
        self.peers.get(&system_id)
    }

    /// Peers this node dials, in topology order
    pub fn passive_peers(&self) -> Vec<Arc<PeerInfo>> {
        self.members[..self.local_index]
            .iter()
            .filter_map(|m| self.peers.get(&m.system_id).cloned())
            .collect()
    }

    pub fn sessions(&self) -> &SessionRegistry<SystemId> {
        &self.sessions
    }

    pub fn timings(&self) -> &ClusterTimings {
        &self.timings
    }

    pub(crate) fn frame_codec(&self) -> FrameCodec {
        self.frame_codec
    }

    pub(crate) fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }
}

impl RemoteSender for ClusterTransport {
    fn send_remote(&self, target: SystemId, envelope: &Envelope) -> Result<()> {
        self.send(target, envelope)
    }
}

impl fmt::Debug for ClusterTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterTransport")
            .field("local_system_id", &self.local_system_id)
            .field("local_index", &self.local_index)
            .field("members", &self.members.len())
            .field("connected", &self.connected_count())
            .finish()
    }
}
