//! Outbound peer links.
//!
//! One lifecycle task per passive peer. It dials, registers, serves until
//! the link drops, then sleeps the reconnect interval and starts over. It
//! never gives up.

use super::{ClusterTransport, PeerInfo};
use crate::error::{ClusterError, Result};
use crate::protocol::{decode_package, encode_package, PackageType, RegisterSystemReq, RegisterSystemRsp};
use crate::types::{ErrorCode, SystemId};
use network::{open, ConnectionHandle, ConnectionHandler, Frame, TransportError};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Stage of an outbound link attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Dialing,
    Registering,
    AwaitingAck,
    Ready,
    Draining,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClientState::Dialing => "dialing",
            ClientState::Registering => "registering",
            ClientState::AwaitingAck => "awaiting_ack",
            ClientState::Ready => "ready",
            ClientState::Draining => "draining",
        };
        f.write_str(name)
    }
}

/// Dial-register-serve loop for one peer
pub struct ClientLifecycle {
    transport: Arc<ClusterTransport>,
    peer: Arc<PeerInfo>,
}

impl ClientLifecycle {
    pub fn new(transport: Arc<ClusterTransport>, peer: Arc<PeerInfo>) -> Self {
        Self { transport, peer }
    }

    pub async fn run(self) {
        let system_id = self.peer.system_id();
        loop {
            match self.establish().await {
                Ok((handle, disconnected)) => self.serve(handle, disconnected).await,
                // Peer not listening yet
                Err(ClusterError::Transport(e)) if e.is_transient() => debug!(
                    system_id = %system_id,
                    error = %e,
                    retry_in_ms = self.transport.timings().reconnect_interval_ms,
                    "Peer unreachable"
                ),
                Err(e) => warn!(
                    system_id = %system_id,
                    error = %e,
                    retry_in_ms = self.transport.timings().reconnect_interval_ms,
                    "Peer link attempt failed"
                ),
            }
            tokio::time::sleep(self.transport.timings().reconnect_interval()).await;
        }
    }

    /// Dial and register; returns the ready handle and its disconnect signal
    async fn establish(&self) -> Result<(ConnectionHandle, mpsc::Receiver<()>)> {
        let system_id = self.peer.system_id();
        let config = self.peer.config();

        self.trace(ClientState::Dialing);
        let (stream, peer_addr) = self.transport.connector().connect(&config.host, config.port).await?;

        let (disconnect_tx, mut disconnected) = mpsc::channel(1);
        let (register_tx, mut registered) = mpsc::channel(1);
        let (handle, driver) = open(stream, peer_addr, self.transport.frame_codec());
        driver.spawn(Arc::new(ClientConnection {
            transport: Arc::clone(&self.transport),
            system_id,
            disconnect_tx,
            register_tx,
        }));

        self.trace(ClientState::Registering);
        let request = encode_package(&RegisterSystemReq {
            system_id: self.transport.local_system_id(),
        })?;
        if let Err(e) = handle.send(u8::from(PackageType::RegisterSystemReq), &request) {
            handle.close();
            return Err(e.into());
        }

        self.trace(ClientState::AwaitingAck);
        let code = tokio::select! {
            code = registered.recv() => code,
            _ = disconnected.recv() => None,
        };

        match code {
            Some(code) if code.is_success() => {}
            Some(code) => {
                handle.close();
                return Err(ClusterError::RegistrationRejected { code });
            }
            None => return Err(ClusterError::PeerDisconnected { system_id }),
        }

        if !self.transport.install_client(system_id, handle.clone()) {
            handle.close();
            return Err(ClusterError::protocol(format!("peer {} already has a link", system_id)));
        }
        Ok((handle, disconnected))
    }

    async fn serve(&self, handle: ConnectionHandle, mut disconnected: mpsc::Receiver<()>) {
        let system_id = self.peer.system_id();
        self.trace(ClientState::Ready);
        info!(
            system_id = %system_id,
            peer = ?handle.peer_addr(),
            connected = self.transport.connected_count(),
            "Peer link up"
        );

        disconnected.recv().await;

        self.trace(ClientState::Draining);
        self.transport.clear_client(system_id, &handle);
        info!(
            system_id = %system_id,
            connected = self.transport.connected_count(),
            "Peer link down"
        );
    }

    fn trace(&self, state: ClientState) {
        debug!(system_id = %self.peer.system_id(), state = %state, "Client link state");
    }
}

/// Frame handler for an outbound link
struct ClientConnection {
    transport: Arc<ClusterTransport>,
    system_id: SystemId,
    disconnect_tx: mpsc::Sender<()>,
    register_tx: mpsc::Sender<ErrorCode>,
}

impl ConnectionHandler for ClientConnection {
    fn on_message(&self, _connection: &ConnectionHandle, frame: Frame) -> network::Result<()> {
        let package_type = PackageType::from_wire(frame.message_type)
            .map_err(|e| TransportError::protocol(e.to_string()))?;

        match package_type {
            PackageType::RegisterSystemRsp => {
                let code = match decode_package::<RegisterSystemRsp>(&frame.payload) {
                    Ok(rsp) => rsp.error_code,
                    Err(e) => {
                        warn!(system_id = %self.system_id, error = %e, "Malformed registration response");
                        ErrorCode::MALFORMED_REQUEST
                    }
                };
                if self.register_tx.try_send(code).is_err() {
                    debug!(system_id = %self.system_id, code = %code, "Ignoring late registration response");
                }
                Ok(())
            }
            PackageType::RegisterSystemReq => Err(TransportError::protocol(
                "registration request on an outbound link",
            )),
            package_type => {
                self.transport.deliver_inbound(package_type, &frame.payload);
                Ok(())
            }
        }
    }

    fn on_disconnect(&self, _connection: &ConnectionHandle) {
        let _ = self.disconnect_tx.try_send(());
    }
}
