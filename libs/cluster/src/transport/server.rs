//! Inbound peer links.
//!
//! Every accepted connection becomes a session. A session carries no
//! application traffic until its peer registers; rejected registrations get
//! a failure code and the connection is closed.

use super::ClusterTransport;
use crate::protocol::{decode_package, encode_package, PackageType, RegisterSystemReq, RegisterSystemRsp};
use crate::types::{ErrorCode, SystemId};
use network::{open, AsyncStream, ConnectionHandle, ConnectionHandler, Frame, Session, TcpAcceptor, TransportError};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub(crate) async fn run_accept_loop(transport: Arc<ClusterTransport>, acceptor: TcpAcceptor) {
    match acceptor.local_addr() {
        Ok(addr) => info!(system_id = %transport.local_system_id(), addr = %addr, "Cluster server listening"),
        Err(e) => warn!(error = %e, "Cluster server listening on unknown address"),
    }

    loop {
        match acceptor.accept().await {
            Ok((stream, peer_addr)) => {
                accept_session(&transport, stream, Some(peer_addr));
            }
            Err(e) => {
                warn!(error = %e, "Accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

/// Wrap an accepted stream into a registered session and start its driver
pub fn accept_session<S: AsyncStream>(
    transport: &Arc<ClusterTransport>,
    stream: S,
    peer_addr: Option<SocketAddr>,
) -> Arc<Session<SystemId>> {
    let (handle, driver) = open(stream, peer_addr, transport.frame_codec());
    let session = transport.sessions().create(handle);
    debug!(session_id = session.id(), peer = ?peer_addr, "Session opened");
    driver.spawn(Arc::new(ServerConnection {
        transport: Arc::clone(transport),
        session: Arc::clone(&session),
    }));
    session
}

/// Frame handler for an inbound link
struct ServerConnection {
    transport: Arc<ClusterTransport>,
    session: Arc<Session<SystemId>>,
}

impl ServerConnection {
    fn register(&self, connection: &ConnectionHandle, payload: &[u8]) -> network::Result<()> {
        let outcome = match decode_package::<RegisterSystemReq>(payload) {
            Err(e) => {
                warn!(session_id = self.session.id(), error = %e, "Malformed registration request");
                Err(ErrorCode::MALFORMED_REQUEST)
            }
            Ok(request) if self.session.is_bound() => {
                warn!(
                    session_id = self.session.id(),
                    system_id = %request.system_id,
                    "Repeated registration on a bound session"
                );
                Err(ErrorCode::DUPLICATE_REGISTRATION)
            }
            Ok(request) => self.transport.bind_session(request.system_id, &self.session),
        };

        let code = outcome.err().unwrap_or(ErrorCode::SUCCESS);
        let reply = encode_package(&RegisterSystemRsp { error_code: code })
            .map_err(|e| TransportError::protocol(e.to_string()))?;
        connection.send(u8::from(PackageType::RegisterSystemRsp), &reply)?;

        if code.is_success() {
            Ok(())
        } else {
            warn!(
                session_id = self.session.id(),
                peer = ?connection.peer_addr(),
                code = %code,
                "Registration rejected"
            );
            Err(TransportError::protocol(format!("registration rejected with code {}", code)))
        }
    }
}

impl ConnectionHandler for ServerConnection {
    fn on_message(&self, connection: &ConnectionHandle, frame: Frame) -> network::Result<()> {
        let package_type = PackageType::from_wire(frame.message_type)
            .map_err(|e| TransportError::protocol(e.to_string()))?;

        match package_type {
            PackageType::RegisterSystemReq => self.register(connection, &frame.payload),
            PackageType::RegisterSystemRsp => Err(TransportError::protocol(
                "registration response on an inbound link",
            )),
            package_type if !self.session.is_bound() => {
                warn!(
                    session_id = self.session.id(),
                    package_type = ?package_type,
                    "Traffic before registration"
                );
                Err(TransportError::protocol("traffic before registration"))
            }
            package_type => {
                self.transport.deliver_inbound(package_type, &frame.payload);
                Ok(())
            }
        }
    }

    fn on_disconnect(&self, _connection: &ConnectionHandle) {
        if let Some(system_id) = self.session.unbind() {
            self.transport.release_session(system_id, &self.session);
        }
        self.transport.sessions().remove(self.session.id());
        debug!(session_id = self.session.id(), "Session closed");
    }
}
