//! TCP Transport
//!
//! Outbound dialing with a connect timeout and inbound accepting for peer
//! links. Both sides disable Nagle so small control frames go out at once.

use super::Connector;
use crate::connection::BoxedStream;
use crate::{Result, TransportError};
use async_trait::async_trait;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// TCP link configuration
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Disable Nagle's algorithm
    pub nodelay: bool,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(crate::DEFAULT_CONNECTION_TIMEOUT_SECS),
            nodelay: true,
        }
    }
}

/// Dials peers over TCP
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    config: TcpConfig,
}

impl TcpConnector {
    pub fn new(config: TcpConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TcpConfig {
        &self.config
    }

    /// Connect and return the concrete stream
    pub async fn connect_stream(&self, host: &str, port: u16) -> Result<TcpStream> {
        debug!(host, port, "Connecting to TCP peer");

        let stream = connect_within(
            self.config.connect_timeout,
            host,
            port,
            TcpStream::connect((host, port)),
        )
        .await?;

        if self.config.nodelay {
            if let Err(e) = stream.set_nodelay(true) {
                warn!("Failed to set TCP_NODELAY: {}", e);
            }
        }

        Ok(stream)
    }
}

/// Bound a pending dial by `limit`
pub(crate) async fn connect_within<T>(
    limit: Duration,
    host: &str,
    port: u16,
    connecting: impl Future<Output = std::io::Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, connecting)
        .await
        .map_err(|_| TransportError::timeout("TCP connect", limit.as_millis() as u64))?
        .map_err(|e| TransportError::network_with_source(format!("Failed to connect to {}:{}", host, port), e))
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<(BoxedStream, Option<SocketAddr>)> {
        let stream = self.connect_stream(host, port).await?;
        let peer_addr = stream.peer_addr().ok();
        info!(peer = ?peer_addr, "Connected to TCP peer at {}:{}", host, port);
        Ok((Box::new(stream), peer_addr))
    }
}

/// Accepts inbound peer links
#[derive(Debug)]
pub struct TcpAcceptor {
    listener: TcpListener,
    nodelay: bool,
}

impl TcpAcceptor {
    /// Bind a listener on `addr`
    pub async fn bind(addr: impl tokio::net::ToSocketAddrs) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::network_with_source("Failed to bind TCP listener", e))?;
        Ok(Self::from_listener(listener))
    }

    /// Wrap an already bound listener
    pub fn from_listener(listener: TcpListener) -> Self {
        Self {
            listener,
            nodelay: true,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| TransportError::network_with_source("Failed to read listener address", e))
    }

    /// Wait for the next inbound connection
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        let (stream, peer_addr) = self
            .listener
            .accept()
            .await
            .map_err(|e| TransportError::network_with_source("Failed to accept TCP connection", e))?;

        if self.nodelay {
            if let Err(e) = stream.set_nodelay(true) {
                warn!("Failed to set TCP_NODELAY: {}", e);
            }
        }

        debug!(peer = %peer_addr, "Accepted TCP connection");
        Ok((stream, peer_addr))
    }
}
