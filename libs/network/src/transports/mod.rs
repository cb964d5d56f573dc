//! Transport Layer
//!
//! Stream establishment for peer links. Framing and the per-connection task
//! live in [`crate::connection`]; this module only produces byte streams.

use crate::connection::BoxedStream;
use crate::Result;
use async_trait::async_trait;
use std::net::SocketAddr;

pub mod tcp;

#[cfg(test)]
mod tests;

pub use tcp::{TcpAcceptor, TcpConfig, TcpConnector};

/// Dials a peer and yields a connected stream
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, host: &str, port: u16) -> Result<(BoxedStream, Option<SocketAddr>)>;
}
