//! Network Infrastructure
//!
//! Length-prefixed framed links between cluster peers: a frame codec, one
//! driver task per connection, TCP dialing and accepting, and a registry
//! of accepted sessions.

pub mod connection;
pub mod error;
pub mod framing;
pub mod session;
pub mod transports;

// Re-export commonly used types
pub use connection::{open, AsyncStream, BoxedStream, ConnectionDriver, ConnectionHandle, ConnectionHandler};
pub use error::{Result, TransportError};
pub use framing::{Frame, FrameCodec, DEFAULT_MAX_FRAME_SIZE, FRAME_HEADER_LEN};
pub use session::{Session, SessionId, SessionRegistry};
pub use transports::{Connector, TcpAcceptor, TcpConfig, TcpConnector};

// Constants for configuration
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 5;
