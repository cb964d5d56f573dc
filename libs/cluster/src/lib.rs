//! Cluster Layer
//!
//! Joins independent actor-system processes into one addressable space:
//! peer links over a static topology, envelope transport, placement-aware
//! routing, and the proxy actors that carry watch and request traffic
//! across node boundaries.
//!
//! The single-node runtime is external; it plugs in through the traits in
//! [`runtime`].

pub mod codec;
pub mod config;
pub mod envelope;
pub mod error;
pub mod message;
pub mod placement;
pub mod protocol;
pub mod proxy;
pub mod router;
pub mod runtime;
pub mod system;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;

pub use codec::{EncodedEnvelope, EnvelopeCodec};
pub use config::{ClusterConfig, ClusterTimings, SystemConfig};
pub use envelope::{
    ActorError, Envelope, EventNotification, ReplySender, Response, WatchNotification, WatchQueue,
};
pub use error::{ClusterError, Result};
pub use message::{AnyMessage, Message, MessageRegistry};
pub use placement::{actor_id_hash, Placement};
pub use protocol::PackageType;
pub use proxy::{ProxyDirectory, ProxyKey, RequestProxy, WatchProxy};
pub use router::{RemoteSender, Router};
pub use runtime::{Actor, ActorContext, ActorFactory, EnvelopeRouter, LocalRuntime, RequestCallback};
pub use system::ClusterSystem;
pub use transport::{ClusterTransport, PeerInfo, PeerLink};
pub use types::{
    ActorId, ActorRef, ActorType, ErrorCode, GroupSlot, MessageTypeId, NotifyType, SystemId, WatchType,
};
