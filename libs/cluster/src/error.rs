//! Cluster Error Types
//!
//! Failures of the codec, router and registration handshake. Link-level
//! failures arrive wrapped from [`network::TransportError`].

use crate::types::{ErrorCode, MessageTypeId, SystemId};
use network::TransportError;
use thiserror::Error;

/// Main cluster error type
#[derive(Error, Debug)]
pub enum ClusterError {
    /// No registry entry for the message's type id
    #[error("Message type {type_id} not registered")]
    MessageNotRegistered { type_id: MessageTypeId },

    /// The message has no wire type or its payload could not be encoded
    #[error("Message not serializable: {message}")]
    MessageNotSerializable { message: String },

    /// Every message of a batch failed to marshal
    #[error("No valid message to send")]
    NoValidMessage,

    /// The target member has no live link
    #[error("Peer {system_id} disconnected")]
    PeerDisconnected { system_id: SystemId },

    /// The target member is not part of the topology
    #[error("Unknown system {system_id}")]
    UnknownSystem { system_id: SystemId },

    /// Malformed or unexpected wire traffic
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Rejected registration handshake
    #[error("Registration rejected with code {code}")]
    RegistrationRejected { code: ErrorCode },

    /// Envelope kinds that never cross the wire
    #[error("Envelope {kind} cannot be sent to a remote system")]
    NotTransportable { kind: &'static str },

    /// Placement could not pick a system
    #[error("Routing error: {message}")]
    Routing { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] bincode::Error),
}

/// Result type alias for cluster operations
pub type Result<T> = std::result::Result<T, ClusterError>;

impl ClusterError {
    /// Create a not-serializable error
    pub fn not_serializable(message: impl Into<String>) -> Self {
        Self::MessageNotSerializable {
            message: message.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a routing error
    pub fn routing(message: impl Into<String>) -> Self {
        Self::Routing {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }

    /// Check if retrying the same operation later may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ClusterError::PeerDisconnected { .. } => true,
            ClusterError::RegistrationRejected { .. } => true,
            ClusterError::Transport(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            ClusterError::MessageNotRegistered { .. } => "message_not_registered",
            ClusterError::MessageNotSerializable { .. } => "message_not_serializable",
            ClusterError::NoValidMessage => "no_valid_message",
            ClusterError::PeerDisconnected { .. } => "peer_disconnected",
            ClusterError::UnknownSystem { .. } => "unknown_system",
            ClusterError::Protocol { .. } => "protocol",
            ClusterError::RegistrationRejected { .. } => "registration_rejected",
            ClusterError::NotTransportable { .. } => "not_transportable",
            ClusterError::Routing { .. } => "routing",
            ClusterError::Configuration { .. } => "configuration",
            ClusterError::Transport(_) => "transport",
            ClusterError::Serialization(_) => "serialization",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_keep_retry_semantics() {
        let err = ClusterError::from(TransportError::network("refused"));
        assert_eq!(err.category(), "transport");
        assert!(err.is_retryable());
        assert!(!ClusterError::NoValidMessage.is_retryable());
    }
}
