//! Core Identifiers
//!
//! Strongly typed ids shared by every cluster component: member systems,
//! actor types, actor references and the small numeric tags carried by
//! watch and message traffic.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Cluster member identifier. `0` means "no explicit system".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SystemId(pub u32);

impl SystemId {
    pub const NONE: SystemId = SystemId(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Actor type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorType(pub u32);

impl ActorType {
    /// First id past the local runtime's built-in actor types
    pub const RUNTIME_START: ActorType = ActorType(100);
    /// Cluster request proxy
    pub const REQUEST_PROXY: ActorType = ActorType(Self::RUNTIME_START.0 + 1);
    /// Cluster watch proxy
    pub const WATCH_PROXY: ActorType = ActorType(Self::RUNTIME_START.0 + 2);
    /// Lowest id an application may register
    pub const USER_START: ActorType = ActorType(Self::RUNTIME_START.0 + 10);

    pub fn is_reserved(self) -> bool {
        self < Self::USER_START
    }
}

impl fmt::Display for ActorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Actor identifier within its type
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(Arc<str>);

impl ActorId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl From<&str> for ActorId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ActorId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shard slot within a system; never 0 once placed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupSlot(pub u32);

/// Watch category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatchType(pub u32);

/// Notification category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotifyType(pub u32);

/// Application message type id, used as the registry key and wire tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageTypeId(pub u32);

impl fmt::Display for MessageTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Location-transparent actor address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActorRef {
    pub system_id: SystemId,
    pub actor_type: ActorType,
    pub actor_id: ActorId,
    pub group_slot: GroupSlot,
}

impl ActorRef {
    pub fn new(
        system_id: SystemId,
        actor_type: ActorType,
        actor_id: impl Into<ActorId>,
        group_slot: GroupSlot,
    ) -> Self {
        Self {
            system_id,
            actor_type,
            actor_id: actor_id.into(),
            group_slot,
        }
    }
}

impl fmt::Display for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}:{}#{}",
            self.system_id, self.actor_type, self.actor_id, self.group_slot.0
        )
    }
}

/// Numeric error code carried in responses and handshake replies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(pub i32);

impl ErrorCode {
    pub const SUCCESS: ErrorCode = ErrorCode(0);
    /// Any error without a dedicated code
    pub const NORMAL: ErrorCode = ErrorCode(1);
    /// Registration from a system missing from the topology
    pub const UNKNOWN_SYSTEM: ErrorCode = ErrorCode(2);
    /// Registration from a system this node dials itself
    pub const PASSIVE_SYSTEM: ErrorCode = ErrorCode(3);
    /// Registration while the system already holds a link
    pub const DUPLICATE_REGISTRATION: ErrorCode = ErrorCode(4);
    /// Undecodable registration request
    pub const MALFORMED_REQUEST: ErrorCode = ErrorCode(5);
    /// Base for cluster and application defined codes
    pub const CUSTOM_START: ErrorCode = ErrorCode(1000);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
