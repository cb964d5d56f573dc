//! Wire Protocol Packages
//!
//! Every frame on a cluster link carries one package, serialized with
//! bincode, tagged by a [`PackageType`] byte. Two packages form the
//! registration handshake; the rest mirror the remotely deliverable
//! envelope kinds.

use crate::error::{ClusterError, Result};
use crate::types::{ActorRef, ActorType, ErrorCode, GroupSlot, NotifyType, SystemId, WatchType};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Frame type byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum PackageType {
    RegisterSystemReq = 1,
    RegisterSystemRsp = 2,
    EnvelopeSend = 10,
    EnvelopeBatchSend = 11,
    EnvelopeRequest = 12,
    EnvelopeResponse = 13,
    EnvelopeRequestAsync = 14,
    EnvelopeResponseAsync = 15,
    EnvelopeWatch = 16,
    EnvelopeNotify = 17,
    EnvelopeFireNotify = 18,
}

impl PackageType {
    pub fn is_handshake(self) -> bool {
        matches!(self, PackageType::RegisterSystemReq | PackageType::RegisterSystemRsp)
    }

    /// Parse a frame type byte, rejecting unknown ids
    pub fn from_wire(byte: u8) -> Result<Self> {
        PackageType::try_from(byte)
            .map_err(|_| ClusterError::protocol(format!("unknown package type {}", byte)))
    }
}

/// Serialize a package body
pub fn encode_package<T: Serialize>(package: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(package)?)
}

/// Deserialize a package body
pub fn decode_package<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes)?)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterSystemReq {
    pub system_id: SystemId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterSystemRsp {
    pub error_code: ErrorCode,
}

/// Actor reference as it travels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireActorRef {
    pub system_id: SystemId,
    pub group_slot: GroupSlot,
    pub actor_type: ActorType,
    pub actor_id: String,
}

impl From<&ActorRef> for WireActorRef {
    fn from(r: &ActorRef) -> Self {
        Self {
            system_id: r.system_id,
            group_slot: r.group_slot,
            actor_type: r.actor_type,
            actor_id: r.actor_id.as_str().to_string(),
        }
    }
}

impl From<WireActorRef> for ActorRef {
    fn from(w: WireActorRef) -> Self {
        ActorRef::new(w.system_id, w.actor_type, w.actor_id, w.group_slot)
    }
}

/// Application message: type id plus `[type id u32 BE][payload]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub message_type: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireResponse {
    pub error_code: ErrorCode,
    pub message: Option<WireMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendPackage {
    pub from: Option<WireActorRef>,
    pub to: WireActorRef,
    pub message: WireMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSendPackage {
    pub from: Option<WireActorRef>,
    pub to: Vec<WireActorRef>,
    pub messages: Vec<WireMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPackage {
    pub from: Option<WireActorRef>,
    pub to: WireActorRef,
    pub message: WireMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponsePackage {
    pub from: Option<WireActorRef>,
    pub to: WireActorRef,
    pub response: WireResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestAsyncPackage {
    pub from: Option<WireActorRef>,
    pub to: WireActorRef,
    pub message: WireMessage,
    pub callback_id: u32,
    pub callback_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseAsyncPackage {
    pub from: Option<WireActorRef>,
    pub to: WireActorRef,
    pub response: WireResponse,
    pub callback_id: u32,
    pub callback_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchPackage {
    pub from: Option<WireActorRef>,
    pub to: WireActorRef,
    pub watch_type: WatchType,
    pub is_watch: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyPackage {
    pub from: Option<WireActorRef>,
    pub to: Vec<WireActorRef>,
    pub notify_type: NotifyType,
    pub subject: WireActorRef,
    pub watch_type: WatchType,
    pub message: WireMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FireNotifyPackage {
    pub from: Option<WireActorRef>,
    pub to: WireActorRef,
    pub notify_type: NotifyType,
    pub watch_type: WatchType,
    pub message: WireMessage,
}
