//! Application Messages
//!
//! Actor payloads are shared trait objects. A message that may cross node
//! boundaries reports a [`MessageTypeId`] and is registered once per node
//! in a [`MessageRegistry`], which owns the bincode (de)serializers.

use crate::error::{ClusterError, Result};
use crate::protocol::WireMessage;
use crate::types::MessageTypeId;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::error;

/// Upcast to `Any` for downcasting shared messages
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Any payload an actor can receive
pub trait Message: AsAny + fmt::Debug + Send + Sync {
    /// Wire type id; `None` marks a local-only message
    fn message_type(&self) -> Option<MessageTypeId> {
        None
    }
}

/// Shared, immutable message
pub type AnyMessage = Arc<dyn Message>;

impl dyn Message + '_ {
    pub fn downcast_ref<T: Message + 'static>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn is<T: Message + 'static>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

/// Length of the type id prefix inside `WireMessage::data`
pub const MESSAGE_TYPE_PREFIX_LEN: usize = 4;

type EncodeFn = fn(&dyn Message) -> Result<Vec<u8>>;
type DecodeFn = fn(&[u8]) -> Result<AnyMessage>;

#[derive(Clone, Copy)]
struct Registration {
    type_name: &'static str,
    encode: EncodeFn,
    decode: DecodeFn,
}

/// Node-local table of wire-capable message types
#[derive(Default)]
pub struct MessageRegistry {
    entries: RwLock<HashMap<MessageTypeId, Registration>>,
}

impl MessageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under `type_id`, replacing any previous entry
    pub fn register<T>(&self, type_id: MessageTypeId)
    where
        T: Message + Serialize + DeserializeOwned + 'static,
    {
        let registration = Registration {
            type_name: std::any::type_name::<T>(),
            encode: encode_as::<T>,
            decode: decode_as::<T>,
        };
        if let Some(previous) = self.entries.write().insert(type_id, registration) {
            tracing::warn!(
                type_id = type_id.0,
                previous = previous.type_name,
                "Message type id re-registered"
            );
        }
    }

    pub fn is_registered(&self, type_id: MessageTypeId) -> bool {
        self.entries.read().contains_key(&type_id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encode a message for the wire
    pub fn marshal(&self, message: &dyn Message) -> Result<WireMessage> {
        let type_id = message.message_type().ok_or_else(|| {
            error!(payload = ?message, "Message has no wire type");
            ClusterError::not_serializable(format!("{:?} has no wire type", message))
        })?;

        let registration = self.lookup(type_id)?;
        let payload = (registration.encode)(message)?;

        let mut data = Vec::with_capacity(MESSAGE_TYPE_PREFIX_LEN + payload.len());
        data.extend_from_slice(&type_id.0.to_be_bytes());
        data.extend_from_slice(&payload);
        Ok(WireMessage {
            message_type: type_id.0,
            data,
        })
    }

    /// Decode a wire message using the entry for `wire.message_type`
    pub fn unmarshal(&self, wire: &WireMessage) -> Result<AnyMessage> {
        if wire.data.len() < MESSAGE_TYPE_PREFIX_LEN {
            return Err(ClusterError::protocol(format!(
                "message data of {} bytes is shorter than its type prefix",
                wire.data.len()
            )));
        }
        let registration = self.lookup(MessageTypeId(wire.message_type))?;
        (registration.decode)(&wire.data[MESSAGE_TYPE_PREFIX_LEN..])
    }

    fn lookup(&self, type_id: MessageTypeId) -> Result<Registration> {
        self.entries.read().get(&type_id).copied().ok_or_else(|| {
            error!(type_id = type_id.0, "Message type not registered");
            ClusterError::MessageNotRegistered { type_id }
        })
    }
}

impl fmt::Debug for MessageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.read();
        let mut names: Vec<_> = entries.iter().map(|(id, r)| (id.0, r.type_name)).collect();
        names.sort_unstable();
        f.debug_struct("MessageRegistry").field("entries", &names).finish()
    }
}

fn encode_as<T: Message + Serialize + 'static>(message: &dyn Message) -> Result<Vec<u8>> {
    let typed = message.downcast_ref::<T>().ok_or_else(|| {
        ClusterError::not_serializable(format!(
            "{:?} is registered as {}",
            message,
            std::any::type_name::<T>()
        ))
    })?;
    Ok(bincode::serialize(typed)?)
}

fn decode_as<T: Message + DeserializeOwned + 'static>(bytes: &[u8]) -> Result<AnyMessage> {
    let typed: T = bincode::deserialize(bytes)?;
    Ok(Arc::new(typed))
}
