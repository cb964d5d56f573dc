//! Proxy Actors
//!
//! Watch and request traffic that targets another node is handed to a
//! local proxy actor, which speaks the ordinary remote protocol on the
//! caller's behalf. A proxy's actor id is the canonical text of the
//! [`ProxyKey`] naming its remote target, so the same target always maps to
//! the same proxy.

use crate::envelope::{ReplySender, WatchQueue};
use crate::error::{ClusterError, Result};
use crate::message::{AnyMessage, Message};
use crate::placement::Placement;
use crate::types::{ActorId, ActorRef, ActorType, SystemId, WatchType};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub mod request;
pub mod watch;

pub use request::RequestProxy;
pub use watch::WatchProxy;

/// Remote target a proxy stands in for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyKey {
    pub actor_type: ActorType,
    pub actor_id: ActorId,
}

impl ProxyKey {
    pub fn for_target(target: &ActorRef) -> Self {
        Self {
            actor_type: target.actor_type,
            actor_id: target.actor_id.clone(),
        }
    }

    /// Actor id of the proxy serving this key
    pub fn to_actor_id(&self) -> ActorId {
        ActorId::from(self.to_string())
    }
}

impl fmt::Display for ProxyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.actor_type.0, self.actor_id)
    }
}

impl FromStr for ProxyKey {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self> {
        let (actor_type, actor_id) = s
            .split_once('-')
            .ok_or_else(|| ClusterError::protocol(format!("proxy id {:?} has no type separator", s)))?;
        let actor_type = actor_type
            .parse::<u32>()
            .map_err(|e| ClusterError::protocol(format!("proxy id {:?} has a bad type: {}", s, e)))?;
        Ok(Self {
            actor_type: ActorType(actor_type),
            actor_id: ActorId::from(actor_id),
        })
    }
}

/// Cache of proxy references per `(proxy type, key)`
#[derive(Debug)]
pub struct ProxyDirectory {
    local: SystemId,
    placement: Arc<Placement>,
    entries: RwLock<HashMap<(ActorType, ProxyKey), ActorRef>>,
}

impl ProxyDirectory {
    pub fn new(local: SystemId, placement: Arc<Placement>) -> Self {
        Self {
            local,
            placement,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Local proxy of `proxy_type` for `target`, created on first use
    pub fn resolve(&self, proxy_type: ActorType, target: &ActorRef) -> Result<ActorRef> {
        let key = ProxyKey::for_target(target);
        let cache_key = (proxy_type, key);
        if let Some(found) = self.entries.read().get(&cache_key) {
            return Ok(found.clone());
        }

        let proxy = self
            .placement
            .place(self.local, proxy_type, &cache_key.1.to_actor_id())?;
        Ok(self
            .entries
            .write()
            .entry(cache_key)
            .or_insert(proxy)
            .clone())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Watch or unwatch from a local actor; the sender is the watcher
#[derive(Debug, Clone)]
pub struct WatchInstruction {
    pub watch_type: WatchType,
    pub is_watch: bool,
}

impl Message for WatchInstruction {}

/// Watch or unwatch from an external queue
#[derive(Debug, Clone)]
pub struct SubscriptionInstruction {
    pub watch_type: WatchType,
    pub is_watch: bool,
    pub queue: WatchQueue,
}

impl Message for SubscriptionInstruction {}

/// Request from outside the actor system, relayed by a request proxy
#[derive(Debug, Clone)]
pub struct ExternalRequest {
    pub to: ActorRef,
    pub message: AnyMessage,
    pub reply: ReplySender,
    pub timeout: Option<Duration>,
}

impl Message for ExternalRequest {}
