//! Actor Placement
//!
//! Maps `(actor type, actor id)` to the member system and group slot that
//! own the actor. The result depends only on the topology's hosting lists
//! and the id bytes, so every node computes the same answer.

use crate::config::ClusterConfig;
use crate::error::{ClusterError, Result};
use crate::types::{ActorId, ActorRef, ActorType, GroupSlot, SystemId};
use std::collections::HashMap;

/// Fold id bytes, last byte first, into four XOR lanes packed big-endian
pub fn actor_id_hash(id: &[u8]) -> u32 {
    let mut lanes = [0u8; 4];
    for (i, byte) in id.iter().rev().enumerate() {
        lanes[i % 4] ^= *byte;
    }
    u32::from(lanes[3]) << 24 | u32::from(lanes[2]) << 16 | u32::from(lanes[1]) << 8 | u32::from(lanes[0])
}

/// Hosting systems per actor type, in topology order
#[derive(Debug, Clone)]
pub struct Placement {
    hosts: HashMap<ActorType, Vec<SystemId>>,
}

impl Placement {
    pub fn from_config(config: &ClusterConfig) -> Self {
        let mut hosts: HashMap<ActorType, Vec<SystemId>> = HashMap::new();
        for system in &config.systems {
            for actor_type in &system.actor_types {
                hosts.entry(*actor_type).or_default().push(system.system_id);
            }
        }
        Self { hosts }
    }

    /// Systems hosting `actor_type`; a system listed twice weighs double
    pub fn systems_for(&self, actor_type: ActorType) -> &[SystemId] {
        self.hosts.get(&actor_type).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Resolve a full reference. `SystemId::NONE` asks placement to pick.
    pub fn place(&self, system_id: SystemId, actor_type: ActorType, actor_id: &ActorId) -> Result<ActorRef> {
        let hash = actor_id_hash(actor_id.as_bytes());
        let systems = self.systems_for(actor_type);

        let (system_id, slot) = if systems.is_empty() {
            if system_id.is_none() {
                return Err(ClusterError::routing(format!(
                    "actor type {} is hosted by no system and no system was given for {}",
                    actor_type, actor_id
                )));
            }
            (system_id, (hash & 0xFFFF) + 1)
        } else {
            let n = systems.len() as u32;
            let chosen = if system_id.is_none() {
                systems[(hash % n) as usize]
            } else {
                system_id
            };
            (chosen, ((hash / n) & 0xFFFF) + 1)
        };

        Ok(ActorRef {
            system_id,
            actor_type,
            actor_id: actor_id.clone(),
            group_slot: GroupSlot(slot.max(1)),
        })
    }
}
