//! Watch Proxy
//!
//! Holds every local subscription to one remote watchee and keeps exactly
//! one real watch on the watchee per watch type while anyone is listening.
//! Subscribers come in two kinds: local watcher actors and external
//! queues. When both registries drain, the proxy schedules its own stop.

use super::{ProxyKey, SubscriptionInstruction, WatchInstruction};
use crate::envelope::{BatchSendEnvelope, Envelope, EventNotification, WatchNotification, WatchQueue};
use crate::message::AnyMessage;
use crate::placement::Placement;
use crate::runtime::{Actor, ActorContext};
use crate::types::{ActorRef, SystemId, WatchType};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

pub struct WatchProxy {
    placement: Arc<Placement>,
    idle_grace: Duration,
    watchee: Option<ActorRef>,
    queues: HashMap<WatchType, HashSet<WatchQueue>>,
    watchers: HashMap<WatchType, HashSet<ActorRef>>,
}

impl WatchProxy {
    pub fn new(placement: Arc<Placement>, idle_grace: Duration) -> Self {
        Self {
            placement,
            idle_grace,
            watchee: None,
            queues: HashMap::new(),
            watchers: HashMap::new(),
        }
    }

    pub fn watchee(&self) -> Option<&ActorRef> {
        self.watchee.as_ref()
    }

    /// Whether anyone listens for `watch_type`
    pub fn is_armed(&self, watch_type: WatchType) -> bool {
        self.queues.contains_key(&watch_type) || self.watchers.contains_key(&watch_type)
    }

    pub fn subscriber_count(&self, watch_type: WatchType) -> usize {
        self.queues.get(&watch_type).map_or(0, HashSet::len)
            + self.watchers.get(&watch_type).map_or(0, HashSet::len)
    }

    fn update_watchers(&mut self, ctx: &mut dyn ActorContext, watch_type: WatchType, is_watch: bool, watcher: ActorRef) {
        let was_armed = self.is_armed(watch_type);
        if is_watch {
            self.watchers.entry(watch_type).or_default().insert(watcher);
        } else if let Some(set) = self.watchers.get_mut(&watch_type) {
            if set.remove(&watcher) && set.is_empty() {
                self.watchers.remove(&watch_type);
            }
        }
        self.apply_transition(ctx, watch_type, was_armed);
    }

    fn update_queues(&mut self, ctx: &mut dyn ActorContext, watch_type: WatchType, is_watch: bool, queue: WatchQueue) {
        let was_armed = self.is_armed(watch_type);
        if is_watch {
            self.queues.entry(watch_type).or_default().insert(queue);
        } else if let Some(set) = self.queues.get_mut(&watch_type) {
            if set.remove(&queue) && set.is_empty() {
                self.queues.remove(&watch_type);
            }
        }
        self.apply_transition(ctx, watch_type, was_armed);
    }

    fn apply_transition(&mut self, ctx: &mut dyn ActorContext, watch_type: WatchType, was_armed: bool) {
        let Some(watchee) = self.watchee.clone() else {
            return;
        };
        let armed = self.is_armed(watch_type);

        if !was_armed && armed {
            ctx.set_stop_interval(None);
            ctx.watch(&watchee, watch_type);
            debug!(watchee = %watchee, watch_type = watch_type.0, "Watch proxy armed");
        } else if was_armed && !armed {
            if self.queues.is_empty() && self.watchers.is_empty() {
                ctx.set_stop_interval(Some(self.idle_grace));
            }
            ctx.unwatch(&watchee, watch_type);
            debug!(watchee = %watchee, watch_type = watch_type.0, "Watch proxy disarmed");
        }
    }

    /// Deliver to every subscriber of `watch_type`
    fn fan_out(&mut self, ctx: &mut dyn ActorContext, watch_type: WatchType, queued: AnyMessage, forwarded: AnyMessage) {
        let Some(watchee) = self.watchee.clone() else {
            return;
        };

        let rejected: Vec<WatchQueue> = self
            .queues
            .get(&watch_type)
            .map(|queues| {
                queues
                    .iter()
                    .filter(|queue| !queue.enqueue(Arc::clone(&queued)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        for queue in rejected {
            warn!(watchee = %watchee, watch_type = watch_type.0, "Dropping full or closed watch queue");
            self.update_queues(ctx, watch_type, false, queue);
        }

        if let Some(watchers) = self.watchers.get(&watch_type) {
            ctx.local_route(Envelope::BatchSend(BatchSendEnvelope {
                from: Some(watchee),
                to: watchers.iter().cloned().collect(),
                messages: vec![forwarded],
            }));
        }
    }
}

impl Actor for WatchProxy {
    fn on_start(&mut self, ctx: &mut dyn ActorContext) {
        let resolved = ctx
            .actor_ref()
            .actor_id
            .as_str()
            .parse::<ProxyKey>()
            .and_then(|key| self.placement.place(SystemId::NONE, key.actor_type, &key.actor_id));
        match resolved {
            Ok(watchee) => {
                debug!(proxy = %ctx.actor_ref(), watchee = %watchee, "Watch proxy started");
                self.watchee = Some(watchee);
            }
            Err(e) => error!(proxy = %ctx.actor_ref(), error = %e, "Watch proxy cannot resolve its watchee"),
        }
    }

    fn on_message(&mut self, ctx: &mut dyn ActorContext, message: &AnyMessage) {
        if self.watchee.is_none() {
            warn!(proxy = %ctx.actor_ref(), payload = ?message, "Watch proxy without watchee ignores message");
            return;
        }

        if let Some(instruction) = message.downcast_ref::<WatchInstruction>() {
            match ctx.sender().cloned() {
                Some(watcher) => self.update_watchers(ctx, instruction.watch_type, instruction.is_watch, watcher),
                None => warn!(proxy = %ctx.actor_ref(), "Watch instruction without a watcher"),
            }
        } else if let Some(instruction) = message.downcast_ref::<SubscriptionInstruction>() {
            self.update_queues(ctx, instruction.watch_type, instruction.is_watch, instruction.queue.clone());
        } else if let Some(notification) = message.downcast_ref::<WatchNotification>() {
            let Some(watchee) = self.watchee.clone() else {
                return;
            };
            let queued: AnyMessage = Arc::new(WatchNotification {
                actor_ref: watchee,
                watch_type: notification.watch_type,
                message: Arc::clone(&notification.message),
            });
            self.fan_out(ctx, notification.watch_type, queued, Arc::clone(message));
        } else if let Some(event) = message.downcast_ref::<EventNotification>() {
            self.fan_out(ctx, event.event_id, Arc::clone(message), Arc::clone(message));
        } else {
            debug!(proxy = %ctx.actor_ref(), payload = ?message, "Watch proxy ignores message");
        }
    }
}
