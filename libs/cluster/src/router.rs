//! Envelope Router
//!
//! Single entry point for every envelope the local runtime emits. Decides
//! between local delivery and the cluster transport, splits multi-target
//! envelopes per member, and diverts cross-node watch and outer traffic to
//! this node's proxy actors.

use crate::envelope::{BatchSendEnvelope, Envelope, NotifyEnvelope, SendEnvelope};
use crate::error::Result;
use crate::message::AnyMessage;
use crate::placement::Placement;
use crate::proxy::{ExternalRequest, ProxyDirectory, SubscriptionInstruction, WatchInstruction};
use crate::runtime::{EnvelopeRouter, LocalRuntime};
use crate::types::{ActorId, ActorRef, ActorType, SystemId};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::error;

/// Delivery to another member
pub trait RemoteSender: Send + Sync {
    fn send_remote(&self, target: SystemId, envelope: &Envelope) -> Result<()>;
}

pub struct Router {
    local: SystemId,
    placement: Arc<Placement>,
    proxies: ProxyDirectory,
    runtime: Arc<dyn LocalRuntime>,
    remote: Arc<dyn RemoteSender>,
}

impl Router {
    pub fn new(
        local: SystemId,
        placement: Arc<Placement>,
        runtime: Arc<dyn LocalRuntime>,
        remote: Arc<dyn RemoteSender>,
    ) -> Self {
        Self {
            local,
            proxies: ProxyDirectory::new(local, Arc::clone(&placement)),
            placement,
            runtime,
            remote,
        }
    }

    pub fn local_system_id(&self) -> SystemId {
        self.local
    }

    pub fn proxies(&self) -> &ProxyDirectory {
        &self.proxies
    }

    fn dispatch(&self, envelope: Envelope) -> Result<()> {
        match envelope {
            Envelope::BatchSend(e) => {
                let groups = group_by_system(e.to);
                self.deliver_groups(groups, |to| {
                    Envelope::BatchSend(BatchSendEnvelope {
                        from: e.from.clone(),
                        to,
                        messages: e.messages.clone(),
                    })
                })
            }
            Envelope::Notify(e) => {
                let groups = group_by_system(e.to);
                self.deliver_groups(groups, |to| {
                    Envelope::Notify(NotifyEnvelope {
                        from: e.from.clone(),
                        to,
                        notify_type: e.notify_type,
                        notification: e.notification.clone(),
                    })
                })
            }
            Envelope::Watch(e) => {
                let target = e.to.system_id;
                if target == self.local {
                    self.runtime.local_route(Envelope::Watch(e));
                    Ok(())
                } else if e
                    .from
                    .as_ref()
                    .is_some_and(|from| from.actor_type == ActorType::WATCH_PROXY)
                {
                    self.remote.send_remote(target, &Envelope::Watch(e))
                } else {
                    let proxy = self.proxies.resolve(ActorType::WATCH_PROXY, &e.to)?;
                    self.to_proxy(
                        e.from,
                        proxy,
                        Arc::new(WatchInstruction {
                            watch_type: e.watch_type,
                            is_watch: e.is_watch,
                        }),
                    );
                    Ok(())
                }
            }
            Envelope::OuterWatch(e) => {
                if e.to.system_id == self.local {
                    self.runtime.local_route(Envelope::OuterWatch(e));
                    return Ok(());
                }
                let proxy = self.proxies.resolve(ActorType::WATCH_PROXY, &e.to)?;
                self.to_proxy(
                    None,
                    proxy,
                    Arc::new(SubscriptionInstruction {
                        watch_type: e.watch_type,
                        is_watch: e.is_watch,
                        queue: e.queue,
                    }),
                );
                Ok(())
            }
            Envelope::OuterRequest(e) => {
                if e.to.system_id == self.local {
                    self.runtime.local_route(Envelope::OuterRequest(e));
                    return Ok(());
                }
                let proxy = self.proxies.resolve(ActorType::REQUEST_PROXY, &e.to)?;
                self.to_proxy(
                    None,
                    proxy,
                    Arc::new(ExternalRequest {
                        to: e.to,
                        message: e.message,
                        reply: e.reply,
                        timeout: e.timeout,
                    }),
                );
                Ok(())
            }
            other => {
                let Some(target) = other.target().map(|to| to.system_id) else {
                    return Ok(());
                };
                if target == self.local {
                    self.runtime.local_route(other);
                    Ok(())
                } else {
                    self.remote.send_remote(target, &other)
                }
            }
        }
    }

    /// Deliver one rebuilt envelope per member, attempting every member
    fn deliver_groups(
        &self,
        groups: BTreeMap<SystemId, Vec<ActorRef>>,
        build: impl Fn(Vec<ActorRef>) -> Envelope,
    ) -> Result<()> {
        let mut outcome = Ok(());
        for (system_id, to) in groups {
            let envelope = build(to);
            if system_id == self.local {
                self.runtime.local_route(envelope);
            } else if let Err(e) = self.remote.send_remote(system_id, &envelope) {
                error!(system_id = %system_id, kind = envelope.kind(), error = %e, "Failed to deliver group");
                outcome = Err(e);
            }
        }
        outcome
    }

    fn to_proxy(&self, from: Option<ActorRef>, proxy: ActorRef, message: AnyMessage) {
        self.runtime
            .local_route(Envelope::Send(SendEnvelope { from, to: proxy, message }));
    }
}

fn group_by_system(refs: Vec<ActorRef>) -> BTreeMap<SystemId, Vec<ActorRef>> {
    let mut groups: BTreeMap<SystemId, Vec<ActorRef>> = BTreeMap::new();
    for r in refs {
        groups.entry(r.system_id).or_default().push(r);
    }
    groups
}

impl EnvelopeRouter for Router {
    fn route(&self, envelope: Envelope) -> Result<()> {
        let kind = envelope.kind();
        let result = self.dispatch(envelope);
        if let Err(e) = &result {
            error!(kind, error = %e, category = e.category(), "Router error");
        }
        result
    }

    fn place_actor(&self, system_id: SystemId, actor_type: ActorType, actor_id: &ActorId) -> Result<ActorRef> {
        self.placement.place(system_id, actor_type, actor_id)
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("local", &self.local)
            .field("proxies", &self.proxies.len())
            .finish()
    }
}
