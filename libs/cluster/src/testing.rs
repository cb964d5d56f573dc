//! Recording fakes of the runtime seams for unit tests.

use crate::envelope::Envelope;
use crate::error::Result;
use crate::message::AnyMessage;
use crate::router::RemoteSender;
use crate::runtime::{ActorContext, ActorFactory, EnvelopeRouter, LocalRuntime, RequestCallback};
use crate::types::{ActorRef, ActorType, SystemId, WatchType};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum ContextCall {
    Watch(ActorRef, WatchType),
    Unwatch(ActorRef, WatchType),
    StopInterval(Option<Duration>),
}

/// Actor context that records side effects
pub struct RecordingContext {
    pub me: ActorRef,
    pub sender: Option<ActorRef>,
    pub calls: Vec<ContextCall>,
    pub routed: Vec<Envelope>,
    pub requests: Vec<(ActorRef, AnyMessage, Option<Duration>, RequestCallback)>,
}

impl RecordingContext {
    pub fn new(me: ActorRef) -> Self {
        Self {
            me,
            sender: None,
            calls: Vec::new(),
            routed: Vec::new(),
            requests: Vec::new(),
        }
    }

    pub fn take_calls(&mut self) -> Vec<ContextCall> {
        std::mem::take(&mut self.calls)
    }
}

impl ActorContext for RecordingContext {
    fn actor_ref(&self) -> &ActorRef {
        &self.me
    }

    fn sender(&self) -> Option<&ActorRef> {
        self.sender.as_ref()
    }

    fn local_route(&mut self, envelope: Envelope) {
        self.routed.push(envelope);
    }

    fn watch(&mut self, target: &ActorRef, watch_type: WatchType) {
        self.calls.push(ContextCall::Watch(target.clone(), watch_type));
    }

    fn unwatch(&mut self, target: &ActorRef, watch_type: WatchType) {
        self.calls.push(ContextCall::Unwatch(target.clone(), watch_type));
    }

    fn request_async(
        &mut self,
        target: &ActorRef,
        message: AnyMessage,
        timeout: Option<Duration>,
        callback: RequestCallback,
    ) {
        self.requests.push((target.clone(), message, timeout, callback));
    }

    fn set_stop_interval(&mut self, interval: Option<Duration>) {
        self.calls.push(ContextCall::StopInterval(interval));
    }
}

/// Local runtime that records deliveries
#[derive(Default)]
pub struct RecordingRuntime {
    pub delivered: Mutex<Vec<Envelope>>,
    pub actor_types: Mutex<Vec<ActorType>>,
    pub router: Mutex<Option<Arc<dyn EnvelopeRouter>>>,
}

impl RecordingRuntime {
    pub fn take_delivered(&self) -> Vec<Envelope> {
        std::mem::take(&mut *self.delivered.lock())
    }
}

impl LocalRuntime for RecordingRuntime {
    fn local_route(&self, envelope: Envelope) {
        self.delivered.lock().push(envelope);
    }

    fn register_actor_type(&self, actor_type: ActorType, _factory: ActorFactory) {
        self.actor_types.lock().push(actor_type);
    }

    fn install_router(&self, router: Arc<dyn EnvelopeRouter>) {
        *self.router.lock() = Some(router);
    }
}

/// Remote sender that records envelopes per target, optionally failing some
#[derive(Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<(SystemId, Envelope)>>,
    pub failing: Mutex<Vec<SystemId>>,
}

impl RecordingSender {
    pub fn take_sent(&self) -> Vec<(SystemId, Envelope)> {
        std::mem::take(&mut *self.sent.lock())
    }
}

impl RemoteSender for RecordingSender {
    fn send_remote(&self, target: SystemId, envelope: &Envelope) -> Result<()> {
        if self.failing.lock().contains(&target) {
            return Err(crate::error::ClusterError::PeerDisconnected { system_id: target });
        }
        self.sent.lock().push((target, envelope.clone()));
        Ok(())
    }
}
