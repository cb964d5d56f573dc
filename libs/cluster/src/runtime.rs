//! Runtime Collaborators
//!
//! The single-node actor runtime lives outside this crate. These traits
//! are the seam: what the cluster layer needs from the runtime, what the
//! runtime needs from the cluster layer, and what an actor sees while it
//! handles a message.

use crate::envelope::{ActorError, Envelope};
use crate::error::Result;
use crate::message::AnyMessage;
use crate::types::{ActorId, ActorRef, ActorType, SystemId, WatchType};
use std::sync::Arc;
use std::time::Duration;

/// Builds a fresh actor instance on first address
pub type ActorFactory = Arc<dyn Fn() -> Box<dyn Actor> + Send + Sync>;

/// Completion for an asynchronous request
pub type RequestCallback = Box<dyn FnOnce(Option<AnyMessage>, Option<ActorError>) + Send>;

/// An actor hosted by the local runtime
pub trait Actor: Send {
    fn on_start(&mut self, _ctx: &mut dyn ActorContext) {}

    fn on_message(&mut self, ctx: &mut dyn ActorContext, message: &AnyMessage);
}

/// What an actor can do while handling a message
pub trait ActorContext {
    fn actor_ref(&self) -> &ActorRef;

    /// Sender of the message being handled, if any
    fn sender(&self) -> Option<&ActorRef>;

    fn local_route(&mut self, envelope: Envelope);

    fn watch(&mut self, target: &ActorRef, watch_type: WatchType);

    fn unwatch(&mut self, target: &ActorRef, watch_type: WatchType);

    fn request_async(
        &mut self,
        target: &ActorRef,
        message: AnyMessage,
        timeout: Option<Duration>,
        callback: RequestCallback,
    );

    /// Arm (`Some`) or cancel (`None`) a deferred self-stop
    fn set_stop_interval(&mut self, interval: Option<Duration>);
}

/// Entry points the runtime calls for every outgoing envelope
pub trait EnvelopeRouter: Send + Sync {
    fn route(&self, envelope: Envelope) -> Result<()>;

    fn place_actor(&self, system_id: SystemId, actor_type: ActorType, actor_id: &ActorId) -> Result<ActorRef>;
}

/// The local runtime as seen by the cluster layer
pub trait LocalRuntime: Send + Sync {
    /// Deliver to an actor on this node, creating it if needed
    fn local_route(&self, envelope: Envelope);

    fn register_actor_type(&self, actor_type: ActorType, factory: ActorFactory);

    /// Replace the runtime's router and placement function
    fn install_router(&self, router: Arc<dyn EnvelopeRouter>);
}
