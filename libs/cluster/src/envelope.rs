//! Envelopes
//!
//! Every piece of actor traffic is an [`Envelope`]: a routed message with
//! its source and destination references. The first nine kinds can cross
//! node boundaries; `OuterWatch` and `OuterRequest` originate outside the
//! actor system and only ever travel to a local proxy.

use crate::message::{AnyMessage, Message};
use crate::types::{ActorRef, ErrorCode, NotifyType, WatchType};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Error half of a response
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActorError {
    /// An error with a dedicated wire code
    #[error("actor error code {0}")]
    Code(ErrorCode),
    /// Anything else; travels as the generic code
    #[error("{0}")]
    Other(String),
}

impl ActorError {
    /// Code that represents this error on the wire.
    ///
    /// Never the success code, so a failure cannot decode as a success.
    pub fn code(&self) -> ErrorCode {
        match self {
            ActorError::Code(code) if !code.is_success() => *code,
            _ => ErrorCode::NORMAL,
        }
    }
}

/// Reply to a request
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub message: Option<AnyMessage>,
    pub error: Option<ActorError>,
}

impl Response {
    pub fn ok(message: AnyMessage) -> Self {
        Self {
            message: Some(message),
            error: None,
        }
    }

    pub fn err(error: ActorError) -> Self {
        Self {
            message: None,
            error: Some(error),
        }
    }
}

/// A watched actor's payload as delivered to a watcher
#[derive(Debug, Clone)]
pub struct WatchNotification {
    pub actor_ref: ActorRef,
    pub watch_type: WatchType,
    pub message: AnyMessage,
}

impl Message for WatchNotification {}

/// An event hub payload for subscribers of `event_id`
#[derive(Debug, Clone)]
pub struct EventNotification {
    pub event_id: WatchType,
    pub message: AnyMessage,
}

impl Message for EventNotification {}

/// Bounded queue owned by a non-actor subscriber.
///
/// Identity is the underlying channel, so clones compare equal.
#[derive(Debug, Clone)]
pub struct WatchQueue {
    sender: Arc<mpsc::Sender<AnyMessage>>,
}

impl WatchQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<AnyMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender: Arc::new(tx),
            },
            rx,
        )
    }

    /// Non-blocking enqueue; false when the queue is full or closed
    pub fn enqueue(&self, message: AnyMessage) -> bool {
        self.sender.try_send(message).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl PartialEq for WatchQueue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.sender, &other.sender)
    }
}

impl Eq for WatchQueue {}

impl std::hash::Hash for WatchQueue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.sender) as usize).hash(state);
    }
}

/// One-shot reply slot for an external request
#[derive(Clone)]
pub struct ReplySender {
    slot: Arc<Mutex<Option<oneshot::Sender<Response>>>>,
}

impl ReplySender {
    pub fn new() -> (Self, oneshot::Receiver<Response>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                slot: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Deliver the response; only the first call has an effect
    pub fn complete(&self, response: Response) -> bool {
        match self.slot.lock().take() {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.slot.lock().is_none()
    }
}

impl fmt::Debug for ReplySender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplySender")
            .field("completed", &self.is_completed())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SendEnvelope {
    pub from: Option<ActorRef>,
    pub to: ActorRef,
    pub message: AnyMessage,
}

#[derive(Debug, Clone)]
pub struct BatchSendEnvelope {
    pub from: Option<ActorRef>,
    pub to: Vec<ActorRef>,
    pub messages: Vec<AnyMessage>,
}

#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    pub from: Option<ActorRef>,
    pub to: ActorRef,
    pub message: AnyMessage,
}

#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    pub from: Option<ActorRef>,
    pub to: ActorRef,
    pub response: Response,
}

#[derive(Debug, Clone)]
pub struct RequestAsyncEnvelope {
    pub from: Option<ActorRef>,
    pub to: ActorRef,
    pub message: AnyMessage,
    pub callback_id: u32,
    pub callback_address: String,
}

#[derive(Debug, Clone)]
pub struct ResponseAsyncEnvelope {
    pub from: Option<ActorRef>,
    pub to: ActorRef,
    pub response: Response,
    pub callback_id: u32,
    pub callback_address: String,
}

#[derive(Debug, Clone)]
pub struct WatchEnvelope {
    pub from: Option<ActorRef>,
    pub to: ActorRef,
    pub watch_type: WatchType,
    pub is_watch: bool,
}

#[derive(Debug, Clone)]
pub struct NotifyEnvelope {
    pub from: Option<ActorRef>,
    pub to: Vec<ActorRef>,
    pub notify_type: NotifyType,
    pub notification: WatchNotification,
}

#[derive(Debug, Clone)]
pub struct FireNotifyEnvelope {
    pub from: Option<ActorRef>,
    pub to: ActorRef,
    pub notify_type: NotifyType,
    pub watch_type: WatchType,
    pub message: AnyMessage,
}

/// Subscription of an external queue to a watchee
#[derive(Debug, Clone)]
pub struct OuterWatchEnvelope {
    pub to: ActorRef,
    pub watch_type: WatchType,
    pub is_watch: bool,
    pub queue: WatchQueue,
}

/// Request from outside the actor system
#[derive(Debug, Clone)]
pub struct OuterRequestEnvelope {
    pub to: ActorRef,
    pub message: AnyMessage,
    pub reply: ReplySender,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub enum Envelope {
    Send(SendEnvelope),
    BatchSend(BatchSendEnvelope),
    Request(RequestEnvelope),
    Response(ResponseEnvelope),
    RequestAsync(RequestAsyncEnvelope),
    ResponseAsync(ResponseAsyncEnvelope),
    Watch(WatchEnvelope),
    Notify(NotifyEnvelope),
    FireNotify(FireNotifyEnvelope),
    OuterWatch(OuterWatchEnvelope),
    OuterRequest(OuterRequestEnvelope),
}

impl Envelope {
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Send(_) => "send",
            Envelope::BatchSend(_) => "batch_send",
            Envelope::Request(_) => "request",
            Envelope::Response(_) => "response",
            Envelope::RequestAsync(_) => "request_async",
            Envelope::ResponseAsync(_) => "response_async",
            Envelope::Watch(_) => "watch",
            Envelope::Notify(_) => "notify",
            Envelope::FireNotify(_) => "fire_notify",
            Envelope::OuterWatch(_) => "outer_watch",
            Envelope::OuterRequest(_) => "outer_request",
        }
    }

    /// Destination of single-target envelopes
    pub fn target(&self) -> Option<&ActorRef> {
        match self {
            Envelope::Send(e) => Some(&e.to),
            Envelope::Request(e) => Some(&e.to),
            Envelope::Response(e) => Some(&e.to),
            Envelope::RequestAsync(e) => Some(&e.to),
            Envelope::ResponseAsync(e) => Some(&e.to),
            Envelope::Watch(e) => Some(&e.to),
            Envelope::FireNotify(e) => Some(&e.to),
            Envelope::OuterWatch(e) => Some(&e.to),
            Envelope::OuterRequest(e) => Some(&e.to),
            Envelope::BatchSend(_) | Envelope::Notify(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Ping;
    impl Message for Ping {}

    #[test]
    fn test_watch_queue_identity_and_backpressure() {
        let (queue, mut rx) = WatchQueue::new(1);
        let same = queue.clone();
        let (other, _other_rx) = WatchQueue::new(1);

        assert_eq!(queue, same);
        assert_ne!(queue, other);

        assert!(queue.enqueue(Arc::new(Ping)));
        assert!(!queue.enqueue(Arc::new(Ping)));
        assert!(rx.try_recv().is_ok());

        drop(rx);
        assert!(!queue.enqueue(Arc::new(Ping)));
        assert!(queue.is_closed());
    }

    #[tokio::test]
    async fn test_reply_completes_once() {
        let (reply, rx) = ReplySender::new();
        let clone = reply.clone();

        assert!(reply.complete(Response::err(ActorError::Code(ErrorCode(1234)))));
        assert!(!clone.complete(Response::default()));
        assert!(clone.is_completed());

        let response = rx.await.unwrap();
        assert_eq!(response.error.map(|e| e.code()), Some(ErrorCode(1234)));
    }

    #[test]
    fn test_other_errors_use_generic_code() {
        assert_eq!(ActorError::Other("boom".into()).code(), ErrorCode::NORMAL);
    }
}
