//! Request Proxy
//!
//! Relays requests from outside the actor system. The proxy keeps no
//! state; each request becomes one asynchronous actor request whose
//! completion fills the caller's reply slot.

use super::ExternalRequest;
use crate::envelope::Response;
use crate::message::AnyMessage;
use crate::runtime::{Actor, ActorContext};
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct RequestProxy;

impl RequestProxy {
    pub fn new() -> Self {
        Self
    }
}

impl Actor for RequestProxy {
    fn on_message(&mut self, ctx: &mut dyn ActorContext, message: &AnyMessage) {
        let Some(request) = message.downcast_ref::<ExternalRequest>() else {
            debug!(proxy = %ctx.actor_ref(), payload = ?message, "Request proxy ignores message");
            return;
        };

        let reply = request.reply.clone();
        let target = request.to.clone();
        ctx.request_async(
            &request.to,
            request.message.clone(),
            request.timeout,
            Box::new(move |message, error| {
                if !reply.complete(Response { message, error }) {
                    warn!(target = %target, "Request reply already completed or abandoned");
                }
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{ActorError, ReplySender};
    use crate::message::Message;
    use crate::testing::RecordingContext;
    use crate::types::{ActorRef, ActorType, ErrorCode, GroupSlot, SystemId};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug)]
    struct Question(&'static str);
    impl Message for Question {}

    fn proxy_ctx() -> RecordingContext {
        RecordingContext::new(ActorRef::new(
            SystemId(1),
            ActorType::REQUEST_PROXY,
            "120-oracle",
            GroupSlot(1),
        ))
    }

    #[tokio::test]
    async fn test_relays_request_and_completes_reply() {
        let target = ActorRef::new(SystemId(2), ActorType(120), "oracle", GroupSlot(4));
        let (reply, rx) = ReplySender::new();
        let request: AnyMessage = Arc::new(ExternalRequest {
            to: target.clone(),
            message: Arc::new(Question("why")),
            reply,
            timeout: Some(Duration::from_millis(1500)),
        });

        let mut ctx = proxy_ctx();
        RequestProxy::new().on_message(&mut ctx, &request);

        assert_eq!(ctx.requests.len(), 1);
        let (to, message, timeout, callback) = ctx.requests.pop().unwrap();
        assert_eq!(to, target);
        assert_eq!(message.downcast_ref::<Question>().unwrap().0, "why");
        assert_eq!(timeout, Some(Duration::from_millis(1500)));

        callback(Some(Arc::new(Question("because"))), None);
        let response = rx.await.unwrap();
        assert!(response.error.is_none());
        assert_eq!(
            response.message.unwrap().downcast_ref::<Question>().unwrap().0,
            "because"
        );
    }

    #[tokio::test]
    async fn test_error_reaches_caller() {
        let (reply, rx) = ReplySender::new();
        let request: AnyMessage = Arc::new(ExternalRequest {
            to: ActorRef::new(SystemId(2), ActorType(120), "oracle", GroupSlot(4)),
            message: Arc::new(Question("?")),
            reply,
            timeout: None,
        });

        let mut ctx = proxy_ctx();
        RequestProxy::new().on_message(&mut ctx, &request);
        let (_, _, timeout, callback) = ctx.requests.pop().unwrap();
        assert_eq!(timeout, None);

        callback(None, Some(ActorError::Code(ErrorCode(1003))));
        let response = rx.await.unwrap();
        assert!(response.message.is_none());
        assert_eq!(response.error, Some(ActorError::Code(ErrorCode(1003))));
    }

    #[test]
    fn test_ignores_other_messages() {
        let mut ctx = proxy_ctx();
        let other: AnyMessage = Arc::new(Question("stray"));
        RequestProxy::new().on_message(&mut ctx, &other);
        assert!(ctx.requests.is_empty());
    }
}
