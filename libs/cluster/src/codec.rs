//! Envelope Codec
//!
//! Converts remotely deliverable envelopes to protocol packages and back.
//! Decoding fails closed: a payload that cannot be decoded aborts the whole
//! frame, except inside a batch where only the failing message is dropped.

use crate::envelope::{
    ActorError, BatchSendEnvelope, Envelope, FireNotifyEnvelope, NotifyEnvelope, RequestAsyncEnvelope,
    RequestEnvelope, Response, ResponseAsyncEnvelope, ResponseEnvelope, SendEnvelope, WatchEnvelope,
    WatchNotification,
};
use crate::error::{ClusterError, Result};
use crate::message::{AnyMessage, MessageRegistry};
use crate::protocol::{
    decode_package, encode_package, BatchSendPackage, FireNotifyPackage, NotifyPackage, PackageType,
    RequestAsyncPackage, RequestPackage, ResponseAsyncPackage, ResponsePackage, SendPackage, WatchPackage,
    WireActorRef, WireMessage, WireResponse,
};
use crate::types::{ActorRef, ErrorCode};
use std::sync::Arc;
use tracing::{error, warn};

/// A package ready for framing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedEnvelope {
    pub package_type: PackageType,
    pub payload: Vec<u8>,
}

/// Envelope to package translation backed by a message registry
#[derive(Debug, Clone)]
pub struct EnvelopeCodec {
    registry: Arc<MessageRegistry>,
}

impl EnvelopeCodec {
    pub fn new(registry: Arc<MessageRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<MessageRegistry> {
        &self.registry
    }

    pub fn encode(&self, envelope: &Envelope) -> Result<EncodedEnvelope> {
        let (package_type, payload) = match envelope {
            Envelope::Send(e) => (
                PackageType::EnvelopeSend,
                encode_package(&SendPackage {
                    from: wire_from(&e.from),
                    to: (&e.to).into(),
                    message: self.registry.marshal(e.message.as_ref())?,
                })?,
            ),
            Envelope::BatchSend(e) => (
                PackageType::EnvelopeBatchSend,
                encode_package(&BatchSendPackage {
                    from: wire_from(&e.from),
                    to: e.to.iter().map(WireActorRef::from).collect(),
                    messages: self.marshal_batch(&e.messages)?,
                })?,
            ),
            Envelope::Request(e) => (
                PackageType::EnvelopeRequest,
                encode_package(&RequestPackage {
                    from: wire_from(&e.from),
                    to: (&e.to).into(),
                    message: self.registry.marshal(e.message.as_ref())?,
                })?,
            ),
            Envelope::Response(e) => (
                PackageType::EnvelopeResponse,
                encode_package(&ResponsePackage {
                    from: wire_from(&e.from),
                    to: (&e.to).into(),
                    response: self.encode_response(&e.response)?,
                })?,
            ),
            Envelope::RequestAsync(e) => (
                PackageType::EnvelopeRequestAsync,
                encode_package(&RequestAsyncPackage {
                    from: wire_from(&e.from),
                    to: (&e.to).into(),
                    message: self.registry.marshal(e.message.as_ref())?,
                    callback_id: e.callback_id,
                    callback_address: e.callback_address.clone(),
                })?,
            ),
            Envelope::ResponseAsync(e) => (
                PackageType::EnvelopeResponseAsync,
                encode_package(&ResponseAsyncPackage {
                    from: wire_from(&e.from),
                    to: (&e.to).into(),
                    response: self.encode_response(&e.response)?,
                    callback_id: e.callback_id,
                    callback_address: e.callback_address.clone(),
                })?,
            ),
            Envelope::Watch(e) => (
                PackageType::EnvelopeWatch,
                encode_package(&WatchPackage {
                    from: wire_from(&e.from),
                    to: (&e.to).into(),
                    watch_type: e.watch_type,
                    is_watch: e.is_watch,
                })?,
            ),
            Envelope::Notify(e) => (
                PackageType::EnvelopeNotify,
                encode_package(&NotifyPackage {
                    from: wire_from(&e.from),
                    to: e.to.iter().map(WireActorRef::from).collect(),
                    notify_type: e.notify_type,
                    subject: (&e.notification.actor_ref).into(),
                    watch_type: e.notification.watch_type,
                    message: self.registry.marshal(e.notification.message.as_ref())?,
                })?,
            ),
            Envelope::FireNotify(e) => (
                PackageType::EnvelopeFireNotify,
                encode_package(&FireNotifyPackage {
                    from: wire_from(&e.from),
                    to: (&e.to).into(),
                    notify_type: e.notify_type,
                    watch_type: e.watch_type,
                    message: self.registry.marshal(e.message.as_ref())?,
                })?,
            ),
            Envelope::OuterWatch(_) | Envelope::OuterRequest(_) => {
                return Err(ClusterError::NotTransportable {
                    kind: envelope.kind(),
                })
            }
        };

        Ok(EncodedEnvelope { package_type, payload })
    }

    pub fn decode(&self, package_type: PackageType, payload: &[u8]) -> Result<Envelope> {
        let envelope = match package_type {
            PackageType::EnvelopeSend => {
                let pkg: SendPackage = decode_package(payload)?;
                Envelope::Send(SendEnvelope {
                    from: pkg.from.map(ActorRef::from),
                    to: pkg.to.into(),
                    message: self.registry.unmarshal(&pkg.message)?,
                })
            }
            PackageType::EnvelopeBatchSend => {
                let pkg: BatchSendPackage = decode_package(payload)?;
                Envelope::BatchSend(BatchSendEnvelope {
                    from: pkg.from.map(ActorRef::from),
                    to: pkg.to.into_iter().map(ActorRef::from).collect(),
                    messages: self.unmarshal_batch(&pkg.messages),
                })
            }
            PackageType::EnvelopeRequest => {
                let pkg: RequestPackage = decode_package(payload)?;
                Envelope::Request(RequestEnvelope {
                    from: pkg.from.map(ActorRef::from),
                    to: pkg.to.into(),
                    message: self.registry.unmarshal(&pkg.message)?,
                })
            }
            PackageType::EnvelopeResponse => {
                let pkg: ResponsePackage = decode_package(payload)?;
                Envelope::Response(ResponseEnvelope {
                    from: pkg.from.map(ActorRef::from),
                    to: pkg.to.into(),
                    response: self.decode_response(&pkg.response)?,
                })
            }
            PackageType::EnvelopeRequestAsync => {
                let pkg: RequestAsyncPackage = decode_package(payload)?;
                Envelope::RequestAsync(RequestAsyncEnvelope {
                    from: pkg.from.map(ActorRef::from),
                    to: pkg.to.into(),
                    message: self.registry.unmarshal(&pkg.message)?,
                    callback_id: pkg.callback_id,
                    callback_address: pkg.callback_address,
                })
            }
            PackageType::EnvelopeResponseAsync => {
                let pkg: ResponseAsyncPackage = decode_package(payload)?;
                Envelope::ResponseAsync(ResponseAsyncEnvelope {
                    from: pkg.from.map(ActorRef::from),
                    to: pkg.to.into(),
                    response: self.decode_response(&pkg.response)?,
                    callback_id: pkg.callback_id,
                    callback_address: pkg.callback_address,
                })
            }
            PackageType::EnvelopeWatch => {
                let pkg: WatchPackage = decode_package(payload)?;
                Envelope::Watch(WatchEnvelope {
                    from: pkg.from.map(ActorRef::from),
                    to: pkg.to.into(),
                    watch_type: pkg.watch_type,
                    is_watch: pkg.is_watch,
                })
            }
            PackageType::EnvelopeNotify => {
                let pkg: NotifyPackage = decode_package(payload)?;
                Envelope::Notify(NotifyEnvelope {
                    from: pkg.from.map(ActorRef::from),
                    to: pkg.to.into_iter().map(ActorRef::from).collect(),
                    notify_type: pkg.notify_type,
                    notification: WatchNotification {
                        actor_ref: pkg.subject.into(),
                        watch_type: pkg.watch_type,
                        message: self.registry.unmarshal(&pkg.message)?,
                    },
                })
            }
            PackageType::EnvelopeFireNotify => {
                let pkg: FireNotifyPackage = decode_package(payload)?;
                Envelope::FireNotify(FireNotifyEnvelope {
                    from: pkg.from.map(ActorRef::from),
                    to: pkg.to.into(),
                    notify_type: pkg.notify_type,
                    watch_type: pkg.watch_type,
                    message: self.registry.unmarshal(&pkg.message)?,
                })
            }
            PackageType::RegisterSystemReq | PackageType::RegisterSystemRsp => {
                return Err(ClusterError::protocol(format!(
                    "handshake package {:?} is not an envelope",
                    package_type
                )))
            }
        };
        Ok(envelope)
    }

    fn marshal_batch(&self, messages: &[AnyMessage]) -> Result<Vec<WireMessage>> {
        let wire: Vec<WireMessage> = messages
            .iter()
            .filter_map(|message| match self.registry.marshal(message.as_ref()) {
                Ok(wire) => Some(wire),
                Err(e) => {
                    warn!(error = %e, payload = ?message, "Dropping unmarshalable batch message");
                    None
                }
            })
            .collect();

        if wire.is_empty() {
            error!(count = messages.len(), "No valid message in batch");
            return Err(ClusterError::NoValidMessage);
        }
        Ok(wire)
    }

    fn unmarshal_batch(&self, messages: &[WireMessage]) -> Vec<AnyMessage> {
        messages
            .iter()
            .filter_map(|wire| match self.registry.unmarshal(wire) {
                Ok(message) => Some(message),
                Err(e) => {
                    warn!(error = %e, type_id = wire.message_type, "Dropping undecodable batch message");
                    None
                }
            })
            .collect()
    }

    fn encode_response(&self, response: &Response) -> Result<WireResponse> {
        let message = match &response.message {
            Some(message) => Some(self.registry.marshal(message.as_ref())?),
            None => None,
        };
        Ok(WireResponse {
            error_code: response.error.as_ref().map_or(ErrorCode::SUCCESS, ActorError::code),
            message,
        })
    }

    fn decode_response(&self, wire: &WireResponse) -> Result<Response> {
        let message = match &wire.message {
            Some(message) => Some(self.registry.unmarshal(message)?),
            None => None,
        };
        let error = if wire.error_code.is_success() {
            None
        } else {
            Some(ActorError::Code(wire.error_code))
        };
        Ok(Response { message, error })
    }
}

fn wire_from(from: &Option<ActorRef>) -> Option<WireActorRef> {
    from.as_ref().map(WireActorRef::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{OuterWatchEnvelope, WatchQueue};
    use crate::message::Message;
    use crate::types::{ActorType, GroupSlot, MessageTypeId, NotifyType, SystemId, WatchType};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Payload {
        seq: u64,
        body: Vec<u8>,
    }

    impl Message for Payload {
        fn message_type(&self) -> Option<MessageTypeId> {
            Some(MessageTypeId(42))
        }
    }

    #[derive(Debug)]
    struct Unregistered;

    impl Message for Unregistered {
        fn message_type(&self) -> Option<MessageTypeId> {
            Some(MessageTypeId(99))
        }
    }

    fn codec() -> EnvelopeCodec {
        let registry = Arc::new(MessageRegistry::new());
        registry.register::<Payload>(MessageTypeId(42));
        EnvelopeCodec::new(registry)
    }

    fn actor(system: u32, id: &str) -> ActorRef {
        ActorRef::new(SystemId(system), ActorType(110), id, GroupSlot(3))
    }

    fn payload(seq: u64) -> AnyMessage {
        Arc::new(Payload {
            seq,
            body: vec![seq as u8, 0xFF, 0x00],
        })
    }

    fn as_payload(message: &AnyMessage) -> &Payload {
        message.downcast_ref::<Payload>().unwrap()
    }

    fn round_trip(codec: &EnvelopeCodec, envelope: &Envelope) -> Envelope {
        let encoded = codec.encode(envelope).unwrap();
        codec.decode(encoded.package_type, &encoded.payload).unwrap()
    }

    #[test]
    fn test_send_round_trip() {
        let codec = codec();
        let envelope = Envelope::Send(SendEnvelope {
            from: Some(actor(1, "a")),
            to: actor(2, "b"),
            message: payload(1),
        });

        match round_trip(&codec, &envelope) {
            Envelope::Send(e) => {
                assert_eq!(e.from, Some(actor(1, "a")));
                assert_eq!(e.to, actor(2, "b"));
                assert_eq!(as_payload(&e.message), as_payload(&payload(1)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_batch_send_round_trip() {
        let codec = codec();
        let envelope = Envelope::BatchSend(BatchSendEnvelope {
            from: None,
            to: vec![actor(2, "x"), actor(2, "y")],
            messages: vec![payload(1), payload(2), payload(3)],
        });

        match round_trip(&codec, &envelope) {
            Envelope::BatchSend(e) => {
                assert_eq!(e.from, None);
                assert_eq!(e.to, vec![actor(2, "x"), actor(2, "y")]);
                let seqs: Vec<u64> = e.messages.iter().map(|m| as_payload(m).seq).collect();
                assert_eq!(seqs, vec![1, 2, 3]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_batch_send_skips_failing_member() {
        let codec = codec();
        let envelope = Envelope::BatchSend(BatchSendEnvelope {
            from: None,
            to: vec![actor(2, "x")],
            messages: vec![payload(1), Arc::new(Unregistered), payload(3)],
        });

        match round_trip(&codec, &envelope) {
            Envelope::BatchSend(e) => {
                let seqs: Vec<u64> = e.messages.iter().map(|m| as_payload(m).seq).collect();
                assert_eq!(seqs, vec![1, 3]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_batch_send_all_failing() {
        let codec = codec();
        let envelope = Envelope::BatchSend(BatchSendEnvelope {
            from: None,
            to: vec![actor(2, "x")],
            messages: vec![Arc::new(Unregistered), Arc::new(Unregistered)],
        });
        assert!(matches!(codec.encode(&envelope), Err(ClusterError::NoValidMessage)));
    }

    #[test]
    fn test_request_round_trip() {
        let codec = codec();
        let envelope = Envelope::Request(RequestEnvelope {
            from: Some(actor(3, "caller")),
            to: actor(1, "callee"),
            message: payload(9),
        });

        match round_trip(&codec, &envelope) {
            Envelope::Request(e) => {
                assert_eq!(e.from, Some(actor(3, "caller")));
                assert_eq!(as_payload(&e.message).seq, 9);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_response_success_and_failure_codes() {
        let codec = codec();

        let ok = Envelope::Response(ResponseEnvelope {
            from: Some(actor(1, "callee")),
            to: actor(3, "caller"),
            response: Response::ok(payload(5)),
        });
        match round_trip(&codec, &ok) {
            Envelope::Response(e) => {
                assert!(e.response.error.is_none());
                assert_eq!(as_payload(e.response.message.as_ref().unwrap()).seq, 5);
            }
            other => panic!("unexpected {:?}", other),
        }

        let coded = Envelope::Response(ResponseEnvelope {
            from: None,
            to: actor(3, "caller"),
            response: Response::err(ActorError::Code(ErrorCode(1234))),
        });
        match round_trip(&codec, &coded) {
            Envelope::Response(e) => {
                assert!(e.response.message.is_none());
                assert_eq!(e.response.error, Some(ActorError::Code(ErrorCode(1234))));
            }
            other => panic!("unexpected {:?}", other),
        }

        let generic = Envelope::Response(ResponseEnvelope {
            from: None,
            to: actor(3, "caller"),
            response: Response::err(ActorError::Other("disk on fire".into())),
        });
        match round_trip(&codec, &generic) {
            Envelope::Response(e) => {
                assert_eq!(e.response.error, Some(ActorError::Code(ErrorCode::NORMAL)));
            }
            other => panic!("unexpected {:?}", other),
        }

        // A failure carrying the success code still arrives as a failure
        let zero = Envelope::Response(ResponseEnvelope {
            from: None,
            to: actor(3, "caller"),
            response: Response::err(ActorError::Code(ErrorCode::SUCCESS)),
        });
        match round_trip(&codec, &zero) {
            Envelope::Response(e) => {
                assert!(e.response.message.is_none());
                assert_eq!(e.response.error, Some(ActorError::Code(ErrorCode::NORMAL)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_async_round_trips_keep_callbacks() {
        let codec = codec();
        let request = Envelope::RequestAsync(RequestAsyncEnvelope {
            from: Some(actor(1, "a")),
            to: actor(2, "b"),
            message: payload(1),
            callback_id: 77,
            callback_address: "1/reply".into(),
        });
        match round_trip(&codec, &request) {
            Envelope::RequestAsync(e) => {
                assert_eq!(e.callback_id, 77);
                assert_eq!(e.callback_address, "1/reply");
            }
            other => panic!("unexpected {:?}", other),
        }

        let response = Envelope::ResponseAsync(ResponseAsyncEnvelope {
            from: Some(actor(2, "b")),
            to: actor(1, "a"),
            response: Response::ok(payload(2)),
            callback_id: 77,
            callback_address: "1/reply".into(),
        });
        match round_trip(&codec, &response) {
            Envelope::ResponseAsync(e) => {
                assert_eq!(e.callback_id, 77);
                assert_eq!(as_payload(e.response.message.as_ref().unwrap()).seq, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_watch_round_trip() {
        let codec = codec();
        let envelope = Envelope::Watch(WatchEnvelope {
            from: Some(actor(1, "watcher")),
            to: actor(2, "watchee"),
            watch_type: WatchType(4),
            is_watch: false,
        });

        match round_trip(&codec, &envelope) {
            Envelope::Watch(e) => {
                assert_eq!(e.from, Some(actor(1, "watcher")));
                assert_eq!(e.to, actor(2, "watchee"));
                assert_eq!(e.watch_type, WatchType(4));
                assert!(!e.is_watch);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_notify_round_trip() {
        let codec = codec();
        let envelope = Envelope::Notify(NotifyEnvelope {
            from: Some(actor(2, "watchee")),
            to: vec![actor(1, "w1"), actor(1, "w2")],
            notify_type: NotifyType(1),
            notification: WatchNotification {
                actor_ref: actor(2, "watchee"),
                watch_type: WatchType(6),
                message: payload(8),
            },
        });

        match round_trip(&codec, &envelope) {
            Envelope::Notify(e) => {
                assert_eq!(e.to, vec![actor(1, "w1"), actor(1, "w2")]);
                assert_eq!(e.notify_type, NotifyType(1));
                assert_eq!(e.notification.actor_ref, actor(2, "watchee"));
                assert_eq!(e.notification.watch_type, WatchType(6));
                assert_eq!(as_payload(&e.notification.message), as_payload(&payload(8)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_fire_notify_round_trip() {
        let codec = codec();
        let envelope = Envelope::FireNotify(FireNotifyEnvelope {
            from: None,
            to: actor(2, "hub"),
            notify_type: NotifyType(2),
            watch_type: WatchType(3),
            message: payload(4),
        });

        match round_trip(&codec, &envelope) {
            Envelope::FireNotify(e) => {
                assert_eq!(e.notify_type, NotifyType(2));
                assert_eq!(e.watch_type, WatchType(3));
                assert_eq!(as_payload(&e.message).seq, 4);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_single_message_errors() {
        let codec = codec();
        let envelope = Envelope::Send(SendEnvelope {
            from: None,
            to: actor(2, "b"),
            message: Arc::new(Unregistered),
        });
        assert!(matches!(
            codec.encode(&envelope),
            Err(ClusterError::MessageNotRegistered { .. })
        ));

        let (queue, _rx) = WatchQueue::new(1);
        let outer = Envelope::OuterWatch(OuterWatchEnvelope {
            to: actor(2, "b"),
            watch_type: WatchType(1),
            is_watch: true,
            queue,
        });
        assert!(matches!(
            codec.encode(&outer),
            Err(ClusterError::NotTransportable { kind: "outer_watch" })
        ));
    }

    #[test]
    fn test_decode_fails_closed() {
        let sender = codec();
        let encoded = sender
            .encode(&Envelope::Send(SendEnvelope {
                from: None,
                to: actor(2, "b"),
                message: payload(1),
            }))
            .unwrap();

        // A receiver that never registered the payload type
        let receiver = EnvelopeCodec::new(Arc::new(MessageRegistry::new()));
        assert!(matches!(
            receiver.decode(encoded.package_type, &encoded.payload),
            Err(ClusterError::MessageNotRegistered { .. })
        ));

        assert!(sender.decode(PackageType::EnvelopeSend, &[0xFF]).is_err());
        assert!(sender
            .decode(PackageType::RegisterSystemReq, &encoded.payload)
            .is_err());
    }
}
