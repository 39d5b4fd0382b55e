use serde_struct_tuple::{
    DeserializeStructTuple,
    SerializeStructTuple,
};
use serde_struct_tuple_enum::{
    DeserializeStructTupleEnum,
    SerializeStructTupleEnum,
};

use crate::core::{
    id::Id,
    types::{
        Dictionary,
        Integer,
        List,
    },
    uri::{
        Uri,
        WildcardUri,
    },
};

/// A HELLO message for a peer to initiate a WAMP session in a realm.
#[derive(Debug, Default, Clone, PartialEq, Eq, SerializeStructTuple, DeserializeStructTuple)]
pub struct HelloMessage {
    pub realm: Uri,
    #[serde_struct_tuple(default, skip_serializing_if = Dictionary::is_empty)]
    pub details: Dictionary,
}

/// A WELCOME message for a router to confirm a peer's WAMP session in a realm.
#[derive(Debug, Default, Clone, PartialEq, Eq, SerializeStructTuple, DeserializeStructTuple)]
pub struct WelcomeMessage {
    pub session: Id,
    #[serde_struct_tuple(default, skip_serializing_if = Dictionary::is_empty)]
    pub details: Dictionary,
}

/// An ABORT message for quickly terminating a WAMP session.
#[derive(Debug, Default, Clone, PartialEq, Eq, SerializeStructTuple, DeserializeStructTuple)]
pub struct AbortMessage {
    pub details: Dictionary,
    pub reason: Uri,
    #[serde_struct_tuple(default, skip_serializing_if = List::is_empty)]
    pub arguments: List,
    #[serde_struct_tuple(default, skip_serializing_if = Dictionary::is_empty)]
    pub arguments_keyword: Dictionary,
}

/// A GOODBYE message for ending a WAMP session with a two-way handshake.
#[derive(Debug, Default, Clone, PartialEq, Eq, SerializeStructTuple, DeserializeStructTuple)]
pub struct GoodbyeMessage {
    pub details: Dictionary,
    pub reason: Uri,
}

/// An ERROR message for communicating an error in response to a single request.
#[derive(Debug, Default, Clone, PartialEq, Eq, SerializeStructTuple, DeserializeStructTuple)]
pub struct ErrorMessage {
    pub request_type: Integer,
    pub request: Id,
    pub details: Dictionary,
    pub error: Uri,
    #[serde_struct_tuple(default, skip_serializing_if = List::is_empty)]
    pub arguments: List,
    #[serde_struct_tuple(default, skip_serializing_if = Dictionary::is_empty)]
    pub arguments_keyword: Dictionary,
}

/// A PUBLISH message for publishing an event to a topic.
#[derive(Debug, Default, Clone, PartialEq, Eq, SerializeStructTuple, DeserializeStructTuple)]
pub struct PublishMessage {
    pub request: Id,
    pub options: Dictionary,
    pub topic: Uri,
    #[serde_struct_tuple(default, skip_serializing_if = List::is_empty)]
    pub arguments: List,
    #[serde_struct_tuple(default, skip_serializing_if = Dictionary::is_empty)]
    pub arguments_keyword: Dictionary,
}

/// A PUBLISHED message for confirming an event was published.
#[derive(Debug, Default, Clone, PartialEq, Eq, SerializeStructTuple, DeserializeStructTuple)]
pub struct PublishedMessage {
    pub publish_request: Id,
    pub publication: Id,
}

/// A SUBSCRIBE message for subscribing to a topic.
///
/// The topic may contain empty components for wildcard subscriptions.
#[derive(Debug, Default, Clone, PartialEq, Eq, SerializeStructTuple, DeserializeStructTuple)]
pub struct SubscribeMessage {
    pub request: Id,
    pub options: Dictionary,
    pub topic: WildcardUri,
}

/// A SUBSCRIBED message for confirming a peer has subscribed to a topic.
#[derive(Debug, Default, Clone, PartialEq, Eq, SerializeStructTuple, DeserializeStructTuple)]
pub struct SubscribedMessage {
    pub subscribe_request: Id,
    pub subscription: Id,
}

/// An UNSUBSCRIBE message for unsubscribing from a topic.
#[derive(Debug, Default, Clone, PartialEq, Eq, SerializeStructTuple, DeserializeStructTuple)]
pub struct UnsubscribeMessage {
    pub request: Id,
    pub subscribed_subscription: Id,
}

/// An UNSUBSCRIBED message for confirming a peer has unsubscribed from a topic.
#[derive(Debug, Default, Clone, PartialEq, Eq, SerializeStructTuple, DeserializeStructTuple)]
pub struct UnsubscribedMessage {
    pub unsubscribe_request: Id,
}

/// An EVENT message for relaying a published event to subscribers.
#[derive(Debug, Default, Clone, PartialEq, Eq, SerializeStructTuple, DeserializeStructTuple)]
pub struct EventMessage {
    pub subscribed_subscription: Id,
    pub published_publication: Id,
    pub details: Dictionary,
    #[serde_struct_tuple(default, skip_serializing_if = List::is_empty)]
    pub publish_arguments: List,
    #[serde_struct_tuple(default, skip_serializing_if = Dictionary::is_empty)]
    pub publish_arguments_keyword: Dictionary,
}

/// A CALL message for invoking a procedure.
#[derive(Debug, Default, Clone, PartialEq, Eq, SerializeStructTuple, DeserializeStructTuple)]
pub struct CallMessage {
    pub request: Id,
    pub options: Dictionary,
    pub procedure: Uri,
    #[serde_struct_tuple(default, skip_serializing_if = List::is_empty)]
    pub arguments: List,
    #[serde_struct_tuple(default, skip_serializing_if = Dictionary::is_empty)]
    pub arguments_keyword: Dictionary,
}

/// A CANCEL message for canceling a call in flight.
#[derive(Debug, Default, Clone, PartialEq, Eq, SerializeStructTuple, DeserializeStructTuple)]
pub struct CancelMessage {
    pub call_request: Id,
    #[serde_struct_tuple(default, skip_serializing_if = Dictionary::is_empty)]
    pub options: Dictionary,
}

/// A RESULT message for sending the result of a procedure invocation.
#[derive(Debug, Default, Clone, PartialEq, Eq, SerializeStructTuple, DeserializeStructTuple)]
pub struct ResultMessage {
    pub call_request: Id,
    pub details: Dictionary,
    #[serde_struct_tuple(default, skip_serializing_if = List::is_empty)]
    pub yield_arguments: List,
    #[serde_struct_tuple(default, skip_serializing_if = Dictionary::is_empty)]
    pub yield_arguments_keyword: Dictionary,
}

/// A REGISTER message for registering a procedure in the realm.
#[derive(Debug, Default, Clone, PartialEq, Eq, SerializeStructTuple, DeserializeStructTuple)]
pub struct RegisterMessage {
    pub request: Id,
    pub options: Dictionary,
    pub procedure: Uri,
}

/// A REGISTERED message for confirming a procedure has been registered.
#[derive(Debug, Default, Clone, PartialEq, Eq, SerializeStructTuple, DeserializeStructTuple)]
pub struct RegisteredMessage {
    pub register_request: Id,
    pub registration: Id,
}

/// An UNREGISTER message for unregistering a procedure in the realm.
#[derive(Debug, Default, Clone, PartialEq, Eq, SerializeStructTuple, DeserializeStructTuple)]
pub struct UnregisterMessage {
    pub request: Id,
    pub registered_registration: Id,
}

/// An UNREGISTERED message for confirming a procedure has been unregistered.
#[derive(Debug, Default, Clone, PartialEq, Eq, SerializeStructTuple, DeserializeStructTuple)]
pub struct UnregisteredMessage {
    pub unregister_request: Id,
}

/// An INVOCATION message for invoking a procedure on its callee.
#[derive(Debug, Default, Clone, PartialEq, Eq, SerializeStructTuple, DeserializeStructTuple)]
pub struct InvocationMessage {
    pub request: Id,
    pub registered_registration: Id,
    pub details: Dictionary,
    #[serde_struct_tuple(default, skip_serializing_if = List::is_empty)]
    pub call_arguments: List,
    #[serde_struct_tuple(default, skip_serializing_if = Dictionary::is_empty)]
    pub call_arguments_keyword: Dictionary,
}

/// An INTERRUPT message for asking a callee to stop working on an invocation.
#[derive(Debug, Default, Clone, PartialEq, Eq, SerializeStructTuple, DeserializeStructTuple)]
pub struct InterruptMessage {
    pub invocation_request: Id,
    #[serde_struct_tuple(default, skip_serializing_if = Dictionary::is_empty)]
    pub options: Dictionary,
}

/// A YIELD message for yielding the result of an invocation from the callee.
#[derive(Debug, Default, Clone, PartialEq, Eq, SerializeStructTuple, DeserializeStructTuple)]
pub struct YieldMessage {
    pub invocation_request: Id,
    pub options: Dictionary,
    #[serde_struct_tuple(default, skip_serializing_if = List::is_empty)]
    pub arguments: List,
    #[serde_struct_tuple(default, skip_serializing_if = Dictionary::is_empty)]
    pub arguments_keyword: Dictionary,
}

/// A WAMP message.
#[derive(Debug, Clone, PartialEq, Eq, SerializeStructTupleEnum, DeserializeStructTupleEnum)]
#[tag(Integer)]
pub enum Message {
    #[tag = 1]
    Hello(HelloMessage),
    #[tag = 2]
    Welcome(WelcomeMessage),
    #[tag = 3]
    Abort(AbortMessage),
    #[tag = 6]
    Goodbye(GoodbyeMessage),
    #[tag = 8]
    Error(ErrorMessage),
    #[tag = 16]
    Publish(PublishMessage),
    #[tag = 17]
    Published(PublishedMessage),
    #[tag = 32]
    Subscribe(SubscribeMessage),
    #[tag = 33]
    Subscribed(SubscribedMessage),
    #[tag = 34]
    Unsubscribe(UnsubscribeMessage),
    #[tag = 35]
    Unsubscribed(UnsubscribedMessage),
    #[tag = 36]
    Event(EventMessage),
    #[tag = 48]
    Call(CallMessage),
    #[tag = 49]
    Cancel(CancelMessage),
    #[tag = 50]
    Result(ResultMessage),
    #[tag = 64]
    Register(RegisterMessage),
    #[tag = 65]
    Registered(RegisteredMessage),
    #[tag = 66]
    Unregister(UnregisterMessage),
    #[tag = 67]
    Unregistered(UnregisteredMessage),
    #[tag = 68]
    Invocation(InvocationMessage),
    #[tag = 69]
    Interrupt(InterruptMessage),
    #[tag = 70]
    Yield(YieldMessage),
}

impl Message {
    /// Message code of CALL, used as the request type of errors for calls.
    pub const CALL_CODE: Integer = 48;

    /// Message code of INVOCATION, used as the request type of errors for invocations.
    pub const INVOCATION_CODE: Integer = 68;

    /// The message name, mostly for logging.
    pub fn message_name(&self) -> &'static str {
        match self {
            Self::Hello(_) => "HELLO",
            Self::Welcome(_) => "WELCOME",
            Self::Abort(_) => "ABORT",
            Self::Goodbye(_) => "GOODBYE",
            Self::Error(_) => "ERROR",
            Self::Publish(_) => "PUBLISH",
            Self::Published(_) => "PUBLISHED",
            Self::Subscribe(_) => "SUBSCRIBE",
            Self::Subscribed(_) => "SUBSCRIBED",
            Self::Unsubscribe(_) => "UNSUBSCRIBE",
            Self::Unsubscribed(_) => "UNSUBSCRIBED",
            Self::Event(_) => "EVENT",
            Self::Call(_) => "CALL",
            Self::Cancel(_) => "CANCEL",
            Self::Result(_) => "RESULT",
            Self::Register(_) => "REGISTER",
            Self::Registered(_) => "REGISTERED",
            Self::Unregister(_) => "UNREGISTER",
            Self::Unregistered(_) => "UNREGISTERED",
            Self::Invocation(_) => "INVOCATION",
            Self::Interrupt(_) => "INTERRUPT",
            Self::Yield(_) => "YIELD",
        }
    }

    /// The message code, which is the first element of the encoded message.
    pub fn code(&self) -> Integer {
        match self {
            Self::Hello(_) => 1,
            Self::Welcome(_) => 2,
            Self::Abort(_) => 3,
            Self::Goodbye(_) => 6,
            Self::Error(_) => 8,
            Self::Publish(_) => 16,
            Self::Published(_) => 17,
            Self::Subscribe(_) => 32,
            Self::Subscribed(_) => 33,
            Self::Unsubscribe(_) => 34,
            Self::Unsubscribed(_) => 35,
            Self::Event(_) => 36,
            Self::Call(_) => Self::CALL_CODE,
            Self::Cancel(_) => 49,
            Self::Result(_) => 50,
            Self::Register(_) => 64,
            Self::Registered(_) => 65,
            Self::Unregister(_) => 66,
            Self::Unregistered(_) => 67,
            Self::Invocation(_) => Self::INVOCATION_CODE,
            Self::Interrupt(_) => 69,
            Self::Yield(_) => 70,
        }
    }

    /// The request ID on the message.
    pub fn request_id(&self) -> Option<Id> {
        match self {
            Self::Error(message) => Some(message.request),
            Self::Publish(message) => Some(message.request),
            Self::Published(message) => Some(message.publish_request),
            Self::Subscribe(message) => Some(message.request),
            Self::Subscribed(message) => Some(message.subscribe_request),
            Self::Unsubscribe(message) => Some(message.request),
            Self::Unsubscribed(message) => Some(message.unsubscribe_request),
            Self::Call(message) => Some(message.request),
            Self::Cancel(message) => Some(message.call_request),
            Self::Result(message) => Some(message.call_request),
            Self::Register(message) => Some(message.request),
            Self::Registered(message) => Some(message.register_request),
            Self::Unregister(message) => Some(message.request),
            Self::Unregistered(message) => Some(message.unregister_request),
            Self::Invocation(message) => Some(message.request),
            Self::Interrupt(message) => Some(message.invocation_request),
            Self::Yield(message) => Some(message.invocation_request),
            _ => None,
        }
    }

    /// The details dictionary on the message.
    pub fn details(&self) -> Option<&Dictionary> {
        match self {
            Self::Hello(message) => Some(&message.details),
            Self::Welcome(message) => Some(&message.details),
            Self::Abort(message) => Some(&message.details),
            Self::Goodbye(message) => Some(&message.details),
            Self::Error(message) => Some(&message.details),
            Self::Event(message) => Some(&message.details),
            Self::Result(message) => Some(&message.details),
            Self::Invocation(message) => Some(&message.details),
            _ => None,
        }
    }

    /// The error reason on the message.
    pub fn reason(&self) -> Option<&Uri> {
        match self {
            Self::Abort(message) => Some(&message.reason),
            Self::Goodbye(message) => Some(&message.reason),
            Self::Error(message) => Some(&message.error),
            _ => None,
        }
    }

    /// Checks if the message may only be sent by a router.
    pub fn is_router_only(&self) -> bool {
        matches!(
            self,
            Self::Welcome(_)
                | Self::Published(_)
                | Self::Subscribed(_)
                | Self::Unsubscribed(_)
                | Self::Event(_)
                | Self::Result(_)
                | Self::Registered(_)
                | Self::Unregistered(_)
                | Self::Invocation(_)
                | Self::Interrupt(_)
        )
    }
}

#[cfg(test)]
mod message_test {
    use crate::{
        core::{
            id::Id,
            types::{
                Dictionary,
                List,
                Value,
            },
            uri::Uri,
        },
        message::message::{
            CallMessage,
            CancelMessage,
            ErrorMessage,
            EventMessage,
            HelloMessage,
            InterruptMessage,
            Message,
            YieldMessage,
        },
    };

    #[test]
    fn deserializes_hello_with_optional_details() {
        assert_matches::assert_matches!(serde_json::from_str(r#"
            [1, "com.battler"]
        "#), Ok(Message::Hello(message)) => {
            pretty_assertions::assert_eq!(message, HelloMessage {
                realm: Uri::try_from("com.battler").unwrap(),
                details: Dictionary::default(),
            });
        });

        assert_matches::assert_matches!(serde_json::from_str(r#"
            [1, "com.battler", { "roles": { "caller": {} }, "agent": "test" }]
        "#), Ok(Message::Hello(message)) => {
            pretty_assertions::assert_eq!(message, HelloMessage {
                realm: Uri::try_from("com.battler").unwrap(),
                details: Dictionary::from_iter([
                    ("roles".to_owned(), Value::Dictionary(Dictionary::from_iter([
                        ("caller".to_owned(), Value::Dictionary(Dictionary::default())),
                    ]))),
                    ("agent".to_owned(), Value::String("test".to_owned())),
                ]),
            });
        });
    }

    #[test]
    fn deserializes_call_with_payload() {
        assert_matches::assert_matches!(serde_json::from_str(r#"
            [48, 7814135, {}, "com.myapp.user.new", ["Johnny"], {
                "firstname": "John",
                "surname": "Doe"
            }]
        "#), Ok(Message::Call(message)) => {
            pretty_assertions::assert_eq!(message, CallMessage {
                request: Id::try_from(7814135).unwrap(),
                options: Dictionary::default(),
                procedure: Uri::try_from("com.myapp.user.new").unwrap(),
                arguments: List::from_iter([
                    Value::String("Johnny".to_owned()),
                ]),
                arguments_keyword: Dictionary::from_iter([
                    ("firstname".to_owned(), Value::String("John".to_owned())),
                    ("surname".to_owned(), Value::String("Doe".to_owned())),
                ]),
            });
        });
    }

    #[test]
    fn deserializes_cancel_and_interrupt() {
        assert_matches::assert_matches!(serde_json::from_str(r#"
            [49, 12, { "mode": "kill" }]
        "#), Ok(Message::Cancel(message)) => {
            pretty_assertions::assert_eq!(message, CancelMessage {
                call_request: Id::try_from(12).unwrap(),
                options: Dictionary::from_iter([
                    ("mode".to_owned(), Value::String("kill".to_owned())),
                ]),
            });
        });

        assert_matches::assert_matches!(serde_json::from_str(r#"
            [69, 3]
        "#), Ok(Message::Interrupt(message)) => {
            pretty_assertions::assert_eq!(message, InterruptMessage {
                invocation_request: Id::try_from(3).unwrap(),
                options: Dictionary::default(),
            });
        });
    }

    #[test]
    fn rejects_invalid_messages() {
        assert_matches::assert_matches!(serde_json::from_str::<Message>(r#"[99, 1]"#), Err(_));
        assert_matches::assert_matches!(serde_json::from_str::<Message>(r#"[48, 0, {}, "com.myapp.ping"]"#), Err(_));
        assert_matches::assert_matches!(serde_json::from_str::<Message>(r#"[16, 1, {}, "com.MyApp"]"#), Err(_));
        assert_matches::assert_matches!(serde_json::from_str::<Message>(r#"[32, 1]"#), Err(_));
    }

    #[test]
    fn serializes_error_without_empty_payload() {
        let message = Message::Error(ErrorMessage {
            request_type: Message::CALL_CODE,
            request: Id::try_from(5).unwrap(),
            details: Dictionary::default(),
            error: Uri::try_from("wamp.error.no_such_procedure").unwrap(),
            arguments: List::default(),
            arguments_keyword: Dictionary::default(),
        });
        assert_matches::assert_matches!(serde_json::to_string(&message), Ok(serialized) => {
            assert_eq!(serialized, r#"[8,48,5,{},"wamp.error.no_such_procedure"]"#);
        });
    }

    #[test]
    fn serializes_event_without_empty_keyword_arguments() {
        let message = Message::Event(EventMessage {
            subscribed_subscription: Id::try_from(1).unwrap(),
            published_publication: Id::try_from(2).unwrap(),
            details: Dictionary::default(),
            publish_arguments: List::from_iter([Value::Integer(1)]),
            publish_arguments_keyword: Dictionary::default(),
        });
        assert_matches::assert_matches!(serde_json::to_string(&message), Ok(serialized) => {
            assert_eq!(serialized, r#"[36,1,2,{},[1]]"#);
        });
    }

    #[test]
    fn code_matches_encoded_tag() {
        let messages = [
            Message::Hello(HelloMessage::default()),
            Message::Call(CallMessage::default()),
            Message::Cancel(CancelMessage::default()),
            Message::Interrupt(InterruptMessage::default()),
            Message::Yield(YieldMessage::default()),
        ];
        for message in messages {
            let encoded = serde_json::to_value(&message).unwrap();
            assert_eq!(
                encoded.get(0).and_then(|code| code.as_u64()),
                Some(message.code()),
                "{}",
                message.message_name()
            );
        }
    }

    #[test]
    fn classifies_router_only_messages() {
        assert!(Message::Interrupt(InterruptMessage::default()).is_router_only());
        assert!(!Message::Yield(YieldMessage::default()).is_router_only());
        assert!(!Message::Cancel(CancelMessage::default()).is_router_only());
    }
}
