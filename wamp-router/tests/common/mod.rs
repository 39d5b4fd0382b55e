#![allow(unused)]

use std::time::Duration;

use wamp_router::{
    auth::AnonymousAuthenticator,
    core::{
        id::Id,
        types::{
            Dictionary,
            List,
            Value,
        },
        uri::{
            Uri,
            WildcardUri,
        },
    },
    message::message::{
        CallMessage,
        HelloMessage,
        Message,
        PublishMessage,
        RegisterMessage,
        SubscribeMessage,
        YieldMessage,
    },
    router::{
        DirectConnection,
        EmptyPubSubPolicies,
        EmptyRpcPolicies,
        RealmConfig,
        Router,
        RouterConfig,
        RouterHandle,
    },
};

pub const REALM: &str = "com.battler.test";

pub fn id(value: u64) -> Id {
    Id::try_from(value).unwrap()
}

pub fn uri(value: &str) -> Uri {
    Uri::try_from(value).unwrap()
}

pub fn router_config() -> RouterConfig {
    let mut config = RouterConfig::default();
    config.realms.push(RealmConfig {
        name: "test".to_owned(),
        uri: uri(REALM),
    });
    config
}

pub fn start_router_with_config(config: RouterConfig) -> RouterHandle {
    Router::new(
        config,
        Box::new(EmptyPubSubPolicies::default()),
        Box::new(EmptyRpcPolicies::default()),
        Box::new(AnonymousAuthenticator::default()),
    )
    .unwrap()
    .start()
}

pub fn start_router() -> RouterHandle {
    start_router_with_config(router_config())
}

pub fn hello(realm: &str) -> Message {
    Message::Hello(HelloMessage {
        realm: uri(realm),
        details: Dictionary::from_iter([(
            "roles".to_owned(),
            Value::Dictionary(Dictionary::from_iter(
                ["publisher", "subscriber", "caller", "callee"]
                    .into_iter()
                    .map(|role| (role.to_owned(), Value::Dictionary(Dictionary::default()))),
            )),
        )]),
    })
}

/// Receives the next message, failing the test if none arrives soon.
pub async fn next_message(connection: &mut DirectConnection) -> Message {
    tokio::time::timeout(Duration::from_secs(5), connection.recv())
        .await
        .expect("timed out waiting for message")
        .expect("connection closed")
}

/// Connects a peer and joins the realm, returning the connection and its session ID.
pub async fn join(router: &RouterHandle, realm: &str) -> (DirectConnection, Id) {
    let mut connection = router.direct_connect().await.unwrap();
    connection.send(hello(realm)).unwrap();
    let session = match next_message(&mut connection).await {
        Message::Welcome(welcome) => welcome.session,
        message => panic!("expected WELCOME, got {message:?}"),
    };
    (connection, session)
}

pub fn subscribe_message(request: u64, topic: &str, options: Dictionary) -> Message {
    Message::Subscribe(SubscribeMessage {
        request: id(request),
        options,
        topic: WildcardUri::try_from(topic).unwrap(),
    })
}

/// Subscribes to a topic, returning the subscription ID.
pub async fn subscribe(connection: &mut DirectConnection, request: u64, topic: &str) -> Id {
    connection
        .send(subscribe_message(request, topic, Dictionary::default()))
        .unwrap();
    match next_message(connection).await {
        Message::Subscribed(subscribed) => {
            assert_eq!(subscribed.subscribe_request, id(request));
            subscribed.subscription
        }
        message => panic!("expected SUBSCRIBED, got {message:?}"),
    }
}

pub fn publish_message(request: u64, topic: &str, options: Dictionary, arguments: List) -> Message {
    Message::Publish(PublishMessage {
        request: id(request),
        options,
        topic: uri(topic),
        arguments,
        arguments_keyword: Dictionary::default(),
    })
}

pub fn acknowledge() -> Dictionary {
    Dictionary::from_iter([("acknowledge".to_owned(), Value::Bool(true))])
}

/// Registers a procedure, returning the registration ID.
pub async fn register(
    connection: &mut DirectConnection,
    request: u64,
    procedure: &str,
    options: Dictionary,
) -> Id {
    connection
        .send(Message::Register(RegisterMessage {
            request: id(request),
            options,
            procedure: uri(procedure),
        }))
        .unwrap();
    match next_message(connection).await {
        Message::Registered(registered) => {
            assert_eq!(registered.register_request, id(request));
            registered.registration
        }
        message => panic!("expected REGISTERED, got {message:?}"),
    }
}

pub fn call_message(request: u64, procedure: &str, arguments: List) -> Message {
    Message::Call(CallMessage {
        request: id(request),
        options: Dictionary::default(),
        procedure: uri(procedure),
        arguments,
        arguments_keyword: Dictionary::default(),
    })
}

pub fn yield_message(invocation: Id, arguments: List) -> Message {
    Message::Yield(YieldMessage {
        invocation_request: invocation,
        options: Dictionary::default(),
        arguments,
        arguments_keyword: Dictionary::default(),
    })
}
