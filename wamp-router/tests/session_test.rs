mod common;

use std::sync::Arc;

use common::{
    REALM,
    acknowledge,
    hello,
    id,
    join,
    next_message,
    publish_message,
    router_config,
    start_router,
    start_router_with_config,
    subscribe_message,
    uri,
};
use wamp_router::{
    core::{
        close::CloseReason,
        peer_info::ConnectionType,
        types::{
            Dictionary,
            List,
            Value,
        },
    },
    message::message::{
        EventMessage,
        GoodbyeMessage,
        HelloMessage,
        Message,
    },
    router::{
        OutgoingReceiver,
        RouterHandle,
        Session,
    },
    serializer::SerializerType,
};

async fn connect(router: &RouterHandle) -> (Arc<Session>, OutgoingReceiver) {
    router
        .connect(
            SerializerType::Json,
            ConnectionType::Remote("127.0.0.1:8080".to_owned()),
        )
        .await
        .unwrap()
}

async fn connect_and_join(router: &RouterHandle) -> (Arc<Session>, OutgoingReceiver) {
    let (session, mut outgoing) = connect(router).await;
    assert_matches::assert_matches!(router.handle_incoming(&session, hello(REALM)).await, Ok(()));
    assert_matches::assert_matches!(outgoing.recv().await, Some(Message::Welcome(_)));
    (session, outgoing)
}

fn goodbye(reason: &str) -> Message {
    Message::Goodbye(GoodbyeMessage {
        details: Dictionary::default(),
        reason: uri(reason),
    })
}

#[tokio::test]
async fn welcome_announces_router_and_identity() {
    test_utils::setup::setup_test_environment();

    let router = start_router();
    let (session, mut outgoing) = connect(&router).await;
    assert_eq!(session.serializer(), SerializerType::Json);

    let mut hello = hello(REALM);
    if let Message::Hello(hello) = &mut hello {
        hello
            .details
            .insert("authid".to_owned(), Value::String("alice".to_owned()));
    }
    assert_matches::assert_matches!(router.handle_incoming(&session, hello).await, Ok(()));
    assert_matches::assert_matches!(outgoing.recv().await, Some(Message::Welcome(welcome)) => {
        assert_eq!(welcome.session, session.id());
        assert_matches::assert_matches!(welcome.details.get("agent"), Some(Value::String(agent)) => {
            assert!(agent.starts_with("wamp-router-"));
        });
        pretty_assertions::assert_eq!(welcome.details.get("authid"), Some(&Value::String("alice".to_owned())));
        pretty_assertions::assert_eq!(welcome.details.get("authrole"), Some(&Value::String("anonymous".to_owned())));
        pretty_assertions::assert_eq!(welcome.details.get("authmethod"), Some(&Value::String("anonymous".to_owned())));
        assert_matches::assert_matches!(welcome.details.get("roles"), Some(Value::Dictionary(roles)) => {
            assert!(roles.contains_key("broker"));
            assert!(roles.contains_key("dealer"));
        });
    });
    assert!(session.established().await);
    assert_eq!(session.identity().await.unwrap().id, "alice");
    assert_eq!(session.realm().await.unwrap().uri().as_ref(), REALM);
}

#[tokio::test]
async fn aborts_join_to_missing_realm() {
    test_utils::setup::setup_test_environment();

    let mut config = router_config();
    config.auto_create_realms = false;
    let router = start_router_with_config(config);
    let (session, mut outgoing) = connect(&router).await;

    assert_matches::assert_matches!(
        router
            .handle_incoming(&session, hello("com.battler.missing"))
            .await,
        Err(_)
    );
    assert_matches::assert_matches!(outgoing.recv().await, Some(Message::Abort(abort)) => {
        assert_eq!(abort.reason.as_ref(), "wamp.error.no_such_realm");
    });
    assert_matches::assert_matches!(outgoing.recv().await, None);
    assert!(session.closed().await);
    assert!(router.snapshot().await.realm("com.battler.missing").is_none());
}

#[tokio::test]
async fn aborts_join_with_unknown_role() {
    test_utils::setup::setup_test_environment();

    let router = start_router();
    let (session, mut outgoing) = connect(&router).await;
    let hello = Message::Hello(HelloMessage {
        realm: uri(REALM),
        details: Dictionary::from_iter([(
            "roles".to_owned(),
            Value::Dictionary(Dictionary::from_iter([(
                "spectator".to_owned(),
                Value::Dictionary(Dictionary::default()),
            )])),
        )]),
    });
    assert_matches::assert_matches!(router.handle_incoming(&session, hello).await, Err(_));
    assert_matches::assert_matches!(outgoing.recv().await, Some(Message::Abort(abort)) => {
        assert_eq!(abort.reason.as_ref(), "wamp.error.no_such_role");
    });
    assert!(router.snapshot().await.realm(REALM).unwrap().sessions.is_empty());
}

#[tokio::test]
async fn aborts_session_that_skips_hello() {
    test_utils::setup::setup_test_environment();

    let router = start_router();
    let (session, mut outgoing) = connect(&router).await;
    assert_matches::assert_matches!(
        router
            .handle_incoming(&session, subscribe_message(1, "chat.room1", Dictionary::default()))
            .await,
        Err(_)
    );
    assert_matches::assert_matches!(outgoing.recv().await, Some(Message::Abort(abort)) => {
        assert_eq!(abort.reason.as_ref(), "wamp.error.protocol_violation");
    });
    assert_matches::assert_matches!(outgoing.recv().await, None);

    // Messages after closing are dropped.
    assert_matches::assert_matches!(router.handle_incoming(&session, hello(REALM)).await, Ok(()));
}

#[tokio::test]
async fn aborts_established_session_on_protocol_violation() {
    test_utils::setup::setup_test_environment();

    let router = start_router();
    for message in [
        hello(REALM),
        Message::Event(EventMessage {
            subscribed_subscription: id(1),
            published_publication: id(1),
            ..Default::default()
        }),
    ] {
        let (session, mut outgoing) = connect_and_join(&router).await;
        assert_matches::assert_matches!(
            router
                .handle_incoming(&session, subscribe_message(1, "chat.room1", Dictionary::default()))
                .await,
            Ok(())
        );
        assert_matches::assert_matches!(outgoing.recv().await, Some(Message::Subscribed(_)));

        assert_matches::assert_matches!(router.handle_incoming(&session, message).await, Err(_));
        assert_matches::assert_matches!(outgoing.recv().await, Some(Message::Abort(abort)) => {
            assert_eq!(abort.reason.as_ref(), "wamp.error.protocol_violation");
        });
        assert_matches::assert_matches!(outgoing.recv().await, None);
    }

    let snapshot = router.snapshot().await;
    let realm = snapshot.realm(REALM).unwrap();
    assert!(realm.sessions.is_empty());
    assert!(realm.subscriptions.is_empty());
}

#[tokio::test]
async fn goodbye_from_peer_closes_session() {
    test_utils::setup::setup_test_environment();

    let router = start_router();
    let (session, mut outgoing) = connect_and_join(&router).await;
    let mut closed_rx = session.closed_rx();

    assert_matches::assert_matches!(
        router
            .handle_incoming(&session, goodbye("wamp.close.normal"))
            .await,
        Ok(())
    );
    assert_matches::assert_matches!(outgoing.recv().await, Some(Message::Goodbye(goodbye)) => {
        assert_eq!(goodbye.reason.as_ref(), "wamp.close.goodbye_and_out");
    });
    assert_matches::assert_matches!(outgoing.recv().await, None);
    assert_matches::assert_matches!(closed_rx.recv().await, Ok(()));
    assert!(session.closed().await);
}

#[tokio::test]
async fn router_initiated_close_waits_for_peer_goodbye() {
    test_utils::setup::setup_test_environment();

    let router = start_router();
    let (session, mut outgoing) = connect_and_join(&router).await;

    assert_matches::assert_matches!(
        router.close_session(&session, CloseReason::Normal).await,
        Ok(())
    );
    assert_matches::assert_matches!(outgoing.recv().await, Some(Message::Goodbye(goodbye)) => {
        assert_eq!(goodbye.reason.as_ref(), "wamp.close.normal");
    });
    assert!(!session.established().await);
    assert!(!session.closed().await);

    // Anything but GOODBYE is ignored while closing.
    assert_matches::assert_matches!(
        router
            .handle_incoming(&session, subscribe_message(1, "chat.room1", Dictionary::default()))
            .await,
        Ok(())
    );
    assert_matches::assert_matches!(
        router
            .handle_incoming(&session, goodbye("wamp.close.goodbye_and_out"))
            .await,
        Ok(())
    );
    assert_matches::assert_matches!(outgoing.recv().await, None);
    assert!(session.closed().await);
    assert_matches::assert_matches!(
        router.close_session(&session, CloseReason::Normal).await,
        Err(_)
    );
}

#[tokio::test]
async fn disconnect_is_idempotent() {
    test_utils::setup::setup_test_environment();

    let router = start_router();
    let (session, mut outgoing) = connect_and_join(&router).await;
    assert_matches::assert_matches!(
        router
            .handle_incoming(&session, subscribe_message(1, "chat.room1", Dictionary::default()))
            .await,
        Ok(())
    );
    router.disconnect(&session).await;
    router.disconnect(&session).await;
    assert_matches::assert_matches!(outgoing.recv().await, Some(Message::Subscribed(_)));
    assert_matches::assert_matches!(outgoing.recv().await, None);

    let snapshot = router.snapshot().await;
    let realm = snapshot.realm(REALM).unwrap();
    assert!(realm.sessions.is_empty());
    assert!(realm.subscriptions.is_empty());
}

#[tokio::test]
async fn rejects_disallowed_serializer() {
    test_utils::setup::setup_test_environment();

    let mut config = router_config();
    config.serializers.remove(&SerializerType::MessagePack);
    let router = start_router_with_config(config);
    assert_matches::assert_matches!(
        router
            .connect(SerializerType::MessagePack, ConnectionType::Direct)
            .await,
        Err(_)
    );
    assert_matches::assert_matches!(
        router.connect(SerializerType::Json, ConnectionType::Direct).await,
        Ok(_)
    );
}

#[tokio::test]
async fn close_session_stops_routing_to_session() {
    test_utils::setup::setup_test_environment();

    let router = start_router();
    let (mut publisher, _) = join(&router, REALM).await;
    let (session, mut outgoing) = connect_and_join(&router).await;
    router
        .handle_incoming(
            &session,
            subscribe_message(1, "chat.room1", Dictionary::default()),
        )
        .await
        .unwrap();
    assert_matches::assert_matches!(outgoing.recv().await, Some(Message::Subscribed(_)));

    assert_matches::assert_matches!(
        router.close_session(&session, CloseReason::Normal).await,
        Ok(())
    );
    publisher
        .send(publish_message(1, "chat.room1", acknowledge(), List::default()))
        .unwrap();
    assert_matches::assert_matches!(next_message(&mut publisher).await, Message::Published(_));
    assert_matches::assert_matches!(outgoing.recv().await, Some(Message::Goodbye(goodbye)) => {
        assert_eq!(goodbye.reason.as_ref(), "wamp.close.normal");
    });
    assert_matches::assert_matches!(outgoing.try_recv(), None);

    assert_matches::assert_matches!(
        router
            .handle_incoming(&session, goodbye("wamp.close.goodbye_and_out"))
            .await,
        Ok(())
    );
    assert_matches::assert_matches!(outgoing.recv().await, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn no_event_follows_goodbye_under_concurrent_publishing() {
    test_utils::setup::setup_test_environment();

    let router = start_router();
    let (publisher, _) = join(&router, REALM).await;
    for round in 0..50 {
        let (session, mut outgoing) = connect_and_join(&router).await;
        router
            .handle_incoming(
                &session,
                subscribe_message(1, "chat.room1", Dictionary::default()),
            )
            .await
            .unwrap();
        assert_matches::assert_matches!(outgoing.recv().await, Some(Message::Subscribed(_)));

        for request in 1..=200 {
            publisher
                .send(publish_message(
                    request,
                    "chat.room1",
                    Dictionary::default(),
                    List::default(),
                ))
                .unwrap();
        }
        if round % 2 == 0 {
            router
                .handle_incoming(&session, goodbye("wamp.close.normal"))
                .await
                .unwrap();
        } else {
            router
                .close_session(&session, CloseReason::Normal)
                .await
                .unwrap();
            router
                .handle_incoming(&session, goodbye("wamp.close.goodbye_and_out"))
                .await
                .unwrap();
        }

        let mut messages = Vec::new();
        while let Some(message) = outgoing.recv().await {
            messages.push(message);
        }
        let goodbye_at = messages
            .iter()
            .position(|message| matches!(message, Message::Goodbye(_)))
            .unwrap();
        assert!(
            messages[goodbye_at + 1..]
                .iter()
                .all(|message| !matches!(message, Message::Event(_))),
            "round {round} routed EVENT after GOODBYE"
        );
    }
    assert_matches::assert_matches!(publisher.close().await, Ok(()));
}
