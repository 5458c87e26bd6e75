use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tungstenite::protocol::Message as WsMessage;

use crate::model::{MessageDescription, NodeIdentity, PubsubType};
use crate::subscriber::{
    AckOutcome, Acknowledger, Credentials, ServiceOptions, ServiceState, SubscriberBuilder,
    SubscriberService,
};
use crate::transport::memory::MemoryService;
use crate::transport::message::{ClientMessage, ServerMessage};
use crate::transport::websocket::WebSocketService;
use crate::utils::error::SubscriptionFailure;

fn options(name: &str, credentials: Option<Credentials>) -> ServiceOptions {
    ServiceOptions {
        project: "proj1".to_string(),
        name: name.to_string(),
        credentials,
        max_ack_extension_period: None,
    }
}

async fn read_client_message(
    ws: &mut tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
) -> ClientMessage {
    loop {
        let frame = ws
            .next()
            .await
            .expect("client closed the connection")
            .expect("websocket error");
        if let WsMessage::Text(text) = frame {
            return serde_json::from_str(text.as_str()).expect("client frame");
        }
    }
}

async fn send_server_message(
    ws: &mut tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    message: &ServerMessage,
) {
    ws.send(WsMessage::text(serde_json::to_string(message).unwrap()))
        .await
        .expect("send server frame");
}

async fn wait_for_state<S: SubscriberService>(service: &S, state: ServiceState) {
    for _ in 0..200 {
        if service.state() == state {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("service never reached {state}, stuck in {}", service.state());
}

#[test]
fn test_client_message_wire_format() {
    let ack = ClientMessage::Ack {
        message_id: "m-1".to_string(),
    };
    assert_eq!(
        serde_json::to_value(&ack).unwrap(),
        serde_json::json!({"type": "ack", "message_id": "m-1"})
    );
}

#[test]
fn test_server_message_parses_broker_frame() {
    let frame = r#"{"type":"message","topic":"chat","payload":"hi","timestamp":1725000000000,"message_id":"abc","qos":1}"#;
    let parsed: ServerMessage = serde_json::from_str(frame).unwrap();
    assert_eq!(
        parsed,
        ServerMessage::Message {
            topic: "chat".to_string(),
            payload: "hi".to_string(),
            timestamp: 1_725_000_000_000,
            message_id: "abc".to_string(),
            qos: 1,
        }
    );
}

#[test]
fn test_memory_service_lifecycle() {
    let service = MemoryService::new(PubsubType::Google);
    assert_eq!(service.state(), ServiceState::New);
    assert!(service.publish("dropped").is_none());

    let received = Arc::new(AtomicUsize::new(0));
    let counter = received.clone();
    let subscriber = SubscriberBuilder::new("sub1", "proj1")
        .node_identity(NodeIdentity::new("node-a"))
        .handler(Arc::new(
            move |_: MessageDescription, ack: Acknowledger, _: &NodeIdentity| {
                counter.fetch_add(1, Ordering::SeqCst);
                ack.nack();
            },
        ))
        .build(MemoryService::factory(PubsubType::Google))
        .unwrap();
    let service = subscriber.service().clone();

    subscriber.start();
    assert_eq!(service.state(), ServiceState::Running);

    service.publish("first").unwrap().join().unwrap();
    assert_eq!(service.pending_redeliveries(), 1);
    for handle in service.redeliver_nacked() {
        handle.join().unwrap();
    }
    assert_eq!(received.load(Ordering::SeqCst), 2);
    assert_eq!(service.settle_calls(), 2);

    subscriber.stop();
    assert_eq!(service.state(), ServiceState::Terminated);
    assert!(service.publish("late").is_none());
}

#[tokio::test]
async fn test_websocket_subscribe_receive_and_ack() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel::<ClientMessage>();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        assert_eq!(
            read_client_message(&mut ws).await,
            ClientMessage::Login {
                username: "admin".to_string(),
                password: "password".to_string(),
            }
        );
        send_server_message(
            &mut ws,
            &ServerMessage::LoginResponse {
                token: "t0k3n".to_string(),
            },
        )
        .await;
        assert_eq!(
            read_client_message(&mut ws).await,
            ClientMessage::Auth {
                token: "t0k3n".to_string()
            }
        );
        send_server_message(&mut ws, &ServerMessage::Authenticated {}).await;

        let subscribe = read_client_message(&mut ws).await;
        seen_tx.send(subscribe).unwrap();

        send_server_message(
            &mut ws,
            &ServerMessage::Message {
                topic: "sub1".to_string(),
                payload: r#"{"artifacts":[{"type":"docker/image","name":"app"}]}"#.to_string(),
                timestamp: 1_725_000_000_000,
                message_id: "msg-1".to_string(),
                qos: 1,
            },
        )
        .await;

        let ack = read_client_message(&mut ws).await;
        seen_tx.send(ack).unwrap();
        // keep the socket open until the client unsubscribes
        let unsubscribe = read_client_message(&mut ws).await;
        seen_tx.send(unsubscribe).unwrap();
    });

    let (desc_tx, mut desc_rx) = mpsc::unbounded_channel::<MessageDescription>();
    let credentials = Credentials::Password {
        username: "admin".to_string(),
        password: "password".to_string(),
    };
    let service = Arc::new(WebSocketService::new(
        format!("ws://{addr}"),
        options("sub1", Some(credentials)),
    ));
    let receiver = Arc::new(crate::subscriber::MessageReceiver::new(
        "projects/proj1/subscriptions/sub1",
        PubsubType::Popsub,
        10,
        Arc::new(
            move |description: MessageDescription, ack: Acknowledger, _: &NodeIdentity| {
                assert!(ack.ack());
                desc_tx.send(description).unwrap();
            },
        ),
        Arc::new(crate::artifacts::MessageArtifactTranslator::new()),
        NodeIdentity::new("node-a"),
    ));
    service.start(receiver);

    let subscribe = tokio::time::timeout(Duration::from_secs(5), seen_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        subscribe,
        ClientMessage::Subscribe {
            topic: "sub1".to_string()
        }
    );

    let description = tokio::time::timeout(Duration::from_secs(5), desc_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(description.message_id, "msg-1");
    assert_eq!(description.pubsub_type, PubsubType::Popsub);
    assert_eq!(description.artifacts.len(), 1);
    assert_eq!(description.attributes.get("topic").map(String::as_str), Some("sub1"));

    let ack = tokio::time::timeout(Duration::from_secs(5), seen_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        ack,
        ClientMessage::Ack {
            message_id: "msg-1".to_string()
        }
    );

    wait_for_state(service.as_ref(), ServiceState::Running).await;
    service.stop();
    service.join().await;
    assert_eq!(service.state(), ServiceState::Terminated);
}

#[tokio::test]
async fn test_websocket_rejected_auth_fails_subscription() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let _auth = read_client_message(&mut ws).await;
        send_server_message(
            &mut ws,
            &ServerMessage::Error {
                message: "authentication failed".to_string(),
            },
        )
        .await;
    });

    let subscriber = SubscriberBuilder::new("sub1", "proj1")
        .node_identity(NodeIdentity::new("node-a"))
        .handler(Arc::new(
            |_: MessageDescription, _: Acknowledger, _: &NodeIdentity| {},
        ))
        .build(|_| {
            WebSocketService::new(
                format!("ws://{addr}"),
                options(
                    "sub1",
                    Some(Credentials::Token {
                        token: "invalid.token.here".to_string(),
                    }),
                ),
            )
        })
        .unwrap();

    subscriber.start();
    subscriber.service().join().await;

    assert_eq!(subscriber.state(), ServiceState::Failed);
    let failures = subscriber.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].subscription_name, "projects/proj1/subscriptions/sub1");
    assert_eq!(
        failures[0].cause,
        SubscriptionFailure::AuthenticationRejected("authentication failed".to_string())
    );
}

#[tokio::test]
async fn test_websocket_connection_refused_fails_subscription() {
    // bind then drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let service = WebSocketService::new(format!("ws://{addr}"), options("sub1", None));
    let receiver = Arc::new(crate::subscriber::MessageReceiver::new(
        "projects/proj1/subscriptions/sub1",
        PubsubType::Popsub,
        10,
        Arc::new(|_: MessageDescription, _: Acknowledger, _: &NodeIdentity| {}),
        Arc::new(crate::artifacts::MessageArtifactTranslator::new()),
        NodeIdentity::new("node-a"),
    ));
    service.start(receiver);
    service.join().await;

    assert_eq!(service.state(), ServiceState::Failed);
}

#[test]
fn test_memory_outcome_records_first_settle_only() {
    let subscriber = SubscriberBuilder::new("sub1", "proj1")
        .node_identity(NodeIdentity::new("node-a"))
        .handler(Arc::new(
            |_: MessageDescription, ack: Acknowledger, _: &NodeIdentity| {
                assert!(ack.ack());
                assert!(!ack.nack());
            },
        ))
        .build(MemoryService::factory(PubsubType::Google))
        .unwrap();
    subscriber.start();

    let service = subscriber.service();
    let mut message = crate::subscriber::PubsubMessage::new("m-1", "payload");
    message.attributes.insert("origin".to_string(), "test".to_string());
    service.deliver(message).unwrap().join().unwrap();

    assert_eq!(service.outcome("m-1"), Some(AckOutcome::Acked));
    assert_eq!(service.settle_calls(), 1);
    assert_eq!(service.pending_redeliveries(), 0);
}

#[tokio::test]
async fn test_websocket_broker_error_frame_is_the_failure_cause() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let _subscribe = read_client_message(&mut ws).await;
        send_server_message(
            &mut ws,
            &ServerMessage::Error {
                message: "must authenticate first".to_string(),
            },
        )
        .await;
        let _ = ws.close(None).await;
    });

    let subscriber = SubscriberBuilder::new("sub1", "proj1")
        .node_identity(NodeIdentity::new("node-a"))
        .handler(Arc::new(
            |_: MessageDescription, _: Acknowledger, _: &NodeIdentity| {},
        ))
        .build(|_| WebSocketService::new(format!("ws://{addr}"), options("sub1", None)))
        .unwrap();

    subscriber.start();
    subscriber.service().join().await;

    assert_eq!(subscriber.state(), ServiceState::Failed);
    let failures = subscriber.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].from, ServiceState::Running);
    assert_eq!(
        failures[0].cause,
        SubscriptionFailure::AuthenticationRejected("must authenticate first".to_string())
    );
    assert!(subscriber.ensure_not_failed().is_err());
}

#[test]
fn test_broker_error_reasons_map_to_failures() {
    use crate::transport::websocket::broker_error;

    assert_eq!(
        broker_error("invalid credentials".to_string()),
        SubscriptionFailure::AuthenticationRejected("invalid credentials".to_string())
    );
    assert_eq!(
        broker_error("topic sub1 not found".to_string()),
        SubscriptionFailure::SubscriptionNotFound("topic sub1 not found".to_string())
    );
    assert_eq!(
        broker_error("rate limited".to_string()),
        SubscriptionFailure::Transport("rate limited".to_string())
    );
}

#[test]
fn test_nacked_messages_survive_redelivery_while_stopped() {
    let subscriber = SubscriberBuilder::new("sub1", "proj1")
        .node_identity(NodeIdentity::new("node-a"))
        .handler(Arc::new(
            |_: MessageDescription, ack: Acknowledger, _: &NodeIdentity| {
                ack.nack();
            },
        ))
        .build(MemoryService::factory(PubsubType::Google))
        .unwrap();
    subscriber.start();
    let service = subscriber.service().clone();

    service.publish("retry me").unwrap().join().unwrap();
    assert_eq!(service.pending_redeliveries(), 1);

    service.fail(SubscriptionFailure::ConnectionLost("gone".to_string()));
    assert!(service.redeliver_nacked().is_empty());
    assert_eq!(service.pending_redeliveries(), 1);
}
