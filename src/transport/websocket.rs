//! WebSocket binding for a popsub broker.
//!
//! The service runs one connection task per subscription:
//! - connect to the broker URL
//! - if credentials were supplied, `login` (password credentials) and `auth`
//!   with the resulting token; an `error` reply fails the subscription with
//!   `AuthenticationRejected`
//! - `subscribe` to the topic named by the short subscription name
//! - dispatch each `message` frame to the receiver on a blocking task
//!
//! Acks for QoS 1 messages are sent back as `ack` frames. A nack sends
//! nothing: the broker keeps the message pending and its retry loop
//! redelivers it. Losing the connection while running fails the
//! subscription with `ConnectionLost`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::DateTime;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Notify, mpsc, watch};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::model::PubsubType;
use crate::subscriber::{
    AckReplyConsumer, Credentials, DeliveryCallback, Lifecycle, PubsubMessage, ServiceListener,
    ServiceOptions, ServiceState, SubscriberService,
};
use crate::transport::message::{ClientMessage, ServerMessage};
use crate::utils::error::SubscriptionFailure;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type WsSource = SplitStream<WsStream>;

pub struct WebSocketService {
    url: String,
    topic: String,
    credentials: Option<Credentials>,
    lifecycle: Arc<Lifecycle>,
    shutdown: Arc<Notify>,
    finished: Arc<watch::Sender<bool>>,
}

impl WebSocketService {
    pub fn new(url: impl Into<String>, options: ServiceOptions) -> Self {
        Self {
            url: url.into(),
            topic: options.name,
            credentials: options.credentials,
            lifecycle: Arc::new(Lifecycle::new()),
            shutdown: Arc::new(Notify::new()),
            finished: Arc::new(watch::channel(false).0),
        }
    }

    /// Factory for [`SubscriberBuilder::build`](crate::subscriber::SubscriberBuilder::build).
    pub fn factory(url: impl Into<String>) -> impl FnOnce(ServiceOptions) -> WebSocketService {
        let url = url.into();
        move |options| WebSocketService::new(url, options)
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Waits for the connection task to finish, after `stop()` or a failure.
    /// Returns at once if the service was never started.
    pub async fn join(&self) {
        let mut finished = self.finished.subscribe();
        if self.lifecycle.state() == ServiceState::New {
            return;
        }
        let _ = finished.wait_for(|done| *done).await;
    }
}

impl SubscriberService for WebSocketService {
    fn pubsub_type(&self) -> PubsubType {
        PubsubType::Popsub
    }

    fn add_listener(&self, listener: Arc<dyn ServiceListener>) {
        self.lifecycle.add_listener(listener);
    }

    fn start(&self, receiver: Arc<dyn DeliveryCallback>) {
        if !self.lifecycle.transition(ServiceState::Starting) {
            warn!("Service cannot start from {}", self.lifecycle.state());
            return;
        }
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                self.lifecycle
                    .fail(SubscriptionFailure::Transport(e.to_string()));
                self.finished.send_replace(true);
                return;
            }
        };

        let connection = Connection {
            url: self.url.clone(),
            topic: self.topic.clone(),
            credentials: self.credentials.clone(),
            lifecycle: self.lifecycle.clone(),
            shutdown: self.shutdown.clone(),
            receiver,
        };
        let finished = self.finished.clone();
        runtime.spawn(async move {
            let lifecycle = connection.lifecycle.clone();
            let topic = connection.topic.clone();
            if let Err(failure) = connection.run().await {
                warn!("Subscription to {} ended: {}", topic, failure);
                lifecycle.fail(failure);
            }
            finished.send_replace(true);
        });
    }

    fn stop(&self) {
        if self.lifecycle.state() == ServiceState::New {
            self.lifecycle.transition(ServiceState::Terminated);
            self.finished.send_replace(true);
            return;
        }
        if self.lifecycle.transition(ServiceState::Stopping) {
            self.shutdown.notify_one();
        }
    }

    fn state(&self) -> ServiceState {
        self.lifecycle.state()
    }
}

struct Connection {
    url: String,
    topic: String,
    credentials: Option<Credentials>,
    lifecycle: Arc<Lifecycle>,
    shutdown: Arc<Notify>,
    receiver: Arc<dyn DeliveryCallback>,
}

impl Connection {
    async fn run(self) -> Result<(), SubscriptionFailure> {
        let (ws_stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| SubscriptionFailure::ConnectionLost(e.to_string()))?;
        let (mut sink, mut source) = ws_stream.split();

        if let Some(credentials) = &self.credentials {
            authenticate(&mut sink, &mut source, credentials).await?;
        }
        send(
            &mut sink,
            &ClientMessage::Subscribe {
                topic: self.topic.clone(),
            },
        )
        .await?;

        if !self.lifecycle.transition(ServiceState::Running) {
            // stopped during the handshake
            let _ = sink.close().await;
            self.lifecycle.transition(ServiceState::Terminated);
            return Ok(());
        }
        info!("Subscribed to {} on {}", self.topic, self.url);

        let (acks_tx, mut acks_rx) = mpsc::unbounded_channel::<ClientMessage>();
        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    let unsubscribe = ClientMessage::Unsubscribe { topic: self.topic.clone() };
                    if let Err(e) = send(&mut sink, &unsubscribe).await {
                        debug!("Unsubscribe from {} not delivered: {}", self.topic, e);
                    }
                    let _ = sink.close().await;
                    self.lifecycle.transition(ServiceState::Terminated);
                    return Ok(());
                }
                Some(outgoing) = acks_rx.recv() => {
                    send(&mut sink, &outgoing).await?;
                }
                frame = source.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        self.on_frame(text.as_str(), &acks_tx)?;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        return Err(SubscriptionFailure::ConnectionLost(
                            "connection closed by broker".to_string(),
                        ));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        return Err(SubscriptionFailure::ConnectionLost(e.to_string()));
                    }
                },
            }
        }
    }

    /// Dispatches one broker frame. An `error` frame ends the subscription,
    /// the broker closes the socket right after sending one.
    fn on_frame(
        &self,
        text: &str,
        acks: &mpsc::UnboundedSender<ClientMessage>,
    ) -> Result<(), SubscriptionFailure> {
        match serde_json::from_str::<ServerMessage>(text) {
            Ok(ServerMessage::Message {
                topic,
                payload,
                timestamp,
                message_id,
                qos,
            }) => {
                let mut attributes = BTreeMap::new();
                attributes.insert("topic".to_string(), topic);
                attributes.insert("qos".to_string(), qos.to_string());
                let message = PubsubMessage {
                    message_id: message_id.clone(),
                    data: payload.into_bytes(),
                    attributes,
                    publish_time: DateTime::from_timestamp_millis(timestamp),
                };
                let consumer = WebSocketAckConsumer {
                    message_id,
                    qos,
                    acks: acks.clone(),
                };
                let receiver = self.receiver.clone();
                tokio::task::spawn_blocking(move || {
                    receiver.receive_message(message, Box::new(consumer))
                });
            }
            Ok(ServerMessage::Error { message }) => {
                warn!("Broker reported an error on {}: {}", self.topic, message);
                return Err(broker_error(message));
            }
            Ok(other) => debug!("Ignoring frame on {}: {:?}", self.topic, other),
            Err(e) => warn!("Invalid broker frame: {} | {}", e, text),
        }
        Ok(())
    }
}

/// Maps the reason of a broker `error` frame to a subscription failure.
pub(crate) fn broker_error(message: String) -> SubscriptionFailure {
    let reason = message.to_lowercase();
    if reason.contains("authenticat") || reason.contains("credentials") || reason.contains("token")
    {
        SubscriptionFailure::AuthenticationRejected(message)
    } else if reason.contains("not found") || reason.contains("unknown topic") {
        SubscriptionFailure::SubscriptionNotFound(message)
    } else {
        SubscriptionFailure::Transport(message)
    }
}

async fn authenticate(
    sink: &mut WsSink,
    source: &mut WsSource,
    credentials: &Credentials,
) -> Result<(), SubscriptionFailure> {
    let token = match credentials {
        Credentials::Token { token } => token.clone(),
        Credentials::Password { username, password } => {
            let login = ClientMessage::Login {
                username: username.clone(),
                password: password.clone(),
            };
            send(sink, &login).await?;
            match next_server_message(source).await? {
                ServerMessage::LoginResponse { token } => token,
                ServerMessage::Error { message } => {
                    return Err(SubscriptionFailure::AuthenticationRejected(message));
                }
                other => {
                    return Err(SubscriptionFailure::Transport(format!(
                        "unexpected reply to login: {other:?}"
                    )));
                }
            }
        }
    };

    send(sink, &ClientMessage::Auth { token }).await?;
    match next_server_message(source).await? {
        ServerMessage::Authenticated {} => Ok(()),
        ServerMessage::Error { message } => Err(SubscriptionFailure::AuthenticationRejected(message)),
        other => Err(SubscriptionFailure::Transport(format!(
            "unexpected reply to auth: {other:?}"
        ))),
    }
}

async fn next_server_message(source: &mut WsSource) -> Result<ServerMessage, SubscriptionFailure> {
    loop {
        match source.next().await {
            Some(Ok(WsMessage::Text(text))) => {
                return serde_json::from_str(text.as_str())
                    .map_err(|e| SubscriptionFailure::Transport(format!("invalid frame: {e}")));
            }
            Some(Ok(WsMessage::Close(_))) | None => {
                return Err(SubscriptionFailure::ConnectionLost(
                    "connection closed during handshake".to_string(),
                ));
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(SubscriptionFailure::ConnectionLost(e.to_string())),
        }
    }
}

async fn send(sink: &mut WsSink, message: &ClientMessage) -> Result<(), SubscriptionFailure> {
    let text = serde_json::to_string(message)
        .map_err(|e| SubscriptionFailure::Transport(e.to_string()))?;
    sink.send(WsMessage::text(text))
        .await
        .map_err(|e| SubscriptionFailure::ConnectionLost(e.to_string()))
}

struct WebSocketAckConsumer {
    message_id: String,
    qos: u8,
    acks: mpsc::UnboundedSender<ClientMessage>,
}

impl AckReplyConsumer for WebSocketAckConsumer {
    fn ack(self: Box<Self>) {
        if self.qos == 0 {
            debug!("Message {} is QoS 0, nothing to ack", self.message_id);
            return;
        }
        let message_id = self.message_id.clone();
        if self.acks.send(ClientMessage::Ack { message_id }).is_err() {
            warn!(
                "Ack for {} dropped: subscription connection is gone",
                self.message_id
            );
        }
    }

    fn nack(self: Box<Self>) {
        debug!(
            "Message {} left pending for broker redelivery",
            self.message_id
        );
    }
}
