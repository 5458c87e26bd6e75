//! The seam between this crate and a broker's client runtime.
//!
//! A broker family implements [`SubscriberService`]; it delivers every
//! message to the registered [`DeliveryCallback`] together with a native
//! [`AckReplyConsumer`], and reports lifecycle transitions to its listeners.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::model::PubsubType;
use crate::subscriber::lifecycle::{ServiceListener, ServiceState};

/// A message as delivered by the broker runtime.
#[derive(Debug, Clone, Default)]
pub struct PubsubMessage {
    pub message_id: String,
    pub data: Vec<u8>,
    pub attributes: BTreeMap<String, String>,
    pub publish_time: Option<DateTime<Utc>>,
}

impl PubsubMessage {
    pub fn new(message_id: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            message_id: message_id.into(),
            data: data.into(),
            attributes: BTreeMap::new(),
            publish_time: None,
        }
    }
}

/// Broker-native acknowledgement for exactly one delivery.
///
/// Both methods consume the consumer, so a single value can settle its
/// message once. Dropping it unsettled leaves the message to the broker's
/// redelivery timeout.
pub trait AckReplyConsumer: Send {
    fn ack(self: Box<Self>);
    fn nack(self: Box<Self>);
}

/// Per-delivery callback registered with a broker runtime.
///
/// Called from broker worker threads, possibly concurrently.
pub trait DeliveryCallback: Send + Sync {
    fn receive_message(&self, message: PubsubMessage, consumer: Box<dyn AckReplyConsumer>);
}

/// A running subscription on one broker family.
pub trait SubscriberService: Send + Sync + 'static {
    fn pubsub_type(&self) -> PubsubType;

    fn add_listener(&self, listener: Arc<dyn ServiceListener>);

    /// Begins delivering messages to `receiver`.
    fn start(&self, receiver: Arc<dyn DeliveryCallback>);

    fn stop(&self);

    fn state(&self) -> ServiceState;
}
