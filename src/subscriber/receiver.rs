//! Per-delivery translation and dispatch.
//!
//! For every delivery the receiver:
//! - decodes the payload as UTF-8 (invalid sequences are replaced)
//! - extracts artifacts, falling back to an empty set on failure
//! - computes the ack and retention deadlines
//! - wraps the native consumer in an [`Acknowledger`]
//! - invokes the handler with the description, acknowledger and node identity
//!
//! Nothing escapes this path: extraction errors are logged, and a panicking
//! handler is caught and logged with its message left unsettled.

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::artifacts::ArtifactExtractor;
use crate::model::{
    MessageDescription, NodeIdentity, PubsubType, RETENTION_DEADLINE_MILLIS, ack_deadline_millis,
};
use crate::subscriber::acknowledger::Acknowledger;
use crate::subscriber::handler::MessageHandler;
use crate::subscriber::service::{AckReplyConsumer, DeliveryCallback, PubsubMessage};

pub struct MessageReceiver {
    subscription_name: String,
    pubsub_type: PubsubType,
    ack_deadline_seconds: u64,
    handler: Arc<dyn MessageHandler>,
    extractor: Arc<dyn ArtifactExtractor>,
    identity: NodeIdentity,
}

impl MessageReceiver {
    pub fn new(
        subscription_name: impl Into<String>,
        pubsub_type: PubsubType,
        ack_deadline_seconds: u64,
        handler: Arc<dyn MessageHandler>,
        extractor: Arc<dyn ArtifactExtractor>,
        identity: NodeIdentity,
    ) -> Self {
        Self {
            subscription_name: subscription_name.into(),
            pubsub_type,
            ack_deadline_seconds,
            handler,
            extractor,
            identity,
        }
    }

    pub fn subscription_name(&self) -> &str {
        &self.subscription_name
    }

    /// Builds the description for one delivery.
    pub fn describe(&self, message: &PubsubMessage) -> MessageDescription {
        let message_payload = String::from_utf8_lossy(&message.data).into_owned();
        debug!("Received message with payload: {}", message_payload);

        let artifacts = match self.extractor.parse_artifacts(&message_payload) {
            Ok(artifacts) => artifacts,
            Err(e) => {
                warn!(
                    "Could not extract artifacts from message {} on {}: {}",
                    message.message_id, self.subscription_name, e
                );
                HashSet::new()
            }
        };

        MessageDescription {
            subscription_name: self.subscription_name.clone(),
            message_id: message.message_id.clone(),
            message_payload,
            pubsub_type: self.pubsub_type,
            ack_deadline_millis: ack_deadline_millis(self.ack_deadline_seconds),
            retention_deadline_millis: RETENTION_DEADLINE_MILLIS,
            attributes: message.attributes.clone(),
            artifacts,
        }
    }
}

impl DeliveryCallback for MessageReceiver {
    fn receive_message(&self, message: PubsubMessage, consumer: Box<dyn AckReplyConsumer>) {
        let description = self.describe(&message);
        let acknowledger = Acknowledger::new(message.message_id.clone(), consumer);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.handler
                .handle_message(description, acknowledger, &self.identity)
        }));
        if outcome.is_err() {
            error!(
                "Handler panicked on message {} from {}; leaving it for redelivery",
                message.message_id, self.subscription_name
            );
        }
    }
}
