use tracing::info;

use crate::model::{MessageDescription, NodeIdentity};
use crate::subscriber::acknowledger::Acknowledger;

/// Application-side consumer of translated messages.
///
/// Invoked concurrently and in no particular order. The handler owns the
/// acknowledger and is responsible for settling it; an unsettled message is
/// redelivered by the broker.
pub trait MessageHandler: Send + Sync {
    fn handle_message(
        &self,
        description: MessageDescription,
        acknowledger: Acknowledger,
        node_identity: &NodeIdentity,
    );
}

impl<F> MessageHandler for F
where
    F: Fn(MessageDescription, Acknowledger, &NodeIdentity) + Send + Sync,
{
    fn handle_message(
        &self,
        description: MessageDescription,
        acknowledger: Acknowledger,
        node_identity: &NodeIdentity,
    ) {
        self(description, acknowledger, node_identity)
    }
}

/// Logs each description and acks it. Used by the binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl MessageHandler for LoggingHandler {
    fn handle_message(
        &self,
        description: MessageDescription,
        acknowledger: Acknowledger,
        node_identity: &NodeIdentity,
    ) {
        info!(
            "[{}] {} message {} on {} with {} artifact(s): {}",
            node_identity,
            description.pubsub_type,
            description.message_id,
            description.subscription_name,
            description.artifacts.len(),
            description.message_payload
        );
        acknowledger.ack();
    }
}
