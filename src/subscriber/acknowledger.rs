//! Single-use acknowledgement capability handed to message handlers.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use crate::subscriber::service::AckReplyConsumer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Acked,
    Nacked,
}

struct Settlement {
    consumer: Option<Box<dyn AckReplyConsumer>>,
    outcome: Option<AckOutcome>,
}

/// Wraps the broker-native ack capability of exactly one delivery.
///
/// The first call to [`ack`](Acknowledger::ack) or [`nack`](Acknowledger::nack)
/// moves the native consumer out and settles the message; every later call
/// is a no-op that logs a warning and returns `false`. The acknowledger may
/// be moved to and settled from any thread, long after the receiver returned.
pub struct Acknowledger {
    message_id: String,
    settlement: Mutex<Settlement>,
}

impl Acknowledger {
    pub fn new(message_id: impl Into<String>, consumer: Box<dyn AckReplyConsumer>) -> Self {
        Self {
            message_id: message_id.into(),
            settlement: Mutex::new(Settlement {
                consumer: Some(consumer),
                outcome: None,
            }),
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Marks the message processed; the broker will not redeliver it.
    pub fn ack(&self) -> bool {
        self.settle(AckOutcome::Acked)
    }

    /// Marks processing failed; the broker may redeliver per its own policy.
    pub fn nack(&self) -> bool {
        self.settle(AckOutcome::Nacked)
    }

    pub fn outcome(&self) -> Option<AckOutcome> {
        self.settlement
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .outcome
    }

    pub fn is_settled(&self) -> bool {
        self.outcome().is_some()
    }

    fn settle(&self, outcome: AckOutcome) -> bool {
        let consumer = {
            let mut settlement = self
                .settlement
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match settlement.consumer.take() {
                Some(consumer) => {
                    settlement.outcome = Some(outcome);
                    consumer
                }
                None => {
                    warn!(
                        "Ignoring {:?} for message {}: already settled as {:?}",
                        outcome, self.message_id, settlement.outcome
                    );
                    return false;
                }
            }
        };

        // native call happens outside the lock
        match outcome {
            AckOutcome::Acked => consumer.ack(),
            AckOutcome::Nacked => consumer.nack(),
        }
        debug!("Message {} settled as {:?}", self.message_id, outcome);
        true
    }
}

impl fmt::Debug for Acknowledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Acknowledger")
            .field("message_id", &self.message_id)
            .field("outcome", &self.outcome())
            .finish()
    }
}
