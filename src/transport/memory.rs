//! In-process broker.
//!
//! Every delivery runs on its own worker thread, so deliveries overlap and
//! complete in any order, as with a real broker runtime. The service keeps a
//! ledger of what reached the broker side: the outcome per message id, the
//! number of settle calls, and nacked messages waiting for redelivery.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::model::PubsubType;
use crate::subscriber::{
    AckOutcome, AckReplyConsumer, DeliveryCallback, Lifecycle, PubsubMessage, ServiceListener,
    ServiceOptions, ServiceState, SubscriberService,
};
use crate::utils::error::SubscriptionFailure;

#[derive(Debug, Default)]
struct Ledger {
    outcomes: HashMap<String, AckOutcome>,
    settle_calls: usize,
    redeliveries: VecDeque<PubsubMessage>,
}

pub struct MemoryService {
    pubsub_type: PubsubType,
    options: Option<ServiceOptions>,
    lifecycle: Lifecycle,
    receiver: Mutex<Option<Arc<dyn DeliveryCallback>>>,
    ledger: Arc<Mutex<Ledger>>,
}

impl MemoryService {
    pub fn new(pubsub_type: PubsubType) -> Self {
        Self {
            pubsub_type,
            options: None,
            lifecycle: Lifecycle::new(),
            receiver: Mutex::new(None),
            ledger: Arc::new(Mutex::new(Ledger::default())),
        }
    }

    /// Factory for [`SubscriberBuilder::build`](crate::subscriber::SubscriberBuilder::build).
    pub fn factory(pubsub_type: PubsubType) -> impl FnOnce(ServiceOptions) -> MemoryService {
        move |options| MemoryService {
            options: Some(options),
            ..MemoryService::new(pubsub_type)
        }
    }

    /// Options the service was created with, when built through [`MemoryService::factory`].
    pub fn options(&self) -> Option<&ServiceOptions> {
        self.options.as_ref()
    }

    /// Publishes `payload` under a fresh message id. Returns `None` unless
    /// the service is running.
    pub fn publish(&self, payload: impl Into<Vec<u8>>) -> Option<JoinHandle<()>> {
        let mut message = PubsubMessage::new(Uuid::new_v4().to_string(), payload);
        message.publish_time = Some(Utc::now());
        self.deliver(message)
    }

    /// Hands `message` to the receiver on a new worker thread.
    pub fn deliver(&self, message: PubsubMessage) -> Option<JoinHandle<()>> {
        if self.lifecycle.state() != ServiceState::Running {
            warn!(
                "Dropping message {}: service is {}",
                message.message_id,
                self.lifecycle.state()
            );
            return None;
        }
        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()?;
        let consumer = MemoryAckConsumer {
            message: message.clone(),
            ledger: self.ledger.clone(),
        };
        Some(thread::spawn(move || {
            receiver.receive_message(message, Box::new(consumer))
        }))
    }

    /// Delivers every nacked message again. Nothing is taken off the
    /// redelivery queue unless the service is running.
    pub fn redeliver_nacked(&self) -> Vec<JoinHandle<()>> {
        if self.lifecycle.state() != ServiceState::Running {
            warn!(
                "Keeping {} nacked message(s) queued: service is {}",
                self.pending_redeliveries(),
                self.lifecycle.state()
            );
            return Vec::new();
        }
        let pending: Vec<PubsubMessage> = self
            .ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .redeliveries
            .drain(..)
            .collect();
        pending
            .into_iter()
            .filter_map(|message| self.deliver(message))
            .collect()
    }

    /// Drives the subscription into `Failed`.
    pub fn fail(&self, failure: SubscriptionFailure) -> bool {
        self.lifecycle.fail(failure)
    }

    pub fn outcome(&self, message_id: &str) -> Option<AckOutcome> {
        self.ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .outcomes
            .get(message_id)
            .copied()
    }

    /// Number of ack/nack calls that reached the broker side.
    pub fn settle_calls(&self) -> usize {
        self.ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .settle_calls
    }

    pub fn pending_redeliveries(&self) -> usize {
        self.ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .redeliveries
            .len()
    }
}

impl SubscriberService for MemoryService {
    fn pubsub_type(&self) -> PubsubType {
        self.pubsub_type
    }

    fn add_listener(&self, listener: Arc<dyn ServiceListener>) {
        self.lifecycle.add_listener(listener);
    }

    fn start(&self, receiver: Arc<dyn DeliveryCallback>) {
        if !self.lifecycle.transition(ServiceState::Starting) {
            warn!("Service cannot start from {}", self.lifecycle.state());
            return;
        }
        *self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(receiver);
        self.lifecycle.transition(ServiceState::Running);
    }

    fn stop(&self) {
        if self.lifecycle.state() == ServiceState::New {
            self.lifecycle.transition(ServiceState::Terminated);
            return;
        }
        if self.lifecycle.transition(ServiceState::Stopping) {
            self.receiver
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            self.lifecycle.transition(ServiceState::Terminated);
        }
    }

    fn state(&self) -> ServiceState {
        self.lifecycle.state()
    }
}

struct MemoryAckConsumer {
    message: PubsubMessage,
    ledger: Arc<Mutex<Ledger>>,
}

impl MemoryAckConsumer {
    fn record(self, outcome: AckOutcome) {
        let mut ledger = self.ledger.lock().unwrap_or_else(PoisonError::into_inner);
        ledger.settle_calls += 1;
        ledger
            .outcomes
            .insert(self.message.message_id.clone(), outcome);
        if outcome == AckOutcome::Nacked {
            debug!("Message {} queued for redelivery", self.message.message_id);
            ledger.redeliveries.push_back(self.message);
        }
    }
}

impl AckReplyConsumer for MemoryAckConsumer {
    fn ack(self: Box<Self>) {
        self.record(AckOutcome::Acked);
    }

    fn nack(self: Box<Self>) {
        self.record(AckOutcome::Nacked);
    }
}
