//! Subscriber-side adapter between a broker runtime and a message handler.
//!
//! - `service`: the broker seam (`SubscriberService`, `DeliveryCallback`, `AckReplyConsumer`)
//! - `receiver`: turns deliveries into `MessageDescription`s and calls the handler
//! - `acknowledger`: single-use ack/nack capability given to handlers
//! - `lifecycle` / `failure`: service states and terminal failure reporting
//! - `subscriber`: builder and owner of one subscription

pub mod acknowledger;
pub mod credentials;
pub mod failure;
pub mod handler;
pub mod lifecycle;
pub mod receiver;
pub mod service;
pub mod subscriber;

pub use acknowledger::{AckOutcome, Acknowledger};
pub use credentials::Credentials;
pub use failure::{FailureRecord, SubscriptionFailureListener};
pub use handler::{LoggingHandler, MessageHandler};
pub use lifecycle::{Lifecycle, ServiceListener, ServiceState};
pub use receiver::MessageReceiver;
pub use service::{AckReplyConsumer, DeliveryCallback, PubsubMessage, SubscriberService};
pub use subscriber::{PubsubSubscriber, ServiceOptions, Subscriber, SubscriberBuilder};
