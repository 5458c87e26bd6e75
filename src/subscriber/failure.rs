//! Reports terminal subscription failures.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tracing::error;

use crate::subscriber::lifecycle::{ServiceListener, ServiceState};
use crate::utils::error::SubscriptionFailure;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub subscription_name: String,
    pub from: ServiceState,
    pub cause: SubscriptionFailure,
    pub at: DateTime<Utc>,
}

/// Lifecycle listener that only reacts to the transition into `Failed`.
///
/// Restarting a failed subscription is up to the owning process; this
/// listener logs the failure and keeps a record of it.
#[derive(Debug)]
pub struct SubscriptionFailureListener {
    subscription_name: String,
    failures: Mutex<Vec<FailureRecord>>,
}

impl SubscriptionFailureListener {
    pub fn new(subscription_name: impl Into<String>) -> Self {
        Self {
            subscription_name: subscription_name.into(),
            failures: Mutex::new(Vec::new()),
        }
    }

    pub fn failures(&self) -> Vec<FailureRecord> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ServiceListener for SubscriptionFailureListener {
    fn failed(&self, from: ServiceState, failure: &SubscriptionFailure) {
        error!(
            "Pubsub listener for subscription name {} failure caused by {}",
            self.subscription_name, failure
        );
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(FailureRecord {
                subscription_name: self.subscription_name.clone(),
                from,
                cause: failure.clone(),
                at: Utc::now(),
            });
    }
}
