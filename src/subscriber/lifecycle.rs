//! Subscription service lifecycle.
//!
//! `New -> Starting -> Running -> Stopping -> Terminated`, with `Failed`
//! reachable from any non-terminal state. `Terminated` and `Failed` are
//! terminal. Listeners hear about each accepted transition exactly once.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::info;

use crate::utils::error::SubscriptionFailure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceState {
    New,
    Starting,
    Running,
    Stopping,
    Terminated,
    Failed,
}

impl ServiceState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ServiceState::Terminated | ServiceState::Failed)
    }

    fn can_move_to(self, next: ServiceState) -> bool {
        use ServiceState::*;
        matches!(
            (self, next),
            (New, Starting)
                | (New, Terminated)
                | (Starting, Running)
                | (Starting, Stopping)
                | (Running, Stopping)
                | (Stopping, Terminated)
        ) || (next == Failed && !self.is_terminal())
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceState::New => "NEW",
            ServiceState::Starting => "STARTING",
            ServiceState::Running => "RUNNING",
            ServiceState::Stopping => "STOPPING",
            ServiceState::Terminated => "TERMINATED",
            ServiceState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Observer of service transitions. Every method defaults to a no-op.
pub trait ServiceListener: Send + Sync {
    fn starting(&self) {}

    fn running(&self) {}

    fn stopping(&self, _from: ServiceState) {}

    fn terminated(&self, _from: ServiceState) {}

    fn failed(&self, _from: ServiceState, _failure: &SubscriptionFailure) {}
}

/// Tracks the current state and fans transitions out to listeners.
///
/// Shared by broker services; listeners run on the thread that performs the
/// transition, after the state lock is released.
#[derive(Default)]
pub struct Lifecycle {
    state: Mutex<LifecycleState>,
    listeners: Mutex<Vec<Arc<dyn ServiceListener>>>,
}

struct LifecycleState {
    current: ServiceState,
    failure: Option<SubscriptionFailure>,
}

impl Default for LifecycleState {
    fn default() -> Self {
        Self {
            current: ServiceState::New,
            failure: None,
        }
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn ServiceListener>) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn state(&self) -> ServiceState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current
    }

    /// Cause of the failure, once the service has failed.
    pub fn failure(&self) -> Option<SubscriptionFailure> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .failure
            .clone()
    }

    /// Moves to `next` and notifies listeners. Returns `false`, without
    /// notifying, when the transition is not allowed from the current state.
    ///
    /// Use [`Lifecycle::fail`] to enter `Failed`.
    pub fn transition(&self, next: ServiceState) -> bool {
        if next == ServiceState::Failed {
            return false;
        }
        let Some(from) = self.swap_state(next, None) else {
            return false;
        };
        info!("Subscription service {} -> {}", from, next);

        for listener in self.snapshot_listeners() {
            match next {
                ServiceState::Starting => listener.starting(),
                ServiceState::Running => listener.running(),
                ServiceState::Stopping => listener.stopping(from),
                ServiceState::Terminated => listener.terminated(from),
                ServiceState::New | ServiceState::Failed => {}
            }
        }
        true
    }

    /// Moves to `Failed` with `failure` as the cause. Returns `false` when
    /// the service already reached a terminal state.
    pub fn fail(&self, failure: SubscriptionFailure) -> bool {
        let Some(from) = self.swap_state(ServiceState::Failed, Some(failure.clone())) else {
            return false;
        };
        for listener in self.snapshot_listeners() {
            listener.failed(from, &failure);
        }
        true
    }

    fn swap_state(
        &self,
        next: ServiceState,
        failure: Option<SubscriptionFailure>,
    ) -> Option<ServiceState> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let from = state.current;
        if !from.can_move_to(next) {
            return None;
        }
        state.current = next;
        if failure.is_some() {
            state.failure = failure;
        }
        Some(from)
    }

    fn snapshot_listeners(&self) -> Vec<Arc<dyn ServiceListener>> {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
