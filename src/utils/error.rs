//! Error types for the subscriber adapter.
//!
//! Configuration and credential problems surface from construction as
//! [`SubscriberError`]. Extraction problems ([`ExtractError`]) are recovered by
//! the message receiver and never reach a handler. Subscription-level failures
//! ([`SubscriptionFailure`]) are delivered to lifecycle listeners.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SubscriberError {
    #[error("could not load credentials from {path}: {source}")]
    Credentials {
        path: String,
        #[source]
        source: CredentialsError,
    },

    #[error("could not load artifact template: {0}")]
    Template(#[from] ExtractError),

    #[error("invalid subscriber configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error("subscription failed: {0}")]
    Subscription(#[from] SubscriptionFailure),
}

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed credentials json: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("could not read template {path}: {source}")]
    TemplateIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("payload is not valid json: {0}")]
    Payload(#[source] serde_json::Error),

    #[error("payload has no value at {0}")]
    MissingField(String),

    #[error("rendered template is not a valid artifact list: {0}")]
    Rendered(#[source] serde_json::Error),
}

/// Terminal, subscription-level failure reported through the service lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionFailure {
    #[error("authentication rejected: {0}")]
    AuthenticationRejected(String),

    #[error("subscription not found: {0}")]
    SubscriptionNotFound(String),

    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("transport error: {0}")]
    Transport(String),
}
