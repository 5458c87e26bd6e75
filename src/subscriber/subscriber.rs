//! Subscriber wiring.
//!
//! A [`Subscriber`] owns one broker service for one named subscription. The
//! builder loads credentials, creates the service through a caller-supplied
//! factory, and registers exactly one [`MessageReceiver`] and one
//! [`SubscriptionFailureListener`] before anything is received.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::artifacts::{ArtifactExtractor, MessageArtifactTranslator};
use crate::config::SubscriptionSettings;
use crate::model::{NodeIdentity, PubsubType};
use crate::subscriber::credentials::Credentials;
use crate::subscriber::failure::{FailureRecord, SubscriptionFailureListener};
use crate::subscriber::handler::MessageHandler;
use crate::subscriber::lifecycle::ServiceState;
use crate::subscriber::receiver::MessageReceiver;
use crate::subscriber::service::SubscriberService;
use crate::utils::error::{SubscriberError, SubscriptionFailure};

/// Identity view of a subscriber, independent of its broker family.
pub trait PubsubSubscriber: Send + Sync {
    fn pubsub_type(&self) -> PubsubType;

    fn subscription_name(&self) -> &str;
}

/// What a broker service factory receives from the builder.
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub project: String,
    pub name: String,
    pub credentials: Option<Credentials>,
    /// `Some(Duration::ZERO)` disables broker-side ack deadline extension;
    /// `None` keeps the broker default.
    pub max_ack_extension_period: Option<Duration>,
}

pub struct Subscriber<S> {
    subscription_name: String,
    service: Arc<S>,
    receiver: Arc<MessageReceiver>,
    failure_listener: Arc<SubscriptionFailureListener>,
    max_ack_extension_period: Option<Duration>,
}

impl<S: SubscriberService> Subscriber<S> {
    pub fn subscription_name(&self) -> &str {
        &self.subscription_name
    }

    pub fn pubsub_type(&self) -> PubsubType {
        self.service.pubsub_type()
    }

    pub fn service(&self) -> &Arc<S> {
        &self.service
    }

    pub fn max_ack_extension_period(&self) -> Option<Duration> {
        self.max_ack_extension_period
    }

    pub fn start(&self) {
        info!("Starting subscriber for {}", self.subscription_name);
        self.service.start(self.receiver.clone());
    }

    pub fn stop(&self) {
        info!("Stopping subscriber for {}", self.subscription_name);
        self.service.stop();
    }

    pub fn state(&self) -> ServiceState {
        self.service.state()
    }

    /// Failures reported for this subscription so far.
    pub fn failures(&self) -> Vec<FailureRecord> {
        self.failure_listener.failures()
    }

    /// `Err` with the reported cause once the subscription has failed.
    pub fn ensure_not_failed(&self) -> Result<(), SubscriberError> {
        if self.service.state() != ServiceState::Failed {
            return Ok(());
        }
        let cause = self
            .failure_listener
            .failures()
            .pop()
            .map(|record| record.cause)
            .unwrap_or_else(|| {
                SubscriptionFailure::Transport("failed without a reported cause".to_string())
            });
        Err(SubscriberError::Subscription(cause))
    }
}

impl<S: SubscriberService> PubsubSubscriber for Subscriber<S> {
    fn pubsub_type(&self) -> PubsubType {
        self.service.pubsub_type()
    }

    fn subscription_name(&self) -> &str {
        &self.subscription_name
    }
}

pub struct SubscriberBuilder {
    name: String,
    project: String,
    json_path: Option<String>,
    ack_deadline_seconds: u64,
    template_path: Option<String>,
    extractor: Option<Arc<dyn ArtifactExtractor>>,
    handler: Option<Arc<dyn MessageHandler>>,
    identity: Option<NodeIdentity>,
}

impl SubscriberBuilder {
    pub const DEFAULT_ACK_DEADLINE_SECONDS: u64 = 10;

    pub fn new(name: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            project: project.into(),
            json_path: None,
            ack_deadline_seconds: Self::DEFAULT_ACK_DEADLINE_SECONDS,
            template_path: None,
            extractor: None,
            handler: None,
            identity: None,
        }
    }

    pub fn from_settings(settings: &SubscriptionSettings) -> Self {
        Self::new(settings.name.clone(), settings.project.clone())
            .json_path(settings.json_path.clone())
            .ack_deadline_seconds(settings.ack_deadline_seconds)
            .template_path(settings.template_path.clone())
    }

    /// Credentials file; `None` or empty means the broker's default credentials.
    pub fn json_path(mut self, path: Option<String>) -> Self {
        self.json_path = path.filter(|p| !p.trim().is_empty());
        self
    }

    pub fn ack_deadline_seconds(mut self, seconds: u64) -> Self {
        self.ack_deadline_seconds = seconds;
        self
    }

    pub fn template_path(mut self, path: Option<String>) -> Self {
        self.template_path = path;
        self
    }

    /// Replaces the template-driven translator.
    pub fn extractor(mut self, extractor: Arc<dyn ArtifactExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn handler(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn node_identity(mut self, identity: NodeIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Creates the broker service with `connect` and wires the receiver and
    /// failure listener into it.
    ///
    /// Fails when the configuration is incomplete, the credentials file cannot
    /// be loaded, or the artifact template cannot be read.
    pub fn build<S, F>(self, connect: F) -> Result<Subscriber<S>, SubscriberError>
    where
        S: SubscriberService,
        F: FnOnce(ServiceOptions) -> S,
    {
        if self.name.trim().is_empty() || self.project.trim().is_empty() {
            return Err(SubscriberError::InvalidConfig(
                "subscription name and project are required".to_string(),
            ));
        }
        if self.ack_deadline_seconds == 0 {
            return Err(SubscriberError::InvalidConfig(
                "ack deadline seconds must be positive".to_string(),
            ));
        }
        let handler = self.handler.ok_or_else(|| {
            SubscriberError::InvalidConfig("a message handler is required".to_string())
        })?;
        let identity = self.identity.ok_or_else(|| {
            SubscriberError::InvalidConfig("a node identity is required".to_string())
        })?;

        let credentials = match &self.json_path {
            Some(path) => match Credentials::from_path(path) {
                Ok(credentials) => Some(credentials),
                Err(source) => {
                    error!("Could not import pubsub json credentials: {}", source);
                    return Err(SubscriberError::Credentials {
                        path: path.clone(),
                        source,
                    });
                }
            },
            None => None,
        };
        let max_ack_extension_period = credentials.as_ref().map(|_| Duration::ZERO);

        let extractor = match self.extractor {
            Some(extractor) => extractor,
            None => Arc::new(MessageArtifactTranslator::from_template_path(
                self.template_path.as_deref(),
            )?),
        };

        let service = Arc::new(connect(ServiceOptions {
            project: self.project.clone(),
            name: self.name.clone(),
            credentials,
            max_ack_extension_period,
        }));
        let pubsub_type = service.pubsub_type();
        let subscription_name = pubsub_type.format_subscription_name(&self.project, &self.name);

        let receiver = Arc::new(MessageReceiver::new(
            subscription_name.clone(),
            pubsub_type,
            self.ack_deadline_seconds,
            handler,
            extractor,
            identity,
        ));
        let failure_listener = Arc::new(SubscriptionFailureListener::new(
            subscription_name.clone(),
        ));
        service.add_listener(failure_listener.clone());

        Ok(Subscriber {
            subscription_name,
            service,
            receiver,
            failure_listener,
            max_ack_extension_period,
        })
    }
}
