use serde::Deserialize;

/// Top-level configuration for the bridge.
///
/// Groups the subscription, the broker endpoint and logging.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub subscription: SubscriptionSettings,
    pub broker: BrokerSettings,
    pub logging: LoggingSettings,
}

/// The subscription to attach to.
///
/// `ack_deadline_seconds` is the broker-configured deadline; handlers are
/// given five times this value.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SubscriptionSettings {
    pub name: String,
    pub project: String,
    pub json_path: Option<String>,
    pub ack_deadline_seconds: u64,
    pub template_path: Option<String>,
}

/// Where the WebSocket broker listens.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BrokerSettings {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub subscription: Option<PartialSubscriptionSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialSubscriptionSettings {
    pub name: Option<String>,
    pub project: Option<String>,
    pub json_path: Option<String>,
    pub ack_deadline_seconds: Option<u64>,
    pub template_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            subscription: SubscriptionSettings {
                name: "default".to_string(),
                project: "local".to_string(),
                json_path: None,
                ack_deadline_seconds: 10,
                template_path: None,
            },
            broker: BrokerSettings {
                url: "ws://127.0.0.1:8080".to_string(),
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl PartialSettings {
    /// Overlays the values that were provided on top of `defaults`.
    pub fn merge(self, defaults: Settings) -> Settings {
        let subscription = self.subscription;
        let broker = self.broker;
        let logging = self.logging;
        let d = defaults;

        Settings {
            subscription: match subscription {
                Some(s) => SubscriptionSettings {
                    name: s.name.unwrap_or(d.subscription.name),
                    project: s.project.unwrap_or(d.subscription.project),
                    json_path: s.json_path.or(d.subscription.json_path),
                    ack_deadline_seconds: s
                        .ack_deadline_seconds
                        .unwrap_or(d.subscription.ack_deadline_seconds),
                    template_path: s.template_path.or(d.subscription.template_path),
                },
                None => d.subscription,
            },
            broker: BrokerSettings {
                url: broker.and_then(|b| b.url).unwrap_or(d.broker.url),
            },
            logging: LoggingSettings {
                level: logging.and_then(|l| l.level).unwrap_or(d.logging.level),
            },
        }
    }
}
