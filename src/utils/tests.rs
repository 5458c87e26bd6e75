use super::error::{CredentialsError, SubscriberError, SubscriptionFailure};
use super::logging;

#[test]
fn logging_init_accepts_levels() {
    // Should not panic
    logging::init("info");
    logging::init("debug");
    logging::init("warn");
}

#[test]
fn parse_level_falls_back_to_info() {
    assert_eq!(logging::parse_level("WARNING"), tracing::Level::WARN);
    assert_eq!(logging::parse_level(" trace "), tracing::Level::TRACE);
    assert_eq!(logging::parse_level("verbose"), tracing::Level::INFO);
}

#[test]
fn credentials_error_names_the_path() {
    let err = SubscriberError::Credentials {
        path: "/etc/creds.json".to_string(),
        source: CredentialsError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no such file",
        )),
    };
    let text = err.to_string();
    assert!(text.contains("/etc/creds.json"));
    assert!(text.contains("no such file"));
}

#[test]
fn subscription_failure_display() {
    let failure = SubscriptionFailure::AuthenticationRejected("invalid credentials".into());
    assert_eq!(
        failure.to_string(),
        "authentication rejected: invalid credentials"
    );
}

#[test]
fn config_error_converts_into_subscriber_error() {
    let err: SubscriberError = config::ConfigError::Message("bad port".to_string()).into();
    assert!(matches!(err, SubscriberError::Config(_)));
    assert_eq!(err.to_string(), "bad port");
}

#[test]
fn subscription_failure_converts_into_subscriber_error() {
    let err: SubscriberError = SubscriptionFailure::ConnectionLost("reset".to_string()).into();
    assert_eq!(err.to_string(), "subscription failed: connection lost: reset");
}
