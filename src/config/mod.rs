mod settings;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{BrokerSettings, LoggingSettings, Settings, SubscriptionSettings};

/// Loads the configuration from `config/default` (if present) and from
/// `PUBSUB__<SECTION>__<KEY>` environment variables, merged over defaults.
pub fn load_config() -> Result<Settings, ConfigError> {
    build(File::with_name("config/default").required(false))
}

/// Same as [`load_config`], reading the file at `path` instead.
pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    build(File::with_name(path).required(true))
}

fn build<S>(file: S) -> Result<Settings, ConfigError>
where
    S: config::Source + Send + Sync + 'static,
{
    let config = Config::builder()
        .add_source(file)
        .add_source(
            Environment::with_prefix("PUBSUB")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let partial: PartialSettings = config.try_deserialize()?;
    Ok(partial.merge(Settings::default()))
}
