//! CLI for pubsub-bridge
//!
//! Subcommands:
//! - `subscribe`: attach to the configured subscription on a popsub broker
//! - `demo`: run the pipeline against the in-process broker

use std::sync::Arc;

use clap::{Parser, Subcommand};
use pubsub_bridge::config::{Settings, load_config, load_config_from};
use pubsub_bridge::model::{NodeIdentity, PubsubType};
use pubsub_bridge::subscriber::{LoggingHandler, Subscriber, SubscriberBuilder};
use pubsub_bridge::transport::{MemoryService, WebSocketService};
use pubsub_bridge::utils::error::SubscriberError;
use pubsub_bridge::utils::logging;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "pubsub-bridge")]
struct Cli {
    /// Configuration file (defaults to config/default plus environment)
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Subscribe to the configured popsub broker and log every message
    Subscribe {
        /// Overrides broker.url
        #[arg(long)]
        url: Option<String>,
    },
    /// Push payloads through the in-process broker
    Demo {
        #[arg(required = true)]
        payloads: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let settings = match load_settings(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!("Could not load configuration: {}", e);
            std::process::exit(1);
        }
    };
    logging::init(&settings.logging.level);

    let result = match cli.command {
        Command::Subscribe { url } => run_subscriber(settings, url).await,
        Command::Demo { payloads } => run_demo(settings, payloads),
    };
    if let Err(e) = result {
        error!("pubsub-bridge failed: {}", e);
        std::process::exit(1);
    }
}

fn load_settings(path: Option<&str>) -> Result<Settings, SubscriberError> {
    let settings = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(settings)
}

fn builder(settings: &Settings, identity: NodeIdentity) -> SubscriberBuilder {
    SubscriberBuilder::from_settings(&settings.subscription)
        .handler(Arc::new(LoggingHandler))
        .node_identity(identity)
}

async fn run_subscriber(
    settings: Settings,
    url: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let identity = NodeIdentity::from_environment();
    let url = url.unwrap_or_else(|| settings.broker.url.clone());
    info!("Node {} connecting to {}", identity, url);

    let subscriber: Subscriber<WebSocketService> =
        builder(&settings, identity).build(WebSocketService::factory(url))?;
    subscriber.start();

    tokio::select! {
        _ = subscriber.service().join() => {
            error!("Subscription {} ended unexpectedly.", subscriber.subscription_name());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
            subscriber.stop();
            subscriber.service().join().await;
        }
    }
    // restart policy belongs to whoever supervises this process
    subscriber.ensure_not_failed()?;
    Ok(())
}

fn run_demo(settings: Settings, payloads: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let identity = NodeIdentity::from_environment();
    let subscriber: Subscriber<MemoryService> =
        builder(&settings, identity).build(MemoryService::factory(PubsubType::Google))?;
    subscriber.start();

    let service = subscriber.service();
    let deliveries: Vec<_> = payloads
        .into_iter()
        .filter_map(|payload| service.publish(payload))
        .collect();
    for delivery in deliveries {
        if delivery.join().is_err() {
            error!("A delivery worker panicked");
        }
    }

    subscriber.stop();
    Ok(())
}
