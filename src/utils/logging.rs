use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

/// Parses a configured level name. Unknown names fall back to `INFO`.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.trim().to_lowercase().as_str() {
        "error" => tracing::Level::ERROR,
        "warn" | "warning" => tracing::Level::WARN,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        _ => tracing::Level::INFO,
    }
}

/// Initialize tracing for the process.
///
/// `RUST_LOG` takes precedence when set; otherwise `default_level` caps the output.
pub fn init(default_level: &str) {
    let default_directive = LevelFilter::from_level(parse_level(default_level));
    let filter = EnvFilter::builder()
        .with_default_directive(default_directive.into())
        .from_env_lossy();

    // try_init: tests and embedding applications may call this more than once
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
