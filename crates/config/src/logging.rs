//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::LoggingConfig;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `config.level`. Calling this twice is harmless: the
/// second install fails quietly and the first subscriber stays in place.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if let Err(e) = result {
        tracing::debug!("Logging already initialized: {e}");
    }
}
