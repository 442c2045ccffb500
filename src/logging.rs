use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing::Subscriber;
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::config::Config;

/// Installs the global subscriber. Outside debug mode INFO and above are also
/// appended to the error log with source locations.
pub fn init(config: &Config) -> anyhow::Result<()> {
    let default_level = if config.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let error_log = if config.debug {
        None
    } else {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.error_log)?;
        Some(error_log_layer(Mutex::new(file)))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(error_log)
        .try_init()?;

    if !config.debug {
        tracing::info!(path = %config.error_log.display(), "error log enabled");
    }
    Ok(())
}

/// Plain-text lines: timestamp, level, message, then `file:line` of the callsite.
pub fn error_log_layer<S, W>(writer: W) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .with_filter(LevelFilter::INFO)
}
