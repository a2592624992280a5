//! Structured logging setup driven by [`Config`].

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;
use tracing::Subscriber;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::{EnvFilter, fmt};

use crate::Config;

static INSTALLED: OnceCell<()> = OnceCell::new();

/// Supported logging output formats.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Single-line human-readable events.
    Compact,
}

/// Errors encountered while parsing a [`LogFormat`] from text.
pub type LogFormatParseError = strum::ParseError;

/// Errors raised while installing the log subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// `log_filter` is not a valid filter directive.
    #[error("log filter '{directive}' is invalid: {reason}")]
    Filter {
        /// Directive taken from the configuration.
        directive: String,
        /// Parser message.
        reason: String,
    },
    /// A global subscriber was installed by someone else.
    #[error("could not install the log subscriber: {0}")]
    Install(#[source] SetGlobalDefaultError),
}

/// Installs the process-wide subscriber described by `config`.
///
/// Only the first successful call has an effect.
pub fn initialise(config: &Config) -> Result<(), TelemetryError> {
    INSTALLED
        .get_or_try_init(|| {
            let filter =
                EnvFilter::try_new(config.log_filter()).map_err(|error| TelemetryError::Filter {
                    directive: config.log_filter().to_owned(),
                    reason: error.to_string(),
                })?;
            tracing::subscriber::set_global_default(subscriber_for(config.log_format(), filter))
                .map_err(TelemetryError::Install)
        })
        .copied()
}

fn subscriber_for(format: LogFormat, filter: EnvFilter) -> Box<dyn Subscriber + Send + Sync> {
    let base = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_ansi(io::stderr().is_terminal())
        .with_writer(io::stderr);
    match format {
        LogFormat::Json => Box::new(
            base.json()
                .flatten_event(true)
                .with_current_span(false)
                .finish(),
        ),
        LogFormat::Compact => Box::new(base.compact().finish()),
    }
}
