use crate::correlation::{CorrelationSource, EnvCorrelation};
use crate::env::{env_opt, env_or, LOG_LEVEL_ENV, LOG_PROGNAME_ENV};
use crate::formatter::JsonFormatter;
use crate::layer::JsonLayer;
use std::io::Write;
use std::sync::Arc;
use tracing::subscriber::SetGlobalDefaultError;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{Layer, Registry};

/// Configuration of the JSON logging layer.
///
/// **Fields**
/// - `progname`: logger-scope name written to every line; when `None` the
///   event target is used.
/// - `max_level`: most verbose `tracing` level that is written.
/// - `human_readable`: if `true`, a `tracing_subscriber::fmt` layer is
///   added on top that prints events to stderr for people, leaving stdout
///   to the JSON lines.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub progname: Option<String>,
    pub max_level: Level,
    pub human_readable: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            progname: None,
            max_level: Level::INFO,
            human_readable: false,
        }
    }
}

impl LayerConfig {
    /// Read `LOG_PROGNAME` and `LOG_LEVEL`, falling back to the defaults.
    /// An unparsable level is treated as `info`.
    pub fn from_env() -> Self {
        Self {
            progname: env_opt(LOG_PROGNAME_ENV),
            max_level: env_or(LOG_LEVEL_ENV, "info").parse().unwrap_or(Level::INFO),
            human_readable: false,
        }
    }
}

/// Install a global `tracing` subscriber that writes correlated JSON lines
/// to `writer`.
///
/// **Parameters**
/// - `correlation`: source of the `dd` fields on every line.
/// - `writer`: destination of the lines, typically stdout.
/// - `config`: [`LayerConfig`] controlling progname, level and the extra
///   human-readable output.
///
/// **Returns**
/// - `Err(..)` if a global subscriber was already installed.
pub fn init_tracing_with_config(
    correlation: Arc<dyn CorrelationSource>,
    writer: impl Write + Send + 'static,
    config: LayerConfig,
) -> Result<(), SetGlobalDefaultError> {
    let layer = JsonLayer::new(JsonFormatter::new(correlation), writer)
        .with_progname(config.progname)
        .with_filter(LevelFilter::from_level(config.max_level));

    // The two subscriber shapes have different types, so each is installed
    // on its own.
    if config.human_readable {
        let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)
    }
}

/// Install JSON logging to stdout with correlation taken from `DD_ENV`,
/// `DD_SERVICE` and `DD_VERSION` and configuration from
/// [`LayerConfig::from_env`].
///
/// This is the recommended entrypoint for typical services.
pub fn init_tracing() -> Result<(), SetGlobalDefaultError> {
    init_tracing_with_config(
        Arc::new(EnvCorrelation::from_env()),
        std::io::stdout(),
        LayerConfig::from_env(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_log_info_and_above() {
        let config = LayerConfig::default();
        assert_eq!(config.max_level, Level::INFO);
        assert!(config.progname.is_none());
        assert!(!config.human_readable);
    }

    // Both variables are only read here, so one test owns them.
    #[test]
    fn from_env_reads_progname_and_level() {
        std::env::set_var(LOG_PROGNAME_ENV, "billing");
        std::env::set_var(LOG_LEVEL_ENV, "debug");
        let config = LayerConfig::from_env();
        assert_eq!(config.progname.as_deref(), Some("billing"));
        assert_eq!(config.max_level, Level::DEBUG);

        std::env::set_var(LOG_LEVEL_ENV, "chatty");
        assert_eq!(LayerConfig::from_env().max_level, Level::INFO);

        std::env::remove_var(LOG_PROGNAME_ENV);
        std::env::remove_var(LOG_LEVEL_ENV);
        let config = LayerConfig::from_env();
        assert!(config.progname.is_none());
        assert_eq!(config.max_level, Level::INFO);
    }
}
