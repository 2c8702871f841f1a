//! Environment variable names read by this crate.
//!
//! Only [`EnvCorrelation`](crate::correlation::EnvCorrelation) and
//! [`LayerConfig::from_env`](crate::init::LayerConfig) consult them; the
//! formatter and sinks never touch the environment directly.

/// Deployment environment reported in the `dd.env` field.
pub const DD_ENV_ENV: &str = "DD_ENV";

/// Service name reported in the `dd.service` field.
pub const DD_SERVICE_ENV: &str = "DD_SERVICE";

/// Service version reported in the `dd.version` field.
pub const DD_VERSION_ENV: &str = "DD_VERSION";

/// Logger-scope name written to `progname` by the tracing layer.
pub const LOG_PROGNAME_ENV: &str = "LOG_PROGNAME";

/// Maximum `tracing` level the layer records, e.g. `info` or `debug`.
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read an environment variable, treating unset and empty alike.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}
