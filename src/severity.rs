use std::fmt;

/// Log level accepted by [`LogSink`](crate::sink::LogSink) implementations.
///
/// Labels follow the usual upper-case logger vocabulary; `Unknown` renders
/// as `ANY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    Unknown,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
            Severity::Unknown => "ANY",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&tracing::Level> for Severity {
    fn from(level: &tracing::Level) -> Self {
        if *level == tracing::Level::ERROR {
            Severity::Error
        } else if *level == tracing::Level::WARN {
            Severity::Warn
        } else if *level == tracing::Level::INFO {
            Severity::Info
        } else {
            // TRACE folds into DEBUG.
            Severity::Debug
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_match_logger_vocabulary() {
        assert_eq!(Severity::Info.to_string(), "INFO");
        assert_eq!(Severity::Warn.as_str(), "WARN");
        assert_eq!(Severity::Unknown.as_str(), "ANY");
    }

    #[test]
    fn tracing_levels_map_onto_severities() {
        assert_eq!(Severity::from(&tracing::Level::ERROR), Severity::Error);
        assert_eq!(Severity::from(&tracing::Level::TRACE), Severity::Debug);
    }
}
