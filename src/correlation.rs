use std::fmt;
use std::sync::Arc;

use crate::env::{env_opt, DD_ENV_ENV, DD_SERVICE_ENV, DD_VERSION_ENV};
use crate::record::CorrelationContext;

/// Source of the trace correlation attached to every formatted line.
///
/// The formatter calls [`CorrelationSource::current`] once per line, at
/// format time, so the snapshot reflects the trace active when the line is
/// emitted. Implementations must be safe to call concurrently.
pub trait CorrelationSource: Send + Sync {
    fn current(&self) -> CorrelationContext;
}

impl<F> CorrelationSource for F
where
    F: Fn() -> CorrelationContext + Send + Sync,
{
    fn current(&self) -> CorrelationContext {
        self()
    }
}

/// Reports no active trace: every `dd` field is `null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCorrelation;

impl CorrelationSource for NoCorrelation {
    fn current(&self) -> CorrelationContext {
        CorrelationContext::default()
    }
}

/// Always reports the same snapshot.
#[derive(Debug, Clone, Default)]
pub struct StaticCorrelation(pub CorrelationContext);

impl CorrelationSource for StaticCorrelation {
    fn current(&self) -> CorrelationContext {
        self.0.clone()
    }
}

type TraceIdLookup = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Service identity from the environment plus the current `tracing` span.
///
/// `env`, `service` and `version` are read from `DD_ENV`, `DD_SERVICE` and
/// `DD_VERSION` once, when the source is built. `span_id` is the id of the
/// span current at format time. `tracing` itself has no notion of a trace
/// id, so one is only reported when a lookup is installed with
/// [`EnvCorrelation::with_trace_id`].
#[derive(Clone, Default)]
pub struct EnvCorrelation {
    env: Option<String>,
    service: Option<String>,
    version: Option<String>,
    trace_id: Option<TraceIdLookup>,
}

impl EnvCorrelation {
    pub fn from_env() -> Self {
        EnvCorrelation {
            env: env_opt(DD_ENV_ENV),
            service: env_opt(DD_SERVICE_ENV),
            version: env_opt(DD_VERSION_ENV),
            trace_id: None,
        }
    }

    pub fn new(
        env: Option<String>,
        service: Option<String>,
        version: Option<String>,
    ) -> Self {
        EnvCorrelation {
            env,
            service,
            version,
            trace_id: None,
        }
    }

    /// Install the lookup used to fill `dd.trace_id`.
    pub fn with_trace_id<F>(mut self, lookup: F) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        self.trace_id = Some(Arc::new(lookup));
        self
    }
}

impl fmt::Debug for EnvCorrelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvCorrelation")
            .field("env", &self.env)
            .field("service", &self.service)
            .field("version", &self.version)
            .field("trace_id", &self.trace_id.is_some())
            .finish()
    }
}

impl CorrelationSource for EnvCorrelation {
    fn current(&self) -> CorrelationContext {
        CorrelationContext {
            trace_id: self.trace_id.as_ref().and_then(|lookup| lookup()),
            span_id: tracing::Span::current()
                .id()
                .map(|id| id.into_u64().to_string()),
            env: self.env.clone(),
            service: self.service.clone(),
            version: self.version.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_sources() {
        let source = || CorrelationContext {
            trace_id: Some("42".into()),
            ..Default::default()
        };
        assert_eq!(source.current().trace_id.as_deref(), Some("42"));
    }

    #[test]
    fn env_correlation_reports_configured_identity() {
        let source = EnvCorrelation::new(Some("prod".into()), Some("api".into()), None)
            .with_trace_id(|| Some("1234".into()));
        let snapshot = source.current();
        assert_eq!(snapshot.env.as_deref(), Some("prod"));
        assert_eq!(snapshot.service.as_deref(), Some("api"));
        assert_eq!(snapshot.version, None);
        assert_eq!(snapshot.trace_id.as_deref(), Some("1234"));
        // No subscriber is installed, so there is no current span.
        assert_eq!(snapshot.span_id, None);
    }

    #[test]
    fn no_correlation_is_empty() {
        assert_eq!(NoCorrelation.current(), CorrelationContext::default());
    }
}
