use crate::payload::MessagePayload;
use crate::severity::Severity;
use crate::sink::LogSink;
use async_trait::async_trait;
use std::error::Error;

/// A sink that simply drops all payloads.
///
/// Useful for measuring the overhead of the request logger itself without
/// any formatting or I/O.
#[derive(Clone, Default)]
pub struct NoopSink;

#[async_trait]
impl LogSink for NoopSink {
    async fn log(
        &self,
        _severity: Severity,
        _payload: MessagePayload,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{handler_fn, BoxError, Request, RequestLogger, Response};
    use std::sync::Arc;

    #[tokio::test]
    async fn request_logger_runs_against_noop_sink() {
        let handler = handler_fn(|_request: Request| async move {
            Ok::<_, BoxError>(Response::new(204))
        });
        let logger = RequestLogger::new(handler, Arc::new(NoopSink));

        let response = logger.handle(&Request::get("/ping")).await.unwrap();
        assert_eq!(response.status, 204);
    }
}
