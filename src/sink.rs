use crate::payload::MessagePayload;
use crate::severity::Severity;
use async_trait::async_trait;
use std::error::Error;

/// Destination for log calls made by the request logger.
///
/// Implementations decide how a payload is rendered and where it goes
/// (a JSON line on stdout, memory for tests, nowhere). Transport, rotation
/// and buffering are entirely the sink's business.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Log a single payload at the given severity.
    ///
    /// **Parameters**
    /// - `severity`: level of the call.
    /// - `payload`: the message, in one of the [`MessagePayload`] shapes.
    ///
    /// **Returns**
    /// - `Ok(())` once the sink accepted the payload.
    /// - `Err(..)` if rendering or writing failed. Callers treat this as a
    ///   logging-pipeline fault; sinks must not retry on their own.
    ///
    /// Sinks are shared between concurrent requests and must synchronize
    /// their own write path.
    async fn log(
        &self,
        severity: Severity,
        payload: MessagePayload,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Flush any buffered output, if the sink buffers at all.
    ///
    /// Default implementation is a no-op.
    async fn flush(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}
