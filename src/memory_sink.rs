use crate::payload::MessagePayload;
use crate::severity::Severity;
use crate::sink::LogSink;
use async_trait::async_trait;
use std::error::Error;
use std::sync::{Arc, Mutex, PoisonError};

/// A sink that keeps every call in memory, in arrival order.
///
/// Clones share the same storage, so a test can hand one clone to the
/// request logger and inspect the other.
#[derive(Clone, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<(Severity, MessagePayload)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything logged so far.
    pub fn entries(&self) -> Vec<(Severity, MessagePayload)> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Payloads logged at `severity`.
    pub fn at(&self, severity: Severity) -> Vec<MessagePayload> {
        self.entries()
            .into_iter()
            .filter(|(s, _)| *s == severity)
            .map(|(_, payload)| payload)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LogSink for MemorySink {
    async fn log(
        &self,
        severity: Severity,
        payload: MessagePayload,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((severity, payload));
        Ok(())
    }
}
