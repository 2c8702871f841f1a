use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, TimeZone};
use serde_json::Value;

use crate::correlation::{CorrelationSource, NoCorrelation};
use crate::payload::{Fault, MessagePayload};
use crate::record::{CorrelationContext, LogRecord};

/// Terminator appended to every formatted line.
pub const LINE_TERMINATOR: &str = "\r\n";

/// Error returned when a record cannot be rendered.
///
/// Formatting is never retried; the caller decides what to do with it.
#[derive(thiserror::Error, Debug)]
pub enum FormatError {
    #[error("failed to serialize log record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("text payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// Renders log calls as one JSON object per line, tagged with the trace
/// correlation current at format time.
///
/// The formatter holds no state besides its [`CorrelationSource`] and can be
/// shared freely between threads.
#[derive(Clone)]
pub struct JsonFormatter {
    correlation: Arc<dyn CorrelationSource>,
}

impl JsonFormatter {
    pub fn new(correlation: Arc<dyn CorrelationSource>) -> Self {
        JsonFormatter { correlation }
    }

    /// Formatter whose `dd` fields are always `null`.
    pub fn without_correlation() -> Self {
        JsonFormatter::new(Arc::new(NoCorrelation))
    }

    /// Snapshot of the correlation the next line would carry.
    pub fn correlation(&self) -> CorrelationContext {
        self.correlation.current()
    }

    /// Build the record for a log call without serializing it.
    pub fn build_record<Tz>(
        &self,
        severity: &str,
        timestamp: &DateTime<Tz>,
        progname: Option<&str>,
        payload: &MessagePayload,
    ) -> Result<LogRecord, FormatError>
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        let mut record = LogRecord::base(
            &self.correlation.current(),
            timestamp.to_string(),
            severity,
            progname,
        );
        apply_payload(&mut record, payload)?;
        Ok(record)
    }

    /// Format a log call into a single CRLF-terminated JSON line.
    pub fn format<Tz>(
        &self,
        severity: &str,
        timestamp: &DateTime<Tz>,
        progname: Option<&str>,
        payload: &MessagePayload,
    ) -> Result<String, FormatError>
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        self.format_with(severity, timestamp, progname, payload, |_| {})
    }

    /// Like [`JsonFormatter::format`], handing the finished record to
    /// `inspect` right before it is serialized.
    ///
    /// The callback only gets a shared reference, so it can observe the
    /// record but never change what is written.
    pub fn format_with<Tz, F>(
        &self,
        severity: &str,
        timestamp: &DateTime<Tz>,
        progname: Option<&str>,
        payload: &MessagePayload,
        inspect: F,
    ) -> Result<String, FormatError>
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
        F: FnOnce(&LogRecord),
    {
        let record = self.build_record(severity, timestamp, progname, payload)?;
        inspect(&record);

        let mut line = serde_json::to_string(&record)?;
        line.push_str(LINE_TERMINATOR);
        Ok(line)
    }
}

impl fmt::Debug for JsonFormatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonFormatter").finish_non_exhaustive()
    }
}

impl Default for JsonFormatter {
    fn default() -> Self {
        JsonFormatter::without_correlation()
    }
}

fn apply_payload(record: &mut LogRecord, payload: &MessagePayload) -> Result<(), FormatError> {
    match payload {
        MessagePayload::Fields(fields) => record.merge(fields),
        MessagePayload::Fault(fault) => apply_fault(record, fault),
        MessagePayload::Text(bytes) => {
            let text = String::from_utf8(bytes.clone())?;
            record.insert("message", Value::String(text));
        }
        MessagePayload::Other(text) => {
            record.insert("message", Value::String(text.clone()));
        }
    }
    Ok(())
}

fn apply_fault(record: &mut LogRecord, fault: &Fault) {
    record.insert("exception", Value::String(fault.kind.clone()));
    record.insert("exception_message", Value::String(fault.message.clone()));
    // A fault that was never raised carries no frames at all.
    let backtrace = if fault.backtrace.is_empty() {
        Value::Null
    } else {
        Value::from(fault.backtrace.clone())
    };
    record.insert("exception_backtrace", backtrace);
}
