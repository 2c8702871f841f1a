use crate::formatter::JsonFormatter;
use crate::payload::MessagePayload;
use crate::severity::Severity;
use chrono::Utc;
use serde_json::{Map, Value};
use std::io::Write;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, PoisonError,
};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// `tracing_subscriber` layer that renders every event as one correlated
/// JSON line through a [`JsonFormatter`].
///
/// An event that only carries a message becomes a text payload; an event
/// with fields becomes a mapping, its message kept under `message`. The
/// event target is used as `progname` unless one is configured.
pub struct JsonLayer {
    formatter: JsonFormatter,
    progname: Option<String>,
    writer: Mutex<Box<dyn Write + Send>>,
    /// Lines successfully written.
    pub written_lines: Arc<AtomicU64>,
    /// Events that could not be formatted or written.
    pub failed_lines: Arc<AtomicU64>,
}

impl JsonLayer {
    pub fn new(formatter: JsonFormatter, writer: impl Write + Send + 'static) -> Self {
        JsonLayer {
            formatter,
            progname: None,
            writer: Mutex::new(Box::new(writer)),
            written_lines: Arc::new(AtomicU64::new(0)),
            failed_lines: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_progname(mut self, progname: Option<String>) -> Self {
        self.progname = progname;
        self
    }

    fn write_line(&self, line: &str) -> std::io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(line.as_bytes())
    }
}

impl<S> Layer<S> for JsonLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event, _ctx: Context<'_, S>) {
        let mut fields = Map::new();
        let mut message: Option<String> = None;

        let mut visitor = FieldVisitor { fields: &mut fields, message: &mut message };
        event.record(&mut visitor);

        let payload = if fields.is_empty() {
            MessagePayload::from(message.unwrap_or_default())
        } else {
            if let Some(message) = message {
                fields.insert("message".to_string(), Value::String(message));
            }
            MessagePayload::Fields(fields)
        };

        let meta = event.metadata();
        let severity = Severity::from(meta.level());
        let progname = self.progname.as_deref().unwrap_or(meta.target());

        let written = self
            .formatter
            .format(severity.as_str(), &Utc::now(), Some(progname), &payload)
            .map_err(|e| e.to_string())
            .and_then(|line| self.write_line(&line).map_err(|e| e.to_string()));

        match written {
            Ok(()) => {
                self.written_lines.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                // The layer cannot log through itself.
                self.failed_lines.fetch_add(1, Ordering::Relaxed);
                eprintln!("failed to write json log line: {}", e);
            }
        }
    }
}

use tracing::field::{Field, Visit};

pub struct FieldVisitor<'a> {
    pub fields: &'a mut Map<String, Value>,
    pub message: &'a mut Option<String>,
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        // `info!("text")` records its message through `fmt::Arguments`.
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.fields.insert(field.name().to_string(), Value::String(format!("{:?}", value)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::EnvCorrelation;
    use crate::writer_sink::SharedBuffer;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::Registry;

    fn capture<F: FnOnce()>(progname: Option<String>, f: F) -> Vec<Value> {
        let buffer = SharedBuffer::new();
        let formatter = JsonFormatter::new(Arc::new(EnvCorrelation::new(
            Some("test".into()),
            Some("layer-svc".into()),
            None,
        )));
        let layer = JsonLayer::new(formatter, buffer.clone()).with_progname(progname);
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, f);

        buffer
            .lines()
            .iter()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn message_only_events_are_text() {
        let lines = capture(None, || tracing::info!("service started"));
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["message"], "service started");
        assert_eq!(lines[0]["severity"], "INFO ");
        assert_eq!(lines[0]["dd"]["service"], "layer-svc");
        assert_eq!(lines[0]["dd"]["span_id"], Value::Null);
    }

    #[test]
    fn events_with_fields_are_mappings() {
        let lines = capture(Some("orders".into()), || {
            tracing::error!(order_id = 123, retry = false, "order failed")
        });
        assert_eq!(lines[0]["order_id"], 123);
        assert_eq!(lines[0]["retry"], false);
        assert_eq!(lines[0]["message"], "order failed");
        assert_eq!(lines[0]["severity"], "ERROR");
        assert_eq!(lines[0]["progname"], "orders");
    }

    #[test]
    fn events_inside_a_span_carry_its_id() {
        let lines = capture(None, || {
            let span = tracing::info_span!("request");
            let _guard = span.enter();
            tracing::warn!("slow upstream");
        });
        assert!(lines[0]["dd"]["span_id"].is_string());
        assert_eq!(lines[0]["severity"], "WARN ");
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_failures_are_counted() {
        let layer = JsonLayer::new(JsonFormatter::without_correlation(), ClosedPipe);
        let written = Arc::clone(&layer.written_lines);
        let failed = Arc::clone(&layer.failed_lines);

        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("lost line");
        });

        assert_eq!(failed.load(Ordering::Relaxed), 1);
        assert_eq!(written.load(Ordering::Relaxed), 0);
    }
}
