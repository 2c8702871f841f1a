use serde::Serialize;
use serde_json::{Map, Value};

/// Snapshot of the active trace when a line is formatted.
///
/// Absent values serialize as `null` so that every line carries the same
/// `dd` shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CorrelationContext {
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub env: Option<String>,
    pub service: Option<String>,
    pub version: Option<String>,
}

impl CorrelationContext {
    /// Render as the nested `dd` object.
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "trace_id": self.trace_id,
            "span_id": self.span_id,
            "env": self.env,
            "service": self.service,
            "version": self.version,
        })
    }
}

/// Field-name keyed record rendered as a single JSON object.
///
/// A record always holds `dd`, `timestamp`, `severity` and `progname`;
/// payload strategies merge further fields on top. Consumers key by name,
/// so no insertion order is promised.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct LogRecord {
    fields: Map<String, Value>,
}

impl LogRecord {
    /// Width severities are left-justified to. Longer labels are kept whole.
    pub const SEVERITY_WIDTH: usize = 5;

    /// Build the base record every formatted line starts from.
    pub fn base(
        correlation: &CorrelationContext,
        timestamp: String,
        severity: &str,
        progname: Option<&str>,
    ) -> Self {
        let mut fields = Map::new();
        fields.insert("dd".to_string(), correlation.to_value());
        fields.insert("timestamp".to_string(), Value::String(timestamp));
        fields.insert(
            "severity".to_string(),
            Value::String(format!("{:<width$}", severity, width = Self::SEVERITY_WIDTH)),
        );
        fields.insert(
            "progname".to_string(),
            Value::String(progname.unwrap_or_default().to_string()),
        );
        LogRecord { fields }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(key.into(), value)
    }

    /// Merge `other` into the record; colliding keys take the incoming value.
    pub fn merge(&mut self, other: &Map<String, Value>) {
        for (key, value) in other {
            self.fields.insert(key.clone(), value.clone());
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
