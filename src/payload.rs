use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error;
use std::fmt;

use serde_json::{Map, Value};

/// The four shapes a logged message can take.
///
/// Each shape is rendered by its own strategy in
/// [`JsonFormatter`](crate::formatter::JsonFormatter).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Mapping,
    Fault,
    Text,
    Other,
}

/// Value handed to "log this".
#[derive(Debug, Clone, PartialEq)]
pub enum MessagePayload {
    /// Entries merged verbatim into the record. Callers must keep clear of
    /// the reserved `dd`, `timestamp`, `severity` and `progname` keys.
    Fields(Map<String, Value>),
    Fault(Fault),
    /// Raw text bytes, written out as-is once they pass UTF-8 validation.
    Text(Vec<u8>),
    /// Anything else, already converted to its string form.
    Other(String),
}

impl MessagePayload {
    /// Classify an arbitrary JSON value by shape.
    ///
    /// Checked in priority order: an object is a mapping, a string is text,
    /// everything else falls back to its string conversion. Faults cannot
    /// be expressed as plain JSON and are built with [`Fault`] directly.
    pub fn classify(value: Value) -> Self {
        match value {
            Value::Object(map) => MessagePayload::Fields(map),
            Value::String(text) => MessagePayload::Text(text.into_bytes()),
            Value::Null => MessagePayload::Other(String::new()),
            other => MessagePayload::Other(other.to_string()),
        }
    }

    /// Fallback payload built from any displayable value.
    pub fn other(value: impl fmt::Display) -> Self {
        MessagePayload::Other(value.to_string())
    }

    pub fn kind(&self) -> PayloadKind {
        match self {
            MessagePayload::Fields(_) => PayloadKind::Mapping,
            MessagePayload::Fault(_) => PayloadKind::Fault,
            MessagePayload::Text(_) => PayloadKind::Text,
            MessagePayload::Other(_) => PayloadKind::Other,
        }
    }
}

impl From<Map<String, Value>> for MessagePayload {
    fn from(map: Map<String, Value>) -> Self {
        MessagePayload::Fields(map)
    }
}

impl From<Fault> for MessagePayload {
    fn from(fault: Fault) -> Self {
        MessagePayload::Fault(fault)
    }
}

impl From<&str> for MessagePayload {
    fn from(text: &str) -> Self {
        MessagePayload::Text(text.as_bytes().to_vec())
    }
}

impl From<String> for MessagePayload {
    fn from(text: String) -> Self {
        MessagePayload::Text(text.into_bytes())
    }
}

impl From<Vec<u8>> for MessagePayload {
    fn from(bytes: Vec<u8>) -> Self {
        MessagePayload::Text(bytes)
    }
}

impl From<&[u8]> for MessagePayload {
    fn from(bytes: &[u8]) -> Self {
        MessagePayload::Text(bytes.to_vec())
    }
}

/// A raised error as seen by the log: its type, message and the stack
/// frames captured with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub kind: String,
    pub message: String,
    pub backtrace: Vec<String>,
}

impl Fault {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Fault {
            kind: kind.into(),
            message: message.into(),
            backtrace: Vec::new(),
        }
    }

    pub fn with_backtrace<I, S>(mut self, frames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.backtrace = frames.into_iter().map(Into::into).collect();
        self
    }

    /// Describe `err` using its Rust type name and `Display` output.
    ///
    /// A backtrace is captured at the call site; it stays empty unless
    /// `RUST_BACKTRACE` / `RUST_LIB_BACKTRACE` enable capturing.
    pub fn from_error<E>(err: &E) -> Self
    where
        E: Error + ?Sized,
    {
        Fault {
            kind: std::any::type_name::<E>().to_string(),
            message: err.to_string(),
            backtrace: backtrace_frames(&Backtrace::capture()),
        }
    }

    /// Describe an error that already lost its static type to boxing.
    ///
    /// A boxed [`Fault`] keeps its own kind. Otherwise the kind is the
    /// leading identifier of the error's `Debug` output, which for derived
    /// impls is the type (or enum variant) name; errors whose `Debug`
    /// starts with anything else are reported as `Error`.
    pub fn from_boxed(err: &(dyn Error + Send + Sync + 'static)) -> Self {
        if let Some(fault) = err.downcast_ref::<Fault>() {
            return fault.clone();
        }
        Fault {
            kind: debug_type_name(&format!("{:?}", err)).unwrap_or_else(|| "Error".to_string()),
            message: err.to_string(),
            backtrace: backtrace_frames(&Backtrace::capture()),
        }
    }
}

// `DbDown`, `DbDown { .. }` and `DbDown(..)` all name `DbDown`.
fn debug_type_name(rendered: &str) -> Option<String> {
    let name: String = rendered
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == ':')
        .collect();
    let name = name.trim_end_matches(':');
    match name.chars().next() {
        Some(first) if first.is_alphabetic() || first == '_' => Some(name.to_string()),
        _ => None,
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl Error for Fault {}

/// Split a captured backtrace into one description per frame.
///
/// The `at file:line` continuation lines are folded into the frame they
/// belong to.
pub fn backtrace_frames(backtrace: &Backtrace) -> Vec<String> {
    if backtrace.status() != BacktraceStatus::Captured {
        return Vec::new();
    }
    parse_frames(&backtrace.to_string())
}

fn parse_frames(rendered: &str) -> Vec<String> {
    let mut frames: Vec<String> = Vec::new();
    for line in rendered.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(location) = line.strip_prefix("at ") {
            if let Some(last) = frames.last_mut() {
                last.push_str(" at ");
                last.push_str(location);
            }
            continue;
        }
        let symbol = match line.split_once(": ") {
            Some((index, rest)) if index.chars().all(|c| c.is_ascii_digit()) => rest,
            _ => line,
        };
        frames.push(symbol.to_string());
    }
    frames
}
