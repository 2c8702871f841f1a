use std::sync::Arc;

use chrono::{FixedOffset, TimeZone, Utc};
use serde_json::{json, Value};

use correlated_json_log::correlation::{NoCorrelation, StaticCorrelation};
use correlated_json_log::formatter::JsonFormatter;
use correlated_json_log::payload::{Fault, MessagePayload};
use correlated_json_log::record::CorrelationContext;
use correlated_json_log::severity::Severity;

const SEVERITIES: [Severity; 6] = [
    Severity::Debug,
    Severity::Info,
    Severity::Warn,
    Severity::Error,
    Severity::Fatal,
    Severity::Unknown,
];

fn parse(line: &str) -> Value {
    serde_json::from_str(line.strip_suffix("\r\n").expect("line ends with CRLF")).unwrap()
}

#[test]
fn text_payloads_never_carry_exception_fields() {
    let formatter = JsonFormatter::new(Arc::new(NoCorrelation));
    let now = Utc::now();
    for severity in SEVERITIES {
        for progname in [None, Some(""), Some("worker")] {
            let line = formatter
                .format(severity.as_str(), &now, progname, &"hello".into())
                .unwrap();
            let value = parse(&line);
            assert_eq!(value["message"], "hello");
            assert_eq!(value["progname"], progname.unwrap_or(""));
            let severity_field = value["severity"].as_str().unwrap();
            assert!(severity_field.len() >= 5);
            assert_eq!(severity_field.trim_end(), severity.as_str());
            for key in ["exception", "exception_message", "exception_backtrace"] {
                assert!(value.get(key).is_none(), "{} present for {}", key, severity);
            }
        }
    }
}

#[test]
fn mapping_payloads_are_a_superset_of_the_record() {
    let formatter = JsonFormatter::default();
    let mapping = json!({"user": "ada", "attempt": 3, "tags": ["a", "b"], "nested": {"k": null}});
    let line = formatter
        .format(
            "INFO",
            &Utc::now(),
            Some("auth"),
            &MessagePayload::classify(mapping.clone()),
        )
        .unwrap();
    let value = parse(&line);
    let object = value.as_object().unwrap();

    for (key, expected) in mapping.as_object().unwrap() {
        assert_eq!(&object[key], expected);
    }
    for key in ["dd", "timestamp", "severity", "progname"] {
        assert!(object.contains_key(key));
    }
    assert_eq!(object.len(), 8);
}

#[test]
fn fault_payloads_render_message_and_frames() {
    let fault = Fault::new("Timeout", "boom").with_backtrace(vec!["a:1", "b:2"]);
    let line = JsonFormatter::default()
        .format("ERROR", &Utc::now(), None, &MessagePayload::Fault(fault))
        .unwrap();
    let value = parse(&line);
    assert_eq!(value["exception_message"], "boom");
    assert_eq!(value["exception_backtrace"], json!(["a:1", "b:2"]));
    assert_eq!(value["severity"], "ERROR");
}

#[test]
fn timestamps_use_their_display_form() {
    let offset = FixedOffset::east_opt(2 * 3600).unwrap();
    let timestamp = offset.with_ymd_and_hms(2023, 11, 14, 9, 5, 7).unwrap();
    let line = JsonFormatter::default()
        .format("INFO", &timestamp, None, &"x".into())
        .unwrap();
    assert_eq!(parse(&line)["timestamp"], "2023-11-14 09:05:07 +02:00");
}

#[test]
fn unchanged_inputs_format_identically() {
    let formatter = JsonFormatter::new(Arc::new(StaticCorrelation(CorrelationContext {
        trace_id: Some("1".into()),
        span_id: Some("2".into()),
        ..Default::default()
    })));
    let timestamp = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let payloads = [
        MessagePayload::from("text"),
        MessagePayload::classify(json!({"z": 1, "a": 2})),
        MessagePayload::Fault(Fault::new("E", "m")),
        MessagePayload::other(42),
    ];
    for payload in &payloads {
        let first = formatter.format("WARN", &timestamp, Some("p"), payload).unwrap();
        let second = formatter.format("WARN", &timestamp, Some("p"), payload).unwrap();
        assert_eq!(first.as_bytes(), second.as_bytes());
    }
}
