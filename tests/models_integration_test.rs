//! Integration tests for kiosk-ingest data models
//!
//! These tests exercise decoding and the validation rules through the public
//! API, checking reason codes and boundaries the way the consumer sees them.

use kiosk_ingest::models::{
    validate, Interaction, RatingValue, RequestType, ValidationErrorKind, REQUEST_SENTINEL,
};
use kiosk_ingest::test_utils::MemoryRejectSink;
use kiosk_ingest::{RawEvent, Site, ValidationVerdict};
use serde_json::{json, Value};

/// Helper to create a valid rating event JSON
fn rating_json() -> Value {
    json!({
        "site": "0",
        "val": 2,
        "at": "2024-05-01T10:00:00.000000+00:00"
    })
}

fn reasons_for(value: Value) -> Vec<String> {
    let raw = RawEvent::from_value(value).expect("Should decode event object");
    let sink = MemoryRejectSink::new();

    match validate(&raw, &sink) {
        ValidationVerdict::Valid(_) => Vec::new(),
        ValidationVerdict::Rejected(errors) => errors.reasons(),
    }
}

fn with(mut value: Value, key: &str, field: Value) -> Value {
    value[key] = field;
    value
}

#[test]
fn test_valid_rating_event() {
    let raw = RawEvent::from_value(rating_json()).unwrap();
    let sink = MemoryRejectSink::new();

    match validate(&raw, &sink) {
        ValidationVerdict::Valid(event) => {
            assert_eq!(event.site, Site::Exh00);
            assert_eq!(event.interaction, Interaction::Rating(RatingValue::Neutral));
            assert_eq!(event.exhibition_id(), 1);
        },
        ValidationVerdict::Rejected(errors) => panic!("unexpected rejection: {}", errors),
    }
    assert!(sink.rejections().is_empty());
}

#[test]
fn test_every_site_code_is_accepted() {
    for code in 0..=5 {
        let event = with(rating_json(), "site", json!(code.to_string()));
        assert!(reasons_for(event).is_empty(), "site {} should be valid", code);
    }
}

#[test]
fn test_unknown_site_is_rejected() {
    for site in [json!("6"), json!("-1"), json!("EXH_00"), json!(null), json!([0])] {
        let reasons = reasons_for(with(rating_json(), "site", site.clone()));
        assert!(
            reasons.contains(&"invalid site".to_string()),
            "site {} should be rejected",
            site
        );
    }
}

#[test]
fn test_val_range() {
    for val in [-1, 0, 1, 2, 3, 4] {
        let mut event = with(rating_json(), "val", json!(val));
        if val == REQUEST_SENTINEL {
            event = with(event, "type", json!(1));
        }
        assert!(reasons_for(event).is_empty(), "val {} should be valid", val);
    }

    for val in [json!(-2), json!(5), json!(100), json!("3"), json!(1.5)] {
        let reasons = reasons_for(with(rating_json(), "val", val));
        assert_eq!(reasons, vec!["invalid val"]);
    }
}

#[test]
fn test_type_only_checked_for_requests() {
    let request = with(with(rating_json(), "val", json!(-1)), "type", json!(2));
    assert_eq!(reasons_for(request), vec!["invalid type"]);

    let missing_type = with(rating_json(), "val", json!(-1));
    assert_eq!(reasons_for(missing_type), vec!["invalid type"]);

    for val in 0..=4 {
        let rating = with(with(rating_json(), "val", json!(val)), "type", json!(9));
        assert!(reasons_for(rating).is_empty());
    }
}

#[test]
fn test_request_types() {
    for (code, expected) in [(0, RequestType::Assistance), (1, RequestType::Emergency)] {
        let raw = RawEvent::from_value(with(
            with(rating_json(), "val", json!(-1)),
            "type",
            json!(code),
        ))
        .unwrap();

        match validate(&raw, &MemoryRejectSink::new()) {
            ValidationVerdict::Valid(event) => {
                assert_eq!(event.interaction, Interaction::Request(expected));
                assert_eq!(event.interaction.table(), "request_interaction");
            },
            ValidationVerdict::Rejected(errors) => panic!("unexpected rejection: {}", errors),
        }
    }
}

#[test]
fn test_operating_hours_are_inclusive() {
    for at in [
        "2024-05-01T08:45:00.000000+00:00",
        "2024-05-01T18:15:00.000000+00:00",
        "2024-05-01T13:30:00.000000+00:00",
    ] {
        assert!(reasons_for(with(rating_json(), "at", json!(at))).is_empty(), "{}", at);
    }

    for at in [
        "2024-05-01T08:44:59.999999+00:00",
        "2024-05-01T18:15:01.000000+00:00",
        "2024-05-01T23:00:00.000000+00:00",
        "2024-05-01T03:00:00.000000+00:00",
    ] {
        assert_eq!(
            reasons_for(with(rating_json(), "at", json!(at))),
            vec!["outside operating hours"],
            "{}",
            at
        );
    }
}

#[test]
fn test_timestamp_errors() {
    let mut missing = rating_json();
    missing.as_object_mut().unwrap().remove("at");
    assert_eq!(reasons_for(missing), vec!["missing timestamp"]);

    for at in [json!("01/05/2024 10:00"), json!("not a time"), json!(12)] {
        assert_eq!(
            reasons_for(with(rating_json(), "at", at)),
            vec!["invalid timestamp"]
        );
    }
}

#[test]
fn test_all_violations_are_reported() {
    let event = json!({
        "site": "12",
        "val": 9,
        "at": "2024-05-01T07:00:00.000000+00:00"
    });

    assert_eq!(
        reasons_for(event),
        vec!["invalid site", "invalid val", "outside operating hours"]
    );
}

#[test]
fn test_rejection_keeps_original_fields() {
    let event = json!({
        "site": "7",
        "val": 1,
        "at": "2024-05-01T10:00:00.000000+00:00",
        "kiosk": "north-hall"
    });
    let raw = RawEvent::from_value(event).unwrap();
    let sink = MemoryRejectSink::new();

    assert!(!validate(&raw, &sink).is_valid());

    let rejections = sink.rejections();
    assert_eq!(rejections.len(), 1);
    let record = &rejections[0].record;
    assert_eq!(record["kiosk"], json!("north-hall"));
    assert_eq!(record["site"], json!("7"));
    assert_eq!(record["invalid"], json!(["invalid site"]));
    assert!(raw.extra.get("invalid").is_none());
}

#[test]
fn test_decode_failures() {
    for payload in [&b""[..], b"null", b"\"text\"", b"{\"site\":"] {
        let err = RawEvent::decode(payload).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::MalformedPayload);
    }
}
