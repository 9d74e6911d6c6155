//! Validation rules for kiosk interactions
//!
//! Each field has its own check returning either the typed value or a
//! [`ValidationError`]. [`validate`] runs them all against an event and
//! forwards rejected events to a [`RejectSink`].

use chrono::{DateTime, FixedOffset, NaiveTime, Timelike};
use serde_json::Value;

use super::error::{ValidationError, ValidationErrorKind, ValidationErrors, ValidationResult};
use super::event::{RawEvent, RequestType, Site, ValidatedEvent, REQUEST_SENTINEL};
use crate::logging::{Rejection, RejectSink};

/// Opening time, seconds after midnight (08:45)
pub const OPENING_SECONDS: u32 = 8 * 3600 + 45 * 60;

/// Closing time, seconds after midnight (18:15)
pub const CLOSING_SECONDS: u32 = 18 * 3600 + 15 * 60;

/// Accepted layouts for `at`; the second covers offsets written without a colon
const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M:%S%.f%z"];

/// Outcome of validating one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationVerdict {
    /// The event can be persisted
    Valid(ValidatedEvent),
    /// The event was rejected for the given reasons
    Rejected(ValidationErrors),
}

impl ValidationVerdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationVerdict::Valid(_))
    }
}

/// Validate an event, logging every rejection to `sink`.
///
/// All rules are evaluated; a rejected event is forwarded with every reason
/// that applies, attached to a copy of the event.
pub fn validate(event: &RawEvent, sink: &dyn RejectSink) -> ValidationVerdict {
    match event.validate_fields() {
        Ok(validated) => ValidationVerdict::Valid(validated),
        Err(errors) => {
            let reasons = errors.reasons();
            sink.reject(&Rejection::new(event.annotated(&reasons), reasons));
            ValidationVerdict::Rejected(errors)
        },
    }
}

/// `site` must be a known exhibit code
pub fn validate_site(site: Option<&Value>) -> ValidationResult<Site> {
    let value = site.ok_or_else(|| {
        ValidationError::with_context(ValidationErrorKind::InvalidSite, "site", "missing")
    })?;

    Site::from_wire(value).ok_or_else(|| {
        ValidationError::with_context(
            ValidationErrorKind::InvalidSite,
            "site",
            format!("unknown exhibit code {}", value),
        )
    })
}

/// `val` must be a rating level 0..=4 or the request sentinel -1
pub fn validate_val(val: Option<&Value>) -> ValidationResult<i64> {
    match val.and_then(Value::as_i64) {
        Some(v) if (REQUEST_SENTINEL..=4).contains(&v) => Ok(v),
        _ => Err(ValidationError::with_context(
            ValidationErrorKind::InvalidVal,
            "val",
            format!("expected -1..=4, got {}", describe(val)),
        )),
    }
}

/// `type` must be a known request type; only checked on requests
pub fn validate_type(request_type: Option<&Value>) -> ValidationResult<RequestType> {
    request_type
        .and_then(Value::as_i64)
        .and_then(RequestType::from_value)
        .ok_or_else(|| {
            ValidationError::with_context(
                ValidationErrorKind::InvalidType,
                "type",
                format!("expected 0 or 1, got {}", describe(request_type)),
            )
        })
}

/// `at` must be present, parseable and inside operating hours
pub fn validate_at(at: Option<&Value>) -> ValidationResult<DateTime<FixedOffset>> {
    let raw = match at {
        None | Some(Value::Null) => {
            return Err(ValidationError::new(
                ValidationErrorKind::MissingTimestamp,
                "at",
            ))
        },
        Some(Value::String(s)) => s,
        Some(other) => {
            return Err(ValidationError::with_context(
                ValidationErrorKind::InvalidTimestamp,
                "at",
                format!("expected a string, got {}", other),
            ))
        },
    };

    let timestamp = parse_event_timestamp(raw)?;

    if within_operating_hours(timestamp.time()) {
        Ok(timestamp)
    } else {
        Err(ValidationError::with_context(
            ValidationErrorKind::OutsideOperatingHours,
            "at",
            format!("{} is outside 08:45-18:15", timestamp.time()),
        ))
    }
}

/// Parse a kiosk timestamp such as `2024-05-01T10:00:00.000000+00:00`
pub fn parse_event_timestamp(raw: &str) -> ValidationResult<DateTime<FixedOffset>> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(raw, format).ok())
        .ok_or_else(|| {
            ValidationError::with_context(
                ValidationErrorKind::InvalidTimestamp,
                "at",
                format!("cannot parse '{}'", raw),
            )
        })
}

/// Inclusive check against [08:45:00, 18:15:00]; 18:15:00.5 is already closed
pub fn within_operating_hours(time: NaiveTime) -> bool {
    let seconds = time.num_seconds_from_midnight();
    seconds >= OPENING_SECONDS
        && (seconds < CLOSING_SECONDS || (seconds == CLOSING_SECONDS && time.nanosecond() == 0))
}

fn describe(value: Option<&Value>) -> String {
    value.map_or_else(|| "nothing".to_string(), Value::to_string)
}
