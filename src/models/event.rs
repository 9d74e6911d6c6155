//! Interaction data models
//!
//! This module defines the kiosk event as it arrives on the wire, the typed
//! categorical values it carries, and the validated form that is written to
//! the fact tables.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::convert::TryFrom;

use super::error::{ValidationError, ValidationErrorKind, ValidationErrors, ValidationResult};
use super::validation::{validate_at, validate_site, validate_type, validate_val};

/// `val` sentinel marking a request rather than a rating
pub const REQUEST_SENTINEL: i64 = -1;

/// Exhibit sites, as numbered on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Site {
    Exh00,
    Exh01,
    Exh02,
    Exh03,
    Exh04,
    Exh05,
}

impl Site {
    /// Every known site in wire-code order
    pub const ALL: [Site; 6] = [
        Site::Exh00,
        Site::Exh01,
        Site::Exh02,
        Site::Exh03,
        Site::Exh04,
        Site::Exh05,
    ];

    /// Look up a site by its numeric wire code
    pub fn from_code(code: u64) -> Option<Self> {
        Self::ALL.get(usize::try_from(code).ok()?).copied()
    }

    /// Interpret the loosely typed `site` field.
    ///
    /// Kiosks send the code as a decimal string (`"0"`..`"5"`); bare integers
    /// are accepted too. Anything else, including `"05"` or `" 1"`, is not a site.
    pub fn from_wire(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Self::ALL.iter().copied().find(|site| site.wire_code() == s),
            Value::Number(n) => n.as_u64().and_then(Self::from_code),
            _ => None,
        }
    }

    /// Numeric wire code (0-based)
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Wire code as the kiosks encode it
    pub fn wire_code(&self) -> &'static str {
        match self {
            Site::Exh00 => "0",
            Site::Exh01 => "1",
            Site::Exh02 => "2",
            Site::Exh03 => "3",
            Site::Exh04 => "4",
            Site::Exh05 => "5",
        }
    }

    /// Exhibition code as stored in the `exhibition` table
    pub fn label(&self) -> &'static str {
        match self {
            Site::Exh00 => "EXH_00",
            Site::Exh01 => "EXH_01",
            Site::Exh02 => "EXH_02",
            Site::Exh03 => "EXH_03",
            Site::Exh04 => "EXH_04",
            Site::Exh05 => "EXH_05",
        }
    }

    /// Storage id of the exhibition: wire codes are 0-based, ids are 1-based
    pub fn exhibition_id(&self) -> i32 {
        i32::from(self.code()) + 1
    }
}

impl std::fmt::Display for Site {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Visitor rating levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RatingValue {
    Terrible,
    Bad,
    Neutral,
    Good,
    Amazing,
}

impl RatingValue {
    pub const ALL: [RatingValue; 5] = [
        RatingValue::Terrible,
        RatingValue::Bad,
        RatingValue::Neutral,
        RatingValue::Good,
        RatingValue::Amazing,
    ];

    /// Parse a rating from its wire value
    pub fn from_value(value: i64) -> Option<Self> {
        Self::ALL.get(usize::try_from(value).ok()?).copied()
    }

    /// Wire and storage value
    pub fn value(&self) -> i32 {
        *self as i32
    }

    /// Description stored alongside the value in the `rating` table
    pub fn description(&self) -> &'static str {
        match self {
            RatingValue::Terrible => "Terrible",
            RatingValue::Bad => "Bad",
            RatingValue::Neutral => "Neutral",
            RatingValue::Good => "Good",
            RatingValue::Amazing => "Amazing",
        }
    }
}

/// Kinds of help a visitor can request from a kiosk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RequestType {
    Assistance,
    Emergency,
}

impl RequestType {
    pub const ALL: [RequestType; 2] = [RequestType::Assistance, RequestType::Emergency];

    /// Parse a request type from its wire value
    pub fn from_value(value: i64) -> Option<Self> {
        Self::ALL.get(usize::try_from(value).ok()?).copied()
    }

    /// Wire and storage value
    pub fn value(&self) -> i32 {
        *self as i32
    }

    /// Description stored alongside the value in the `request` table
    pub fn description(&self) -> &'static str {
        match self {
            RequestType::Assistance => "assistance",
            RequestType::Emergency => "emergency",
        }
    }
}

/// What the visitor did at the kiosk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interaction {
    /// A rating button press
    Rating(RatingValue),
    /// A help request button press
    Request(RequestType),
}

impl Interaction {
    /// Fact table the interaction is written to
    pub fn table(&self) -> &'static str {
        match self {
            Interaction::Rating(_) => "rating_interaction",
            Interaction::Request(_) => "request_interaction",
        }
    }
}

/// Raw event as received from Kafka
///
/// Fields are kept loosely typed so that every malformed value can be
/// reported instead of failing the whole decode. Unknown keys are preserved
/// for the rejection log.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RawEvent {
    /// Exhibit code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<Value>,

    /// Rating level, or -1 for a request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val: Option<Value>,

    /// Request type, only meaningful when `val` is -1
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub request_type: Option<Value>,

    /// When the button was pressed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<Value>,

    /// Any other keys the kiosk sent
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawEvent {
    /// Decode a Kafka payload
    pub fn decode(payload: &[u8]) -> ValidationResult<Self> {
        serde_json::from_slice(payload).map_err(|e| {
            ValidationError::with_context(
                ValidationErrorKind::MalformedPayload,
                "payload",
                e.to_string(),
            )
        })
    }

    /// Build an event from an already parsed JSON value
    pub fn from_value(value: Value) -> ValidationResult<Self> {
        serde_json::from_value(value).map_err(|e| {
            ValidationError::with_context(
                ValidationErrorKind::MalformedPayload,
                "payload",
                e.to_string(),
            )
        })
    }

    /// `val` as an integer, when it is one
    pub fn val_as_i64(&self) -> Option<i64> {
        self.val.as_ref().and_then(Value::as_i64)
    }

    /// Whether this event claims to be a request
    pub fn is_request(&self) -> bool {
        self.val_as_i64() == Some(REQUEST_SENTINEL)
    }

    /// Check every rule and return all violations
    pub fn validate_fields(&self) -> Result<ValidatedEvent, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let site = validate_site(self.site.as_ref()).map_err(|e| errors.add(e)).ok();
        let val = validate_val(self.val.as_ref()).map_err(|e| errors.add(e)).ok();

        let interaction = match val {
            Some(REQUEST_SENTINEL) => validate_type(self.request_type.as_ref())
                .map(Interaction::Request)
                .map_err(|e| errors.add(e))
                .ok(),
            Some(level) => RatingValue::from_value(level).map(Interaction::Rating),
            None => None,
        };

        let at = validate_at(self.at.as_ref()).map_err(|e| errors.add(e)).ok();

        match (site, interaction, at) {
            (Some(site), Some(interaction), Some(at)) if errors.is_empty() => Ok(ValidatedEvent {
                site,
                interaction,
                at,
            }),
            _ => Err(errors),
        }
    }

    /// Copy of the event with the rejection reasons attached under `invalid`
    pub fn annotated(&self, reasons: &[String]) -> Value {
        let mut record = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        record.insert(
            "invalid".to_string(),
            Value::Array(reasons.iter().cloned().map(Value::String).collect()),
        );
        Value::Object(record)
    }
}

/// Event that passed every rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedEvent {
    /// Exhibit the kiosk belongs to
    pub site: Site,

    /// Rating or request
    pub interaction: Interaction,

    /// When the button was pressed, in the kiosk's own offset
    pub at: DateTime<FixedOffset>,
}

impl ValidatedEvent {
    /// Storage id of the exhibition
    pub fn exhibition_id(&self) -> i32 {
        self.site.exhibition_id()
    }

    /// Build the fact row for an already resolved reference id
    pub fn fact_row(&self, reference_id: i32) -> FactRow {
        FactRow {
            exhibition_id: self.exhibition_id(),
            reference_id,
            event_at: self.at.with_timezone(&Utc),
        }
    }
}

impl TryFrom<&RawEvent> for ValidatedEvent {
    type Error = ValidationErrors;

    fn try_from(raw: &RawEvent) -> Result<Self, Self::Error> {
        raw.validate_fields()
    }
}

/// Row in `rating_interaction` or `request_interaction`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactRow {
    pub exhibition_id: i32,
    pub reference_id: i32,
    pub event_at: DateTime<Utc>,
}

/// Builder for creating test events
#[cfg(test)]
pub struct EventBuilder {
    site: Value,
    val: Value,
    request_type: Option<Value>,
    at: Option<Value>,
}

#[cfg(test)]
impl EventBuilder {
    pub fn new() -> Self {
        Self {
            site: Value::from("0"),
            val: Value::from(2),
            request_type: None,
            at: Some(Value::from("2024-05-01T10:00:00.000000+00:00")),
        }
    }

    pub fn site(mut self, site: impl Into<Value>) -> Self {
        self.site = site.into();
        self
    }

    pub fn val(mut self, val: impl Into<Value>) -> Self {
        self.val = val.into();
        self
    }

    pub fn request_type(mut self, request_type: impl Into<Value>) -> Self {
        self.request_type = Some(request_type.into());
        self
    }

    pub fn at(mut self, at: &str) -> Self {
        self.at = Some(Value::from(at));
        self
    }

    pub fn without_at(mut self) -> Self {
        self.at = None;
        self
    }

    pub fn build(self) -> RawEvent {
        RawEvent {
            site: Some(self.site),
            val: Some(self.val),
            request_type: self.request_type,
            at: self.at,
            extra: Map::new(),
        }
    }
}
