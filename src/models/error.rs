//! Rejection reasons for kiosk interactions
//!
//! Each [`ValidationErrorKind`] renders as the reason code written to the
//! rejection log, so the `#[error]` strings are part of the log format.

use std::fmt;
use thiserror::Error;

/// Reasons an interaction can be rejected
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationErrorKind {
    /// `site` is not one of the known exhibit codes
    #[error("invalid site")]
    InvalidSite,

    /// `val` is not a rating level or the request sentinel
    #[error("invalid val")]
    InvalidVal,

    /// `type` is not a known request type on a request event
    #[error("invalid type")]
    InvalidType,

    #[error("missing timestamp")]
    MissingTimestamp,

    #[error("invalid timestamp")]
    InvalidTimestamp,

    /// `at` falls before opening or after closing
    #[error("outside operating hours")]
    OutsideOperatingHours,

    /// The payload could not be decoded into an event object
    #[error("malformed payload")]
    MalformedPayload,
}

/// One failed rule, tied to the wire field it was checked against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub field: &'static str,
    /// What was actually found, for debug logs only
    pub detail: Option<String>,
}

impl ValidationError {
    pub fn new(kind: ValidationErrorKind, field: &'static str) -> Self {
        Self {
            kind,
            field,
            detail: None,
        }
    }

    pub fn with_context(
        kind: ValidationErrorKind,
        field: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            field,
            detail: Some(detail.into()),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}", self.kind, self.field)?;
        if let Some(detail) = &self.detail {
            write!(f, ": {}", detail)?;
        }
        write!(f, ")")
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Every rule an event broke, in rule order
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, error: ValidationError) {
        self.0.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, kind: ValidationErrorKind) -> bool {
        self.0.iter().any(|e| e.kind == kind)
    }

    /// Reason codes as written to the `invalid` array
    pub fn reasons(&self) -> Vec<String> {
        self.0.iter().map(|e| e.kind.to_string()).collect()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join(", "))
    }
}

impl std::error::Error for ValidationErrors {}

impl From<ValidationError> for ValidationErrors {
    fn from(error: ValidationError) -> Self {
        Self(vec![error])
    }
}
