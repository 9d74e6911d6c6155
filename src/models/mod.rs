//! Data models for kiosk-ingest
//!
//! This module contains the domain models used throughout the application:
//! the wire event, its typed categorical values, and the validation rules
//! that decide whether an event is stored or rejected.

pub mod error;
pub mod event;
pub mod validation;

// Re-export commonly used types
pub use error::{ValidationError, ValidationErrorKind, ValidationErrors};
pub use event::{
    FactRow, Interaction, RatingValue, RawEvent, RequestType, Site, ValidatedEvent,
    REQUEST_SENTINEL,
};
pub use validation::{validate, within_operating_hours, ValidationVerdict};
