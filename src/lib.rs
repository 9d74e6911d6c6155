//! kiosk-ingest Library
//!
//! This library exposes the core modules of kiosk-ingest for use in integration tests
//! and by the `kiosk-ingest` binary.

pub mod config;
pub mod db;
pub mod error;
pub mod kafka;
pub mod logging;
pub mod models;
pub mod test_utils;

// Re-export commonly used types at the crate root
pub use config::Config;
pub use error::{Error, Result};

// Re-export model types
pub use models::{
    RawEvent, Site, ValidatedEvent, ValidationError, ValidationErrorKind, ValidationVerdict,
};

// Re-export the ingest pipeline
pub use kafka::{shutdown_signal, IngestLoop, LoopSettings, LoopStats, MessageProcessor};
