//! Message processing logic for kiosk events

use crate::db::{InteractionRepository, ReferenceRepository, RepositoryResult};
use crate::error::{Error, Result};
use crate::logging::{RejectSink, Rejection, Timer};
use crate::models::{validate, Interaction, RawEvent, ValidatedEvent, ValidationVerdict};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, Instrument};

use super::StreamMessage;

/// Reason attached to messages skipped after storage kept failing
pub const STORAGE_FAILURE: &str = "storage failure";

/// Final outcome of one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingResult {
    /// Written to a fact table
    Persisted { table: &'static str, id: i64 },

    /// Failed validation and was logged to the reject sink
    Rejected { reasons: Vec<String> },

    /// Storage failed after retries; logged to the reject sink and skipped
    StorageFailed { error: String },
}

impl ProcessingResult {
    /// Short label used as the `outcome` span field
    pub fn label(&self) -> &'static str {
        match self {
            ProcessingResult::Persisted { .. } => "persisted",
            ProcessingResult::Rejected { .. } => "rejected",
            ProcessingResult::StorageFailed { .. } => "storage_failed",
        }
    }
}

/// Decodes, validates, resolves and persists one message at a time
#[derive(Clone)]
pub struct MessageProcessor {
    /// Resolver for rating and request reference ids
    references: Arc<dyn ReferenceRepository>,

    /// Writer for the fact tables
    interactions: Arc<dyn InteractionRepository>,

    /// Destination for rejected messages
    sink: Arc<dyn RejectSink>,

    /// Log and skip on final storage failure instead of stopping
    skip_storage_failures: bool,
}

impl MessageProcessor {
    /// Create a new message processor
    pub fn new(
        references: Arc<dyn ReferenceRepository>,
        interactions: Arc<dyn InteractionRepository>,
        sink: Arc<dyn RejectSink>,
        skip_storage_failures: bool,
    ) -> Self {
        Self {
            references,
            interactions,
            sink,
            skip_storage_failures,
        }
    }

    /// Process a single message to a final outcome.
    ///
    /// Returns an error only when storage failed and skipping is disabled;
    /// the message must then not be committed.
    pub async fn process(&self, message: &StreamMessage) -> Result<ProcessingResult> {
        let span = crate::kafka_span!(message.partition, message.offset);
        let timer = Timer::start("process_message");

        let result = self.process_inner(message).instrument(span.clone()).await;

        let elapsed = timer.stop();
        span.record("processing_time_ms", elapsed.as_millis() as u64);
        if let Ok(outcome) = &result {
            span.record("outcome", outcome.label());
        }

        result
    }

    async fn process_inner(&self, message: &StreamMessage) -> Result<ProcessingResult> {
        let raw = match RawEvent::decode(message.payload_bytes()) {
            Ok(raw) => raw,
            Err(e) => {
                debug!(error = %e, "Undecodable payload");
                let reasons = vec![e.kind.to_string()];
                let record = json!({
                    "payload": message.payload_text(),
                    "invalid": &reasons,
                });
                self.sink.reject(&Rejection::new(record, reasons.clone()));
                return Ok(ProcessingResult::Rejected { reasons });
            },
        };

        let event = match validate(&raw, self.sink.as_ref()) {
            ValidationVerdict::Valid(event) => event,
            ValidationVerdict::Rejected(errors) => {
                return Ok(ProcessingResult::Rejected {
                    reasons: errors.reasons(),
                });
            },
        };

        match self.store(&event).await {
            Ok(id) => {
                debug!(
                    table = event.interaction.table(),
                    id,
                    exhibition_id = event.exhibition_id(),
                    "Interaction persisted"
                );
                Ok(ProcessingResult::Persisted {
                    table: event.interaction.table(),
                    id,
                })
            },
            Err(e) if self.skip_storage_failures => {
                error!(error = %e, "Storage failed, skipping message");
                let mut record = raw.annotated(&[STORAGE_FAILURE.to_string()]);
                if let Value::Object(map) = &mut record {
                    map.insert("error".to_string(), Value::String(e.to_string()));
                }
                self.sink
                    .reject(&Rejection::new(record, vec![STORAGE_FAILURE.to_string()]));
                Ok(ProcessingResult::StorageFailed {
                    error: e.to_string(),
                })
            },
            Err(e) => Err(Error::from(e)),
        }
    }

    /// Resolve the reference id, then write the fact row
    async fn store(&self, event: &ValidatedEvent) -> RepositoryResult<i64> {
        let reference_id = match event.interaction {
            Interaction::Rating(rating) => self.references.resolve_rating_id(rating).await?,
            Interaction::Request(request_type) => {
                self.references
                    .resolve_request_type_id(request_type)
                    .await?
            },
        };

        self.interactions
            .persist(event, event.exhibition_id(), reference_id)
            .await
    }
}
