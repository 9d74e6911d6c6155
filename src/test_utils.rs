//! Test utilities for kiosk-ingest
//!
//! This module provides in-memory stand-ins for the broker, the database and
//! the rejection log, so the whole pipeline can run without external services.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::db::repository::{Repository, RepositoryError, RepositoryResult};
use crate::db::{InteractionRepository, ReferenceRepository};
use crate::kafka::{EventStream, KafkaIntegrationError, OffsetBatch, PollEvent, StreamMessage};
use crate::logging::{RejectSink, Rejection};
use crate::models::{FactRow, RatingValue, RequestType};

/// Topic used by the mock stream
pub const MOCK_TOPIC: &str = "lmnh";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
enum ScriptedPoll {
    Event(PollEvent),
    Error(String),
}

/// Scripted [`EventStream`] that records every commit
///
/// Polls return the scripted events in order. Once the script is drained the
/// stream reports `Idle` and, if configured, raises the shutdown flag.
#[derive(Debug, Clone, Default)]
pub struct MockEventStream {
    script: Arc<Mutex<VecDeque<ScriptedPoll>>>,
    commits: Arc<Mutex<Vec<OffsetBatch>>>,
    next_offsets: Arc<Mutex<BTreeMap<i32, i64>>>,
    fail_commits: Arc<AtomicBool>,
    stop_flag: Option<Arc<AtomicBool>>,
}

impl MockEventStream {
    /// Create an empty stream
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise `shutdown` once every scripted event has been polled
    pub fn stop_when_drained(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.stop_flag = Some(shutdown);
        self
    }

    /// Queue a message on partition 0; returns its offset
    pub fn push_payload(&self, payload: &[u8]) -> i64 {
        self.push_payload_to(0, payload)
    }

    /// Queue a message on the given partition; returns its offset
    pub fn push_payload_to(&self, partition: i32, payload: &[u8]) -> i64 {
        let offset = {
            let mut offsets = lock(&self.next_offsets);
            let next = offsets.entry(partition).or_insert(0);
            let offset = *next;
            *next += 1;
            offset
        };

        self.push_message(StreamMessage {
            topic: MOCK_TOPIC.to_string(),
            partition,
            offset,
            payload: Some(payload.to_vec()),
            timestamp: None,
        });
        offset
    }

    /// Queue a JSON message on partition 0
    pub fn push_json(&self, value: &Value) -> i64 {
        self.push_payload(value.to_string().as_bytes())
    }

    /// Queue a fully specified message
    pub fn push_message(&self, message: StreamMessage) {
        lock(&self.script).push_back(ScriptedPoll::Event(PollEvent::Message(message)));
    }

    /// Queue an end-of-partition marker
    pub fn push_eof(&self, partition: i32) {
        lock(&self.script).push_back(ScriptedPoll::Event(PollEvent::EndOfPartition { partition }));
    }

    /// Queue an empty poll
    pub fn push_idle(&self) {
        lock(&self.script).push_back(ScriptedPoll::Event(PollEvent::Idle));
    }

    /// Queue a broker error
    pub fn push_error(&self, message: &str) {
        lock(&self.script).push_back(ScriptedPoll::Error(message.to_string()));
    }

    /// Make every following commit fail
    pub fn fail_commits(&self) {
        self.fail_commits.store(true, Ordering::SeqCst);
    }

    /// Every successful commit, in order
    pub fn commits(&self) -> Vec<OffsetBatch> {
        lock(&self.commits).clone()
    }

    /// Scripted events not yet polled
    pub fn remaining(&self) -> usize {
        lock(&self.script).len()
    }
}

#[async_trait]
impl EventStream for MockEventStream {
    async fn poll(&self, _timeout: Duration) -> Result<PollEvent, KafkaIntegrationError> {
        let next = lock(&self.script).pop_front();

        match next {
            Some(ScriptedPoll::Event(event)) => Ok(event),
            Some(ScriptedPoll::Error(message)) => Err(KafkaIntegrationError::Broker(message)),
            None => {
                if let Some(flag) = &self.stop_flag {
                    flag.store(true, Ordering::SeqCst);
                }
                tokio::task::yield_now().await;
                Ok(PollEvent::Idle)
            },
        }
    }

    async fn commit(&self, batch: &OffsetBatch) -> Result<(), KafkaIntegrationError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(KafkaIntegrationError::OffsetCommitError(
                "mock commit failure".to_string(),
            ));
        }

        lock(&self.commits).push(batch.clone());
        Ok(())
    }
}

/// In-memory reference and fact tables
#[derive(Debug, Clone, Default)]
pub struct MockInteractionRepository {
    ratings: Arc<Mutex<BTreeMap<i32, i32>>>,
    requests: Arc<Mutex<BTreeMap<i32, i32>>>,
    rating_rows: Arc<Mutex<Vec<FactRow>>>,
    request_rows: Arc<Mutex<Vec<FactRow>>>,
    fail_next: Arc<Mutex<Option<String>>>,
}

impl MockInteractionRepository {
    /// Create a new mock repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the mock to fail on the next operation
    pub fn fail_next_operation(&self, error_message: &str) {
        *lock(&self.fail_next) = Some(error_message.to_string());
    }

    /// Stored rating interactions
    pub fn rating_rows(&self) -> Vec<FactRow> {
        lock(&self.rating_rows).clone()
    }

    /// Stored request interactions
    pub fn request_rows(&self) -> Vec<FactRow> {
        lock(&self.request_rows).clone()
    }

    /// Number of rows in the rating lookup table
    pub fn rating_reference_count(&self) -> usize {
        lock(&self.ratings).len()
    }

    /// Number of rows in the request lookup table
    pub fn request_reference_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Id assigned to a rating level, if it was ever resolved
    pub fn rating_id(&self, rating: RatingValue) -> Option<i32> {
        lock(&self.ratings).get(&rating.value()).copied()
    }

    fn check_failure(&self) -> RepositoryResult<()> {
        match lock(&self.fail_next).take() {
            Some(message) => Err(RepositoryError::QueryExecution(message)),
            None => Ok(()),
        }
    }

    fn resolve(table: &Mutex<BTreeMap<i32, i32>>, value: i32) -> i32 {
        let mut table = lock(table);
        let next_id = table.len() as i32 + 1;
        *table.entry(value).or_insert(next_id)
    }
}

#[async_trait]
impl Repository for MockInteractionRepository {
    async fn health_check(&self) -> RepositoryResult<()> {
        self.check_failure()
    }
}

#[async_trait]
impl ReferenceRepository for MockInteractionRepository {
    async fn resolve_rating_id(&self, rating: RatingValue) -> RepositoryResult<i32> {
        self.check_failure()?;
        Ok(Self::resolve(&self.ratings, rating.value()))
    }

    async fn resolve_request_type_id(&self, request_type: RequestType) -> RepositoryResult<i32> {
        self.check_failure()?;
        Ok(Self::resolve(&self.requests, request_type.value()))
    }
}

#[async_trait]
impl InteractionRepository for MockInteractionRepository {
    async fn insert_rating_interaction(&self, row: &FactRow) -> RepositoryResult<i64> {
        self.check_failure()?;
        let mut rows = lock(&self.rating_rows);
        rows.push(row.clone());
        Ok(rows.len() as i64)
    }

    async fn insert_request_interaction(&self, row: &FactRow) -> RepositoryResult<i64> {
        self.check_failure()?;
        let mut rows = lock(&self.request_rows);
        rows.push(row.clone());
        Ok(rows.len() as i64)
    }

    async fn count_rating_interactions(&self) -> RepositoryResult<i64> {
        self.check_failure()?;
        Ok(lock(&self.rating_rows).len() as i64)
    }

    async fn count_request_interactions(&self) -> RepositoryResult<i64> {
        self.check_failure()?;
        Ok(lock(&self.request_rows).len() as i64)
    }
}

/// Reject sink that keeps every rejection in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryRejectSink {
    rejections: Arc<Mutex<Vec<Rejection>>>,
}

impl MemoryRejectSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejections recorded so far
    pub fn rejections(&self) -> Vec<Rejection> {
        lock(&self.rejections).clone()
    }
}

impl RejectSink for MemoryRejectSink {
    fn reject(&self, rejection: &Rejection) {
        lock(&self.rejections).push(rejection.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn row() -> FactRow {
        FactRow {
            exhibition_id: 1,
            reference_id: 1,
            event_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_mock_repository_resolution_is_idempotent() {
        let repo = MockInteractionRepository::new();

        let first = repo.resolve_rating_id(RatingValue::Good).await.unwrap();
        let second = repo.resolve_rating_id(RatingValue::Good).await.unwrap();
        let other = repo.resolve_rating_id(RatingValue::Bad).await.unwrap();

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(repo.rating_reference_count(), 2);
        assert_eq!(repo.rating_id(RatingValue::Good), Some(first));
    }

    #[tokio::test]
    async fn test_mock_repository_failure() {
        let repo = MockInteractionRepository::new();

        // Configure to fail
        repo.fail_next_operation("Test error");

        // Should fail
        assert!(repo.insert_rating_interaction(&row()).await.is_err());

        // Should succeed after failure
        assert!(repo.insert_rating_interaction(&row()).await.is_ok());
        assert_eq!(repo.count_rating_interactions().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_health_check() {
        let repo = MockInteractionRepository::new();
        assert!(repo.health_check().await.is_ok());

        repo.fail_next_operation("Health check failed");
        assert!(repo.health_check().await.is_err());
    }

    #[tokio::test]
    async fn test_mock_stream_script() {
        let shutdown = Arc::new(AtomicBool::new(false));
        let stream = MockEventStream::new().stop_when_drained(Arc::clone(&shutdown));

        assert_eq!(stream.push_json(&json!({"site": "0"})), 0);
        assert_eq!(stream.push_payload(b"{}"), 1);
        stream.push_eof(0);
        stream.push_error("boom");
        assert_eq!(stream.remaining(), 4);

        let timeout = Duration::from_millis(1);
        assert!(matches!(stream.poll(timeout).await, Ok(PollEvent::Message(_))));
        assert!(matches!(stream.poll(timeout).await, Ok(PollEvent::Message(_))));
        assert_eq!(
            stream.poll(timeout).await.unwrap(),
            PollEvent::EndOfPartition { partition: 0 }
        );
        assert!(stream.poll(timeout).await.is_err());

        assert!(!shutdown.load(Ordering::SeqCst));
        assert_eq!(stream.poll(timeout).await.unwrap(), PollEvent::Idle);
        assert!(shutdown.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_mock_stream_commits() {
        let stream = MockEventStream::new();
        let mut batch = OffsetBatch::new();
        batch.track(&StreamMessage {
            topic: MOCK_TOPIC.to_string(),
            partition: 0,
            offset: 9,
            payload: None,
            timestamp: None,
        });

        stream.commit(&batch).await.unwrap();
        assert_eq!(stream.commits(), vec![batch.clone()]);

        stream.fail_commits();
        assert!(stream.commit(&batch).await.is_err());
        assert_eq!(stream.commits().len(), 1);
    }

    #[test]
    fn test_memory_sink() {
        let sink = MemoryRejectSink::new();
        sink.reject(&Rejection::new(json!({}), vec!["invalid val".to_string()]));

        let shared = sink.clone();
        assert_eq!(shared.rejections().len(), 1);
    }
}
