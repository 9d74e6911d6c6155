//! Backfill and live ingest loop with explicit offset commits

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use super::{EventStream, MessageProcessor, OffsetBatch, PollEvent, ProcessingResult, StreamMessage};
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::logging::DIAGNOSTICS_TARGET;

/// Which part of the run the loop is in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    /// Fixed batch of historical messages, committed once at the end
    Backfill,
    /// Unbounded consumption with batched commits
    Live,
}

/// Loop tuning, usually derived from [`PipelineConfig`]
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub backfill_messages: u64,
    pub sample_every: u64,
    pub poll_timeout: Duration,
    pub commit_batch_size: usize,
    pub commit_interval: Duration,
}

impl From<&PipelineConfig> for LoopSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            backfill_messages: config.backfill_messages,
            sample_every: config.sample_every.max(1),
            poll_timeout: config.poll_timeout(),
            commit_batch_size: config.commit_batch_size.max(1),
            commit_interval: config.commit_interval(),
        }
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

/// Counters reported when the loop exits
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoopStats {
    pub backfill_messages: u64,
    pub live_messages: u64,
    pub persisted: u64,
    pub rejected: u64,
    pub storage_failures: u64,
    pub end_of_partition: u64,
    pub commits: u64,
}

/// Sequential poll, process and commit loop
pub struct IngestLoop<S: EventStream> {
    stream: S,
    processor: MessageProcessor,
    settings: LoopSettings,
    shutdown: Arc<AtomicBool>,
    stats: LoopStats,
}

impl<S: EventStream> IngestLoop<S> {
    pub fn new(
        stream: S,
        processor: MessageProcessor,
        settings: LoopSettings,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            stream,
            processor,
            settings,
            shutdown,
            stats: LoopStats::default(),
        }
    }

    /// Counters so far
    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    /// Phase the loop starts in
    pub fn initial_phase(&self) -> Phase {
        if self.settings.backfill_messages > 0 {
            Phase::Backfill
        } else {
            Phase::Live
        }
    }

    /// Run the backfill (if any), then the live phase until shutdown.
    ///
    /// Fatal errors are returned without committing the pending batch.
    pub async fn run(mut self) -> Result<LoopStats> {
        if self.initial_phase() == Phase::Backfill && !self.run_backfill().await? {
            return Ok(self.stats);
        }

        self.run_live().await?;
        Ok(self.stats)
    }

    /// Consume exactly `backfill_messages` messages and commit them once.
    ///
    /// Returns `false` when shutdown interrupted the batch; whatever was
    /// finalized up to then is committed before returning.
    pub async fn run_backfill(&mut self) -> Result<bool> {
        let target = self.settings.backfill_messages;
        info!(messages = target, "Starting backfill");

        let mut pending = OffsetBatch::new();
        let mut count: u64 = 0;

        while count < target {
            if self.shutdown_requested() {
                info!(
                    processed = count,
                    "Shutdown during backfill, committing finalized offsets"
                );
                self.commit(&pending).await?;
                return Ok(false);
            }

            let Some(message) = self.next_message().await? else {
                continue;
            };

            self.handle(&message, Phase::Backfill, count).await?;
            pending.track(&message);
            count += 1;
            self.stats.backfill_messages = count;
        }

        self.commit(&pending).await?;
        info!(messages = count, "Backfill complete");
        Ok(true)
    }

    /// Consume until shutdown, committing every `commit_batch_size` messages
    /// or every `commit_interval` while offsets are pending.
    pub async fn run_live(&mut self) -> Result<()> {
        info!("Entering live consumption");

        let mut pending = OffsetBatch::new();
        let mut count: u64 = 0;
        let mut last_commit = Instant::now();

        while !self.shutdown_requested() {
            if let Some(message) = self.next_message().await? {
                self.handle(&message, Phase::Live, count).await?;
                pending.track(&message);
                count += 1;
                self.stats.live_messages = count;
            }

            let batch_full = pending.len() >= self.settings.commit_batch_size;
            let interval_due =
                !pending.is_empty() && last_commit.elapsed() >= self.settings.commit_interval;

            if batch_full || interval_due {
                self.commit(&pending).await?;
                pending = OffsetBatch::new();
                last_commit = Instant::now();
            }
        }

        // Final commit before shutdown
        if !pending.is_empty() {
            info!(
                messages = pending.len(),
                "Committing pending offsets before shutdown"
            );
            self.commit(&pending).await?;
        }

        info!("Live consumption stopped");
        Ok(())
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Poll once; `None` for timeouts and end-of-partition markers
    async fn next_message(&mut self) -> Result<Option<StreamMessage>> {
        match self.stream.poll(self.settings.poll_timeout).await {
            Ok(PollEvent::Message(message)) => Ok(Some(message)),
            Ok(PollEvent::EndOfPartition { partition }) => {
                self.stats.end_of_partition += 1;
                info!(target: DIAGNOSTICS_TARGET, partition, "Reached end of partition");
                Ok(None)
            },
            Ok(PollEvent::Idle) => Ok(None),
            Err(e) => {
                crate::log_error!(e, "Fatal broker error");
                Err(Error::from(e))
            },
        }
    }

    async fn handle(&mut self, message: &StreamMessage, phase: Phase, count: u64) -> Result<()> {
        if count % self.settings.sample_every == 0 {
            info!(
                target: DIAGNOSTICS_TARGET,
                phase = ?phase,
                count,
                partition = message.partition,
                offset = message.offset,
                payload = %message.payload_text(),
                "Sampled message"
            );
        }

        match self.processor.process(message).await {
            Ok(ProcessingResult::Persisted { .. }) => self.stats.persisted += 1,
            Ok(ProcessingResult::Rejected { .. }) => self.stats.rejected += 1,
            Ok(ProcessingResult::StorageFailed { .. }) => self.stats.storage_failures += 1,
            Err(e) => {
                crate::log_error!(
                    e,
                    "Storage failed, stopping without committing",
                    partition = message.partition,
                    offset = message.offset,
                );
                return Err(e);
            },
        }

        Ok(())
    }

    async fn commit(&mut self, batch: &OffsetBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        self.stream.commit(batch).await.map_err(|e| {
            crate::log_error!(e, "Offset commit failed");
            Error::from(e)
        })?;

        self.stats.commits += 1;
        info!(messages = batch.len(), "Committed offsets");
        Ok(())
    }
}

/// Shutdown signal handler
///
/// Waits for CTRL+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
