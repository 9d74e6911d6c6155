//! kiosk-ingest - museum kiosk interaction pipeline
//!
//! This application consumes kiosk ratings and help requests from Kafka,
//! validates them, and stores them in PostgreSQL. Rejected messages are
//! logged with the reasons they failed.

use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use kiosk_ingest::{
    config::Config,
    db::{self, PgInteractionRepository, Repository},
    error::Result,
    kafka::{shutdown_signal, IngestLoop, KafkaEventStream, LoopSettings, MessageProcessor},
    log_error,
    logging::{self, TracingRejectSink},
};

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "kiosk-ingest", version, about = "Ingest kiosk interactions from Kafka")]
struct Cli {
    /// Write rejected and sampled messages to the diagnostics file instead of the console
    #[arg(long)]
    log_to_file: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration from environment
    let config = Config::from_env()?;

    // Validate configuration
    config.validate()?;

    // Initialize logging/tracing
    let diagnostics_file = cli
        .log_to_file
        .then_some(config.pipeline.diagnostics_file.as_path());
    logging::init_tracing(&config.runtime, diagnostics_file)?;

    // Log configuration (with sensitive data masked)
    config.log_config();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting kiosk-ingest");

    let pool = db::create_pool(&config.database).await?;
    if config.database.run_migrations {
        db::run_migrations(&pool).await?;
        tracing::info!("Database migrations applied");
    }

    let repository = Arc::new(PgInteractionRepository::new(pool.clone()));
    repository.health_check().await?;

    let processor = MessageProcessor::new(
        repository.clone(),
        repository,
        Arc::new(TracingRejectSink),
        config.pipeline.skip_storage_failures,
    );

    let stream = KafkaEventStream::new(&config.kafka)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let signal_flag = Arc::clone(&shutdown);
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_flag.store(true, Ordering::Relaxed);
    });

    let ingest = IngestLoop::new(
        stream,
        processor,
        LoopSettings::from(&config.pipeline),
        shutdown,
    );

    let outcome = ingest.run().await;
    pool.close().await;

    match outcome {
        Ok(stats) => {
            tracing::info!(?stats, "kiosk-ingest shutdown complete");
            Ok(())
        },
        Err(e) => {
            log_error!(e, "kiosk-ingest stopped on a fatal error", kind = e.kind());
            Err(e)
        },
    }
}
