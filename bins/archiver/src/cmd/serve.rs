use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use archive_engine::{ArchiveRegistry, spawn_reaper};
use archiver_api::SystemClock;
use broker_stomp::StompBroker;
use pipeline::{Consumer, DecoderRegistry, IngestStats, spawn_supervisor};

use crate::config::{ArchiverConfig, ServeArgs};
use crate::error::ServerError;

/// How long running tasks get to stop after Ctrl+C before they are aborted.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run(args: ServeArgs) -> Result<(), ServerError> {
    tracing::info!("stomp-archiver starting");

    // --- Load config ---
    let config = ArchiverConfig::load(&args.config)?;
    tracing::info!(
        config = %args.config,
        topic = %config.ingest.topic,
        archive = %config.archive.path.display(),
        "loaded config"
    );

    // --- CancellationToken for graceful shutdown ---
    let token = CancellationToken::new();

    // --- Archive registry + reaper ---
    let registry = Arc::new(ArchiveRegistry::new(&config.archive, Arc::new(SystemClock))?);
    let reaper = spawn_reaper(
        registry.clone(),
        Duration::from_secs(config.archive.reap_interval_secs),
        token.clone(),
    );

    // --- Consumer ---
    let decoders = Arc::new(DecoderRegistry::default());
    tracing::info!(?decoders, "content decoders registered");
    let stats = Arc::new(IngestStats::new());
    let consumer = Arc::new(Consumer::new(
        config.ingest.clone(),
        decoders,
        registry.clone(),
        stats.clone(),
    ));
    let broker = StompBroker::new(config.broker.clone());
    let supervisor = spawn_supervisor(consumer, broker, config.broker.address.clone(), token.clone());

    tracing::info!(
        address = %config.broker.address,
        destination = %config.broker.destination(&config.ingest.topic),
        "archiver ready"
    );

    // --- Wait for Ctrl+C ---
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down...");
    token.cancel();

    drain("supervisor", supervisor).await;
    drain("reaper", reaper).await;

    // --- Flush every open archive ---
    let closed = registry.close_all();
    let snapshot = stats.snapshot();
    tracing::info!(
        received = snapshot.received,
        archived = snapshot.archived,
        acked = snapshot.acked,
        dropped_unsupported = snapshot.dropped_unsupported,
        dropped_malformed = snapshot.dropped_malformed,
        undef_keys = snapshot.undef_keys,
        bytes_archived = snapshot.bytes_archived,
        "ingest totals"
    );
    let closed = closed?;
    tracing::info!(closed, "shutdown complete");
    Ok(())
}

async fn drain(name: &'static str, mut handle: JoinHandle<()>) {
    match tokio::time::timeout(DRAIN_TIMEOUT, &mut handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(task = name, error = %e, "task failed"),
        Err(_) => {
            tracing::warn!(task = name, "task did not stop in time, aborting");
            handle.abort();
            let _ = handle.await;
        }
    }
}
