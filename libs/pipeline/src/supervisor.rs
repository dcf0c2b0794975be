use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use archiver_api::Broker;

use crate::consumer::Consumer;

/// Keep a consumer session running until cancelled, reconnecting after the
/// configured delay whenever a session ends with an error.
pub async fn supervise<B: Broker + ?Sized>(
    consumer: &Consumer,
    broker: &mut B,
    address: &str,
    token: &CancellationToken,
) {
    let topic = consumer.config().topic.as_str();
    let delay = consumer.config().reconnect_delay();

    loop {
        match consumer.run(broker, address, token).await {
            Ok(()) => break,
            Err(e) => {
                let stats = consumer.stats().snapshot();
                tracing::error!(
                    topic,
                    error = %e,
                    received = stats.received,
                    archived = stats.archived,
                    "consumer session ended"
                );
            }
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
        tracing::info!(topic, address, "reconnecting");
    }

    let stats = consumer.stats().snapshot();
    tracing::info!(
        topic,
        received = stats.received,
        archived = stats.archived,
        acked = stats.acked,
        undef_keys = stats.undef_keys,
        "consumer stopped"
    );
}

/// Spawn [`supervise`] for an owned broker.
pub fn spawn_supervisor<B: Broker + 'static>(
    consumer: Arc<Consumer>,
    mut broker: B,
    address: String,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        supervise(&consumer, &mut broker, &address, &token).await;
    })
}
