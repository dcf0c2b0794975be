use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use archive_engine::ArchiveRegistry;
use archiver_api::{Broker, Delivery};

use crate::config::{IngestConfig, MalformedPolicy};
use crate::content::DecoderRegistry;
use crate::error::{ContentError, IngestError};
use crate::headers::merge_headers;
use crate::key::{UNDEF, extract_key};
use crate::stats::IngestStats;

// ═══════════════════════════════════════════════════════════════
//  Consumer: broker.recv() → decode → key → merge → write → ack
// ═══════════════════════════════════════════════════════════════

/// Sequential ingestion of one topic into the archive registry.
///
/// A message is acknowledged only after its document was appended, so a
/// failure anywhere before the ack leaves it to be redelivered.
pub struct Consumer {
    config: IngestConfig,
    decoders: Arc<DecoderRegistry>,
    registry: Arc<ArchiveRegistry>,
    stats: Arc<IngestStats>,
}

impl Consumer {
    pub fn new(
        config: IngestConfig,
        decoders: Arc<DecoderRegistry>,
        registry: Arc<ArchiveRegistry>,
        stats: Arc<IngestStats>,
    ) -> Self {
        Self {
            config,
            decoders,
            registry,
            stats,
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn stats(&self) -> &Arc<IngestStats> {
        &self.stats
    }

    /// One full broker session: connect, subscribe, consume, clean up.
    ///
    /// `Ok(())` means the session was cancelled. Unsubscribe and disconnect run
    /// on every exit after a successful connect.
    pub async fn run<B: Broker + ?Sized>(
        &self,
        broker: &mut B,
        address: &str,
        token: &CancellationToken,
    ) -> Result<(), IngestError> {
        let topic = self.config.topic.as_str();
        tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(()),
            connected = broker.connect(address) => connected?,
        }
        tracing::info!(topic, address, "connected to broker");

        if let Err(e) = broker.subscribe(topic).await {
            disconnect(broker, topic).await;
            return Err(e.into());
        }
        tracing::info!(topic, "subscribed");

        let result = self.consume(broker, token).await;

        if let Err(e) = broker.unsubscribe().await {
            tracing::warn!(topic, error = %e, "unsubscribe failed");
        }
        disconnect(broker, topic).await;
        result
    }

    /// Process deliveries until cancelled, the stream ends, or a message fails.
    ///
    /// Cancellation is only observed while waiting for the next message.
    pub async fn consume<B: Broker + ?Sized>(
        &self,
        broker: &mut B,
        token: &CancellationToken,
    ) -> Result<(), IngestError> {
        loop {
            let received = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::info!(topic = %self.config.topic, "consumer cancelled");
                    return Ok(());
                }
                received = broker.recv() => received?,
            };
            let Some(delivery) = received else {
                return Err(IngestError::EndOfStream);
            };
            self.handle(broker, delivery).await?;
        }
    }

    async fn handle<B: Broker + ?Sized>(
        &self,
        broker: &mut B,
        delivery: Delivery,
    ) -> Result<(), IngestError> {
        let topic = self.config.topic.as_str();
        self.stats.record_received();

        let tag = delivery.header(&self.config.content_type_header);
        let decoded = match self.decoders.decode(tag, &delivery.payload) {
            Ok(decoded) => decoded,
            Err(ContentError::UnsupportedContentType(tag)) => {
                tracing::warn!(
                    topic,
                    message_id = %delivery.ack.message_id,
                    %tag,
                    "unsupported content type, dropping"
                );
                broker.ack(&delivery.ack).await?;
                self.stats.record_unsupported();
                self.stats.record_acked();
                return Ok(());
            }
            Err(e) => return self.reject(broker, &delivery, e.into()).await,
        };

        let key = extract_key(&decoded, &self.config.key).unwrap_or_else(|| {
            self.stats.record_undef_key();
            tracing::debug!(topic, path = %self.config.key, "partition key not found");
            UNDEF.to_string()
        });

        let doc = match merge_headers(&self.config.headers, &delivery.headers, &decoded) {
            Ok(doc) => doc,
            Err(e) => return self.reject(broker, &delivery, e.into()).await,
        };

        let written = self.registry.write(topic, &key, &doc)?;
        self.stats.record_archived(written);

        broker.ack(&delivery.ack).await?;
        self.stats.record_acked();
        Ok(())
    }

    /// Apply the malformed-payload policy to a delivery that cannot be archived.
    async fn reject<B: Broker + ?Sized>(
        &self,
        broker: &mut B,
        delivery: &Delivery,
        error: IngestError,
    ) -> Result<(), IngestError> {
        match self.config.malformed_payload {
            MalformedPolicy::Terminate => Err(error),
            MalformedPolicy::Skip => {
                tracing::warn!(
                    topic = %self.config.topic,
                    message_id = %delivery.ack.message_id,
                    error = %error,
                    "malformed payload, dropping"
                );
                broker.ack(&delivery.ack).await?;
                self.stats.record_malformed();
                self.stats.record_acked();
                Ok(())
            }
        }
    }
}

async fn disconnect<B: Broker + ?Sized>(broker: &mut B, topic: &str) {
    match broker.disconnect().await {
        Ok(()) => tracing::info!(topic, "disconnected from broker"),
        Err(e) => tracing::warn!(topic, error = %e, "disconnect failed"),
    }
}
