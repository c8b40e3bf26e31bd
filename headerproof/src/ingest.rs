//! Header ingestion: resolve each event to a record and feed the batcher.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    source::{ChainClient, HeaderEvent, HeaderStream},
    wire::format_hash,
    Error, HeaderProofService, HeaderRecord,
};

/// Counters and connection state reported by the status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Headers appended to the buffer.
    pub ingested: u64,
    /// Headers dropped because their canonical hash could not be resolved.
    pub skipped: u64,
    /// Batches committed to the tree store.
    pub committed: u64,
    /// Endpoint of the active subscription.
    pub connected_to: Option<String>,
    /// Most recent ingestion failure.
    pub last_error: Option<String>,
}

/// Look up the canonical hash for `event` and build its record.
///
/// Every lookup failure is reported as `HashResolutionFailure` for the
/// event's height.
pub async fn resolve_record(
    client: &dyn ChainClient,
    event: HeaderEvent,
) -> Result<HeaderRecord, Error> {
    let number = event.number;
    let hash = client
        .canonical_hash(number)
        .await
        .map_err(|e| match e {
            e @ Error::HashResolutionFailure { .. } => e,
            other => Error::HashResolutionFailure {
                number,
                reason: other.to_string(),
            },
        })?;
    if let Some(reported) = event.reported_hash {
        if reported != hash {
            debug!(
                number,
                reported = %format_hash(&reported),
                canonical = %format_hash(&hash),
                "reported hash differs from canonical hash"
            );
        }
    }
    Ok(HeaderRecord::new(number, hash, event.raw_header))
}

/// Pull events from `stream` until it ends, fails or `cancel` fires.
///
/// Events are handled one at a time. A header whose hash cannot be resolved
/// or decoded is skipped and ingestion continues; a connection failure ends
/// the loop.
pub async fn run_ingestion(
    service: HeaderProofService,
    client: Arc<dyn ChainClient>,
    mut stream: HeaderStream,
    cancel: CancellationToken,
) {
    let endpoint = client.endpoint();
    info!(%endpoint, "header ingestion started");
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(%endpoint, "header ingestion cancelled");
                return;
            }
            next = stream.recv() => next,
        };

        let event = match next {
            Some(Ok(event)) => event,
            Some(Err(e @ Error::ConnectionFailure(_))) => {
                error!(%endpoint, error = %e, "header stream failed");
                service.record_disconnect(&cancel, e.to_string()).await;
                return;
            }
            Some(Err(e)) => {
                warn!(%endpoint, error = %e, "ignoring bad header event");
                service.record_event_error(e.to_string()).await;
                continue;
            }
            None => {
                warn!(%endpoint, "header stream ended");
                service
                    .record_disconnect(&cancel, format!("header stream from {} ended", endpoint))
                    .await;
                return;
            }
        };

        let number = event.number;
        match service.ingest(client.as_ref(), event).await {
            Ok(result) => {
                info!(
                    number,
                    hash = %format_hash(&result.hash),
                    buffered = result.buffered,
                    "new block"
                );
            }
            Err(e @ Error::HashResolutionFailure { .. }) => {
                warn!(number, error = %e, "skipping header");
            }
            Err(e) => {
                error!(number, error = %e, "failed to ingest header");
            }
        }
    }
}
