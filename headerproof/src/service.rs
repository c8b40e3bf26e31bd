//! Service coordinator shared by the ingestor and the control plane.
//!
//! The batcher sits behind a single `RwLock`. Ingestion takes the write
//! lock for the append and any commit that follows, so readers see either
//! the state before a commit or the state after it. Header events are
//! serialized by a separate mutex held across hash resolution.

use std::sync::Arc;

use headerproof_merkle_tree::{Hash, HashAlgorithm, InclusionProof, ProofStep};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    ingest::{resolve_record, run_ingestion},
    source::{ChainClient, HeaderEvent, SubstrateClient},
    Batcher, Config, Error, HeaderRecord, IngestResult, IngestStats,
};

/// Snapshot of the service state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    pub batch_size: usize,
    pub algorithm: HashAlgorithm,
    /// Headers waiting in the buffer.
    pub buffered: usize,
    /// Committed trees.
    pub trees: usize,
    /// Roots of committed trees, oldest first.
    pub roots: Vec<Hash>,
    pub stats: IngestStats,
}

struct Inner {
    config: Config,
    batcher: RwLock<Batcher>,
    stats: RwLock<IngestStats>,
    ingest_lock: Mutex<()>,
    ingestion: Mutex<Option<CancellationToken>>,
}

/// Cheap to clone handle to the shared service state.
#[derive(Clone)]
pub struct HeaderProofService {
    inner: Arc<Inner>,
}

impl HeaderProofService {
    pub fn new(config: Config) -> Result<Self, Error> {
        config.validate()?;
        let batcher = Batcher::from_config(&config)?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                batcher: RwLock::new(batcher),
                stats: RwLock::new(IngestStats::default()),
                ingest_lock: Mutex::new(()),
                ingestion: Mutex::new(None),
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    // ── Ingestion ───────────────────────────────────────────────────────

    /// Resolve the canonical hash of `event` and append the header.
    ///
    /// On a resolution failure nothing is appended and the header is counted
    /// as skipped.
    pub async fn ingest(
        &self,
        client: &dyn ChainClient,
        event: HeaderEvent,
    ) -> Result<IngestResult, Error> {
        let _serial = self.inner.ingest_lock.lock().await;
        let result = match resolve_record(client, event).await {
            Ok(record) => self.inner.batcher.write().await.ingest(record),
            Err(e) => Err(e),
        };

        let mut stats = self.inner.stats.write().await;
        match &result {
            Ok(ingested) => {
                stats.ingested += 1;
                if ingested.committed.is_some() {
                    stats.committed += 1;
                }
            }
            Err(e) => {
                stats.skipped += 1;
                stats.last_error = Some(e.to_string());
            }
        }
        result
    }

    /// Append an already resolved header.
    #[cfg(test)]
    pub(crate) async fn ingest_record(&self, record: HeaderRecord) -> Result<IngestResult, Error> {
        let _serial = self.inner.ingest_lock.lock().await;
        let result = self.inner.batcher.write().await.ingest(record)?;
        let mut stats = self.inner.stats.write().await;
        stats.ingested += 1;
        if result.committed.is_some() {
            stats.committed += 1;
        }
        Ok(result)
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub async fn query_by_number(&self, number: u64) -> Option<HeaderRecord> {
        self.inner.batcher.read().await.query_by_number(number).cloned()
    }

    pub async fn query_by_hash(&self, hash: &Hash) -> Option<HeaderRecord> {
        self.inner.batcher.read().await.query_by_hash(hash).cloned()
    }

    pub async fn leaf_for(&self, block_hash: &Hash) -> Hash {
        self.inner.batcher.read().await.leaf_for(block_hash)
    }

    pub async fn generate_proof(&self, leaf: &Hash) -> Result<InclusionProof, Error> {
        self.inner.batcher.read().await.generate_proof(leaf)
    }

    pub async fn verify_proof(
        &self,
        steps: &[ProofStep],
        root: &Hash,
        leaf: &Hash,
    ) -> Result<bool, Error> {
        self.inner.batcher.read().await.verify_proof(steps, root, leaf)
    }

    pub async fn status(&self) -> ServiceStatus {
        let (batch_size, algorithm, buffered, trees, roots) = {
            let batcher = self.inner.batcher.read().await;
            (
                batcher.batch_size(),
                batcher.algorithm(),
                batcher.buffer().len(),
                batcher.store().len(),
                batcher.store().roots().copied().collect(),
            )
        };
        let stats = self.inner.stats.read().await.clone();
        ServiceStatus {
            batch_size,
            algorithm,
            buffered,
            trees,
            roots,
            stats,
        }
    }

    // ── Connection management ───────────────────────────────────────────

    /// Connect to a Substrate node and start ingesting its headers.
    pub async fn connect(&self, url: &str) -> Result<(), Error> {
        let client = SubstrateClient::connect(
            url,
            self.inner.config.connect_timeout(),
            self.inner.config.request_timeout(),
        )
        .await?;
        self.connect_with(Arc::new(client)).await
    }

    /// Subscribe through `client` and replace any running ingestion task.
    pub async fn connect_with(&self, client: Arc<dyn ChainClient>) -> Result<(), Error> {
        let stream = client.subscribe_headers().await?;
        let endpoint = client.endpoint();
        let cancel = CancellationToken::new();

        {
            // Status is updated under the same lock as the token swap, so it
            // always names the endpoint of the live task.
            let mut ingestion = self.inner.ingestion.lock().await;
            if let Some(previous) = ingestion.replace(cancel.clone()) {
                previous.cancel();
            }
            let mut stats = self.inner.stats.write().await;
            stats.connected_to = Some(endpoint.clone());
            stats.last_error = None;
        }
        info!(%endpoint, "subscribed to new headers");

        tokio::spawn(run_ingestion(self.clone(), client, stream, cancel));
        Ok(())
    }

    /// Stop the running ingestion task, if any.
    pub async fn disconnect(&self) {
        if let Some(cancel) = self.inner.ingestion.lock().await.take() {
            cancel.cancel();
            self.inner.stats.write().await.connected_to = None;
            info!("disconnected from node");
        }
    }

    /// Count a header event that could not be decoded.
    pub(crate) async fn record_event_error(&self, reason: String) {
        let mut stats = self.inner.stats.write().await;
        stats.skipped += 1;
        stats.last_error = Some(reason);
    }

    /// Record that the ingestion task owning `cancel` lost its stream.
    ///
    /// Every replaced or stopped task has its token cancelled under the
    /// `ingestion` lock, so a live token here belongs to the active task.
    pub(crate) async fn record_disconnect(&self, cancel: &CancellationToken, reason: String) {
        let mut ingestion = self.inner.ingestion.lock().await;
        if cancel.is_cancelled() {
            return;
        }
        cancel.cancel();
        *ingestion = None;
        drop(ingestion);

        warn!(%reason, "header subscription lost");
        let mut stats = self.inner.stats.write().await;
        stats.connected_to = None;
        stats.last_error = Some(reason);
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Mutex as StdMutex, time::Duration};

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use headerproof_merkle_tree::{HashAlgorithm, Side};
    use tokio::sync::mpsc;

    use super::*;
    use crate::source::{HeaderStream, HEADER_CHANNEL_CAPACITY};

    struct MockChain {
        endpoint: String,
        hashes: StdMutex<HashMap<u64, Hash>>,
        stream: StdMutex<Option<HeaderStream>>,
    }

    impl MockChain {
        fn new() -> (Arc<Self>, mpsc::Sender<Result<HeaderEvent, Error>>) {
            Self::named("mock://chain")
        }

        fn named(endpoint: &str) -> (Arc<Self>, mpsc::Sender<Result<HeaderEvent, Error>>) {
            let (tx, rx) = mpsc::channel(HEADER_CHANNEL_CAPACITY);
            let chain = Arc::new(Self {
                endpoint: endpoint.to_string(),
                hashes: StdMutex::new(HashMap::new()),
                stream: StdMutex::new(Some(rx)),
            });
            (chain, tx)
        }

        fn with_blocks(numbers: impl IntoIterator<Item = u64>) -> Arc<Self> {
            let (chain, _tx) = Self::new();
            for number in numbers {
                chain.set_hash(number, block_hash(number));
            }
            chain
        }

        fn set_hash(&self, number: u64, hash: Hash) {
            self.hashes.lock().expect("lock").insert(number, hash);
        }
    }

    #[async_trait]
    impl ChainClient for MockChain {
        async fn subscribe_headers(&self) -> Result<HeaderStream, Error> {
            self.stream
                .lock()
                .expect("lock")
                .take()
                .ok_or_else(|| Error::ConnectionFailure("already subscribed".into()))
        }

        async fn canonical_hash(&self, number: u64) -> Result<Hash, Error> {
            self.hashes
                .lock()
                .expect("lock")
                .get(&number)
                .copied()
                .ok_or_else(|| Error::HashResolutionFailure {
                    number,
                    reason: "unknown block".into(),
                })
        }

        fn endpoint(&self) -> String {
            self.endpoint.clone()
        }
    }

    fn block_hash(number: u64) -> Hash {
        let mut hash = [0u8; 32];
        hash[..8].copy_from_slice(&number.to_be_bytes());
        hash[31] = 0xaa;
        hash
    }

    fn event(number: u64) -> HeaderEvent {
        HeaderEvent {
            number,
            reported_hash: None,
            raw_header: format!("header {}", number).into_bytes(),
        }
    }

    fn service(batch_size: usize) -> HeaderProofService {
        HeaderProofService::new(Config {
            batch_size,
            ..Config::default()
        })
        .expect("valid config")
    }

    async fn wait_for(service: &HeaderProofService, condition: fn(&ServiceStatus) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition(&service.status().await) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition reached in time");
    }

    #[tokio::test]
    async fn two_header_batch_end_to_end() {
        let service = service(2);
        let chain = MockChain::with_blocks([100, 101]);

        let first = service.ingest(chain.as_ref(), event(100)).await.expect("ingest");
        assert_eq!(first.buffered, 1);
        assert!(first.committed.is_none());
        assert_eq!(
            service.query_by_number(100).await.map(|r| r.hash),
            Some(block_hash(100))
        );

        let second = service.ingest(chain.as_ref(), event(101)).await.expect("ingest");
        let commit = second.committed.expect("batch committed");
        assert_eq!(second.buffered, 0);
        assert_eq!(commit.leaf_count, 2);
        assert_eq!((commit.first_block, commit.last_block), (100, 101));

        let alg = HashAlgorithm::Sha256;
        let leaf0 = alg.leaf_hash(&block_hash(100));
        let leaf1 = alg.leaf_hash(&block_hash(101));
        assert_eq!(commit.root, alg.hash_pair(&leaf0, &leaf1));

        let proof = service.generate_proof(&leaf0).await.expect("proof");
        assert_eq!(proof.root, commit.root);
        assert_eq!(proof.steps.len(), 1);
        assert_eq!(proof.steps[0].sibling, leaf1);
        assert_eq!(proof.steps[0].side, Side::Right);
        assert_eq!(
            service.verify_proof(&proof.steps, &commit.root, &leaf0).await.ok(),
            Some(true)
        );

        // Committed headers are no longer queryable.
        assert!(service.query_by_number(100).await.is_none());
        assert!(service.query_by_hash(&block_hash(101)).await.is_none());

        let status = service.status().await;
        assert_eq!(status.trees, 1);
        assert_eq!(status.roots, vec![commit.root]);
        assert_eq!(status.stats.ingested, 2);
        assert_eq!(status.stats.committed, 1);
    }

    #[tokio::test]
    async fn resolution_failure_leaves_buffer_unchanged() {
        let service = service(3);
        let chain = MockChain::with_blocks([1]);

        service.ingest(chain.as_ref(), event(1)).await.expect("ingest");
        assert_matches!(
            service.ingest(chain.as_ref(), event(2)).await,
            Err(Error::HashResolutionFailure { number: 2, .. })
        );

        let status = service.status().await;
        assert_eq!(status.buffered, 1);
        assert_eq!(status.trees, 0);
        assert_eq!(status.stats.ingested, 1);
        assert_eq!(status.stats.skipped, 1);
        assert!(status.stats.last_error.is_some());
        assert!(service.query_by_number(2).await.is_none());
    }

    #[tokio::test]
    async fn queries_see_only_buffered_headers() {
        let service = service(4);
        let chain = MockChain::with_blocks(0..6);
        for number in 0..6 {
            service.ingest(chain.as_ref(), event(number)).await.expect("ingest");
        }
        for number in 0..4 {
            assert!(service.query_by_number(number).await.is_none());
        }
        for number in 4..6 {
            let record = service.query_by_number(number).await.expect("buffered");
            assert_eq!(record.raw_header, format!("header {}", number).into_bytes());
            assert_eq!(
                service.query_by_hash(&block_hash(number)).await,
                Some(record)
            );
        }
    }

    #[tokio::test]
    async fn exactly_one_tree_per_full_batch() {
        for batch_size in 1..=9usize {
            let service = service(batch_size);
            let chain = MockChain::with_blocks(0..batch_size as u64);
            for number in 0..batch_size as u64 {
                service.ingest(chain.as_ref(), event(number)).await.expect("ingest");
            }
            let status = service.status().await;
            assert_eq!(status.trees, 1, "batch size {}", batch_size);
            assert_eq!(status.buffered, 0, "batch size {}", batch_size);

            for number in 0..batch_size as u64 {
                let leaf = service.leaf_for(&block_hash(number)).await;
                let proof = service.generate_proof(&leaf).await.expect("proof");
                assert_eq!(
                    service.verify_proof(&proof.steps, &status.roots[0], &leaf).await.ok(),
                    Some(true)
                );
            }
        }
    }

    #[tokio::test]
    async fn verification_errors() {
        let service = service(4);
        let chain = MockChain::with_blocks(0..4);
        for number in 0..4 {
            service.ingest(chain.as_ref(), event(number)).await.expect("ingest");
        }
        let leaf = service.leaf_for(&block_hash(2)).await;
        let proof = service.generate_proof(&leaf).await.expect("proof");

        assert_matches!(
            service.verify_proof(&proof.steps, &[0xee; 32], &leaf).await,
            Err(Error::RootNotFound(_))
        );
        assert_matches!(
            service.verify_proof(&proof.steps[..1], &proof.root, &leaf).await,
            Err(Error::MalformedProof(_))
        );
        assert_eq!(
            service.verify_proof(&proof.steps, &proof.root, &[0x01; 32]).await.ok(),
            Some(false)
        );
        assert_matches!(
            service.generate_proof(&[0x01; 32]).await,
            Err(Error::LeafNotFound(_))
        );
    }

    #[tokio::test]
    async fn connected_client_feeds_the_batcher() {
        let service = service(2);
        let (chain, tx) = MockChain::new();
        for number in 10..13 {
            chain.set_hash(number, block_hash(number));
        }
        service.connect_with(chain.clone()).await.expect("subscribed");
        assert_eq!(
            service.status().await.stats.connected_to.as_deref(),
            Some("mock://chain")
        );

        for number in 10..13 {
            tx.send(Ok(event(number))).await.expect("send");
        }
        // An undecodable event and an unknown height are skipped.
        tx.send(Err(Error::Protocol("bad header".into()))).await.expect("send");
        tx.send(Ok(event(99))).await.expect("send");

        wait_for(&service, |status| status.stats.skipped == 2).await;
        let status = service.status().await;
        assert_eq!(status.stats.ingested, 3);
        assert_eq!(status.trees, 1);
        assert_eq!(status.buffered, 1);

        drop(tx);
        wait_for(&service, |status| status.stats.connected_to.is_none()).await;
        assert!(service.status().await.stats.last_error.is_some());
    }

    #[tokio::test]
    async fn failed_subscription_is_a_connection_failure() {
        let service = service(2);
        let chain = MockChain::with_blocks([]);
        let _first = chain.subscribe_headers().await.expect("first subscription");
        assert_matches!(
            service.connect_with(chain).await,
            Err(Error::ConnectionFailure(_))
        );
        assert!(service.status().await.stats.connected_to.is_none());
    }

    #[tokio::test]
    async fn disconnect_stops_ingestion() {
        let service = service(2);
        let (chain, tx) = MockChain::new();
        chain.set_hash(1, block_hash(1));
        service.connect_with(chain).await.expect("subscribed");
        service.disconnect().await;
        assert!(service.status().await.stats.connected_to.is_none());

        let _ = tx.send(Ok(event(1))).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(service.status().await.stats.ingested, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_connects_report_the_live_endpoint() {
        for _ in 0..20 {
            let service = service(2);
            let (first, first_tx) = MockChain::named("mock://first");
            let (second, second_tx) = MockChain::named("mock://second");

            let (a, b) = tokio::join!(
                tokio::spawn({
                    let service = service.clone();
                    async move { service.connect_with(first).await }
                }),
                tokio::spawn({
                    let service = service.clone();
                    async move { service.connect_with(second).await }
                }),
            );
            a.expect("join").expect("subscribed");
            b.expect("join").expect("subscribed");

            // The replaced task drops its stream, closing that sender.
            tokio::time::timeout(Duration::from_secs(5), async {
                while !first_tx.is_closed() && !second_tx.is_closed() {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
            .await
            .expect("one task replaced");
            let live = if first_tx.is_closed() {
                "mock://second"
            } else {
                "mock://first"
            };
            assert_eq!(
                service.status().await.stats.connected_to.as_deref(),
                Some(live)
            );
        }
    }
}
