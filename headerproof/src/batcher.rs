//! Batching core: buffer, tree construction and the tree store.
//!
//! Headers are appended to a fixed-capacity buffer. When the buffer fills,
//! the batch is hashed into leaves (`H(H(block_hash))`), a Merkle tree is
//! built over them in arrival order and appended to the store, and the
//! buffer is drained.
//!
//! `Batcher` is plain owned state with no interior mutability. The service
//! wraps it in a lock so that a commit is observed as one step.

use std::num::NonZeroUsize;

use headerproof_merkle_tree::{
    Hash, HashAlgorithm, InclusionProof, MerkleTree, ProofStep, MAX_PROOF_STEPS,
};
use tracing::info;

use crate::{BatchBuffer, Config, Error, HeaderRecord, TreeStore};

/// A batch committed to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult {
    /// Index of the new tree in the store.
    pub tree_index: usize,
    pub root: Hash,
    pub leaf_count: usize,
    /// Height of the first header in the batch (arrival order).
    pub first_block: u64,
    /// Height of the last header in the batch (arrival order).
    pub last_block: u64,
    /// Number of hash calls spent on leaves and internal nodes.
    pub hash_count: u32,
}

/// Result returned by [`Batcher::ingest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestResult {
    /// Height of the ingested header.
    pub number: u64,
    /// Canonical hash of the ingested header.
    pub hash: Hash,
    /// Headers buffered after this ingest.
    pub buffered: usize,
    /// Set when this header completed a batch.
    pub committed: Option<CommitResult>,
}

/// Owns the batch buffer and the tree store.
#[derive(Debug, Clone)]
pub struct Batcher {
    algorithm: HashAlgorithm,
    buffer: BatchBuffer,
    store: TreeStore,
}

impl Batcher {
    pub fn new(algorithm: HashAlgorithm, batch_size: NonZeroUsize) -> Self {
        Self {
            algorithm,
            buffer: BatchBuffer::new(batch_size),
            store: TreeStore::new(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, Error> {
        Ok(Self::new(config.hash_algorithm, config.batch_size()?))
    }

    // ── State accessors ─────────────────────────────────────────────────

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn batch_size(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn buffer(&self) -> &BatchBuffer {
        &self.buffer
    }

    pub fn store(&self) -> &TreeStore {
        &self.store
    }

    /// Leaf for a canonical block hash under this batcher's algorithm.
    pub fn leaf_for(&self, block_hash: &Hash) -> Hash {
        self.algorithm.leaf_hash(block_hash)
    }

    // ── Ingestion ───────────────────────────────────────────────────────

    /// Append a resolved header and commit the batch if it is now full.
    pub fn ingest(&mut self, record: HeaderRecord) -> Result<IngestResult, Error> {
        let (number, hash) = (record.number, record.hash);
        let full = self.buffer.append(record)?;
        let committed = if full {
            Some(self.commit_batch()?)
        } else {
            None
        };
        Ok(IngestResult {
            number,
            hash,
            buffered: self.buffer.len(),
            committed,
        })
    }

    /// Drain the full buffer, build a tree from the batch and store it.
    ///
    /// A drained batch is never empty, so the build cannot fail once the
    /// drain succeeded.
    fn commit_batch(&mut self) -> Result<CommitResult, Error> {
        let batch = self.buffer.drain_batch()?;
        let first_block = batch.first().map_or(0, |record| record.number);
        let last_block = batch.last().map_or(0, |record| record.number);
        let leaves: Vec<Hash> = batch
            .iter()
            .map(|record| record.leaf(self.algorithm))
            .collect();
        let leaf_count = leaves.len();

        let (tree, node_hash_count) = MerkleTree::build(self.algorithm, leaves)?;
        let root = *tree.root();
        let tree_index = self.store.append(tree);

        // Two hash calls per leaf plus the internal nodes.
        let hash_count = 2 * leaf_count as u32 + node_hash_count;

        info!(
            tree_index,
            root = %hex::encode(root),
            leaf_count,
            first_block,
            last_block,
            "committed header batch"
        );

        Ok(CommitResult {
            tree_index,
            root,
            leaf_count,
            first_block,
            last_block,
            hash_count,
        })
    }

    // ── Queries ─────────────────────────────────────────────────────────

    /// Buffered header at height `number`. Committed headers are not found.
    pub fn query_by_number(&self, number: u64) -> Option<&HeaderRecord> {
        self.buffer.find_by_number(number)
    }

    /// Buffered header with canonical hash `hash`. Committed headers are not
    /// found.
    pub fn query_by_hash(&self, hash: &Hash) -> Option<&HeaderRecord> {
        self.buffer.find_by_hash(hash)
    }

    // ── Proofs ──────────────────────────────────────────────────────────

    /// Inclusion proof for `leaf` from the first tree that contains it.
    pub fn generate_proof(&self, leaf: &Hash) -> Result<InclusionProof, Error> {
        let tree = self
            .store
            .find_by_leaf(leaf)
            .ok_or_else(|| Error::LeafNotFound(hex::encode(leaf)))?;
        tree.generate_proof(leaf)
            .ok_or_else(|| Error::LeafNotFound(hex::encode(leaf)))
    }

    /// Check that `steps` lead from `leaf` to `root`.
    ///
    /// `root` must belong to a committed tree (`RootNotFound` otherwise) and
    /// the number of steps must equal that tree's depth (`MalformedProof`
    /// otherwise). A well-formed proof that does not check out yields
    /// `Ok(false)`.
    pub fn verify_proof(&self, steps: &[ProofStep], root: &Hash, leaf: &Hash) -> Result<bool, Error> {
        if steps.len() > MAX_PROOF_STEPS {
            return Err(Error::MalformedProof(format!(
                "proof has {} steps, maximum is {}",
                steps.len(),
                MAX_PROOF_STEPS
            )));
        }
        let tree = self
            .store
            .find_by_root(root)
            .ok_or_else(|| Error::RootNotFound(hex::encode(root)))?;
        if steps.len() != tree.depth() {
            return Err(Error::MalformedProof(format!(
                "proof has {} steps but a tree of {} leaves needs {}",
                steps.len(),
                tree.leaf_count(),
                tree.depth()
            )));
        }
        let computed = headerproof_merkle_tree::compute_root_from_path(self.algorithm, leaf, steps);
        Ok(&computed == root)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use headerproof_merkle_tree::{compute_root, Side};
    use proptest::prelude::*;

    use super::*;

    fn record(number: u64) -> HeaderRecord {
        let mut hash = [0u8; 32];
        hash[..8].copy_from_slice(&number.to_le_bytes());
        HeaderRecord::new(number, hash, vec![])
    }

    fn batcher(batch_size: usize) -> Batcher {
        Batcher::new(
            HashAlgorithm::Sha256,
            NonZeroUsize::new(batch_size).expect("non-zero"),
        )
    }

    #[test]
    fn commit_reports_batch_bounds() {
        let mut batcher = batcher(3);
        assert!(batcher.ingest(record(7)).expect("ingest").committed.is_none());
        assert!(batcher.ingest(record(5)).expect("ingest").committed.is_none());
        let result = batcher.ingest(record(6)).expect("ingest");
        let commit = result.committed.expect("committed");

        assert_eq!(result.buffered, 0);
        assert_eq!(commit.tree_index, 0);
        assert_eq!(commit.leaf_count, 3);
        // Arrival order, not height order.
        assert_eq!((commit.first_block, commit.last_block), (7, 6));

        let leaves: Vec<Hash> = [7, 5, 6].map(|n| batcher.leaf_for(&record(n).hash)).to_vec();
        let (root, _) = compute_root(HashAlgorithm::Sha256, &leaves).expect("non-empty");
        assert_eq!(commit.root, root);
        assert_eq!(batcher.store().get(0).map(|t| *t.root()), Some(root));
    }

    #[test]
    fn hash_count_covers_leaves_and_nodes() {
        // 5 leaves: 10 leaf hashes, then levels of 3, 2 and 1 nodes.
        let mut batcher = batcher(5);
        let commit = (0..5)
            .filter_map(|n| batcher.ingest(record(n)).expect("ingest").committed)
            .next()
            .expect("committed");
        assert_eq!(commit.hash_count, 10 + 3 + 2 + 1);

        let mut batcher = self::batcher(1);
        let commit = batcher.ingest(record(0)).expect("ingest").committed.expect("committed");
        assert_eq!(commit.hash_count, 2);
        assert_eq!(commit.root, batcher.leaf_for(&record(0).hash));
    }

    #[test]
    fn second_batch_goes_to_second_tree() {
        let mut batcher = batcher(2);
        let commits: Vec<CommitResult> = (0..5)
            .filter_map(|n| batcher.ingest(record(n)).expect("ingest").committed)
            .collect();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[1].tree_index, 1);
        assert_eq!(commits[1].first_block, 2);
        assert_eq!(batcher.buffer().len(), 1);
        assert_eq!(batcher.query_by_number(4).map(|r| r.number), Some(4));
        assert!(batcher.query_by_number(1).is_none());
    }

    #[test]
    fn single_leaf_proof_is_empty() {
        let mut batcher = batcher(1);
        batcher.ingest(record(9)).expect("ingest");
        let leaf = batcher.leaf_for(&record(9).hash);
        let proof = batcher.generate_proof(&leaf).expect("proof");
        assert!(proof.steps.is_empty());
        assert_eq!(proof.root, leaf);
        assert_matches!(batcher.verify_proof(&[], &leaf, &leaf), Ok(true));
    }

    #[test]
    fn verify_rejects_oversized_and_misshapen_proofs() {
        let mut batcher = batcher(2);
        batcher.ingest(record(0)).expect("ingest");
        batcher.ingest(record(1)).expect("ingest");
        let leaf = batcher.leaf_for(&record(0).hash);
        let proof = batcher.generate_proof(&leaf).expect("proof");

        let too_long = vec![
            ProofStep {
                sibling: [0; 32],
                side: Side::Left,
            };
            MAX_PROOF_STEPS + 1
        ];
        assert_matches!(
            batcher.verify_proof(&too_long, &proof.root, &leaf),
            Err(Error::MalformedProof(_))
        );
        assert_matches!(
            batcher.verify_proof(&[], &proof.root, &leaf),
            Err(Error::MalformedProof(_))
        );
        assert_matches!(
            batcher.verify_proof(&proof.steps, &[3; 32], &leaf),
            Err(Error::RootNotFound(_))
        );
    }

    #[test]
    fn buffered_leaf_has_no_proof() {
        let mut batcher = batcher(2);
        batcher.ingest(record(0)).expect("ingest");
        let leaf = batcher.leaf_for(&record(0).hash);
        assert_matches!(batcher.generate_proof(&leaf), Err(Error::LeafNotFound(_)));
    }

    proptest! {
        #[test]
        fn every_committed_leaf_proves(batch_size in 1usize..12, extra in 0usize..12) {
            let mut batcher = batcher(batch_size);
            let total = (batch_size * 2 + extra) as u64;
            for n in 0..total {
                batcher.ingest(record(n)).expect("ingest");
            }
            let trees = total as usize / batch_size;
            prop_assert_eq!(batcher.store().len(), trees);
            prop_assert_eq!(batcher.buffer().len(), total as usize % batch_size);

            for n in 0..(trees * batch_size) as u64 {
                let leaf = batcher.leaf_for(&record(n).hash);
                let proof = batcher.generate_proof(&leaf).expect("committed");
                prop_assert_eq!(batcher.verify_proof(&proof.steps, &proof.root, &leaf).ok(), Some(true));
            }
        }
    }
}
