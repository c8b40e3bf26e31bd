//! Header records held by the batch buffer.

use headerproof_merkle_tree::{Hash, HashAlgorithm};

/// A header whose canonical hash has been resolved.
///
/// Immutable once built. Only its leaf survives batching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRecord {
    /// Block height.
    pub number: u64,
    /// Canonical hash the chain associates with `number`.
    pub hash: Hash,
    /// Opaque header payload as received from the node.
    pub raw_header: Vec<u8>,
}

impl HeaderRecord {
    pub fn new(number: u64, hash: Hash, raw_header: Vec<u8>) -> Self {
        Self {
            number,
            hash,
            raw_header,
        }
    }

    /// The Merkle leaf for this header: `H(H(hash))`.
    pub fn leaf(&self, algorithm: HashAlgorithm) -> Hash {
        algorithm.leaf_hash(&self.hash)
    }
}
