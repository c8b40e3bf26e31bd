use thiserror::Error;

/// Errors from Merkle tree operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MerkleError {
    #[error("cannot build a tree from an empty leaf sequence")]
    EmptyLeaves,
    #[error("leaf index {index} out of range (leaf_count={leaf_count})")]
    LeafIndexOutOfRange { index: usize, leaf_count: usize },
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("invalid proof: {0}")]
    InvalidProof(String),
}
