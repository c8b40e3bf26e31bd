//! Error types for header batching, proof serving and chain access.

use headerproof_merkle_tree::MerkleError;
use thiserror::Error;

/// Errors surfaced by the batcher, the service and the chain client.
///
/// Every failure is a value; nothing here aborts the process except an
/// `InvalidConfig` returned at start-up.
#[derive(Debug, Error)]
pub enum Error {
    // Chain access
    #[error("connection failure: {0}")]
    ConnectionFailure(String),
    #[error("hash resolution failed for block #{number}: {reason}")]
    HashResolutionFailure { number: u64, reason: String },
    #[error("protocol error: {0}")]
    Protocol(String),

    // Lookups
    #[error("header not found: {0}")]
    HeaderNotFound(String),
    #[error("leaf not found: {0}")]
    LeafNotFound(String),
    #[error("root not found: {0}")]
    RootNotFound(String),

    // Input errors
    #[error("malformed proof: {0}")]
    MalformedProof(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    // Buffer state
    #[error("batch buffer is full (capacity {capacity})")]
    BufferFull { capacity: usize },
    #[error("batch not ready: {len} of {capacity} headers buffered")]
    BatchNotReady { len: usize, capacity: usize },

    #[error("merkle error: {0}")]
    Merkle(#[from] MerkleError),
}

impl Error {
    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::ConnectionFailure(_) => "connection_failure",
            Error::HashResolutionFailure { .. } => "hash_resolution_failure",
            Error::Protocol(_) => "protocol",
            Error::HeaderNotFound(_) => "header_not_found",
            Error::LeafNotFound(_) => "leaf_not_found",
            Error::RootNotFound(_) => "root_not_found",
            Error::MalformedProof(_) => "malformed_proof",
            Error::InvalidInput(_) => "invalid_input",
            Error::InvalidConfig(_) => "invalid_config",
            Error::BufferFull { .. } => "buffer_full",
            Error::BatchNotReady { .. } => "batch_not_ready",
            Error::Merkle(_) => "merkle",
        }
    }

    /// Whether a verification request ended in this error because the proof
    /// does not check out, as opposed to bad input.
    ///
    /// Verifying against a root that no committed tree has counts as a failed
    /// verification.
    pub fn is_verification_failure(&self) -> bool {
        matches!(self, Error::RootNotFound(_))
    }
}
