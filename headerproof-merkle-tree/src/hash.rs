use std::{fmt, str::FromStr};

use bincode::{Decode, Encode};
use sha2::{Digest, Sha256};

use crate::MerkleError;

/// Length in bytes of every hash handled by the tree.
pub const HASH_LENGTH: usize = 32;

/// A 32-byte hash value: a leaf, an internal node or a root.
pub type Hash = [u8; HASH_LENGTH];

/// The one-way hash function used for leaf derivation and node merging.
///
/// Chosen once at start-up. A tree and every proof against it must use the
/// same algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Encode, Decode)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum HashAlgorithm {
    /// SHA-256.
    #[default]
    Sha256,
    /// BLAKE3 with 32-byte output.
    Blake3,
}

impl HashAlgorithm {
    /// Hash arbitrary bytes.
    pub fn hash(&self, data: &[u8]) -> Hash {
        match self {
            HashAlgorithm::Sha256 => {
                let mut out = [0u8; HASH_LENGTH];
                out.copy_from_slice(&Sha256::digest(data));
                out
            }
            HashAlgorithm::Blake3 => *blake3::hash(data).as_bytes(),
        }
    }

    /// Parent of two nodes: `H(left || right)`, no separator.
    pub fn hash_pair(&self, left: &Hash, right: &Hash) -> Hash {
        match self {
            HashAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                hasher.update(left);
                hasher.update(right);
                let mut out = [0u8; HASH_LENGTH];
                out.copy_from_slice(&hasher.finalize());
                out
            }
            HashAlgorithm::Blake3 => {
                let mut hasher = blake3::Hasher::new();
                hasher.update(left);
                hasher.update(right);
                *hasher.finalize().as_bytes()
            }
        }
    }

    /// Leaf for a canonical block hash: `H(H(block_hash))`.
    pub fn leaf_hash(&self, block_hash: &[u8]) -> Hash {
        self.hash(&self.hash(block_hash))
    }

    /// Lowercase name as used in configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Blake3 => "blake3",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = MerkleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(HashAlgorithm::Sha256),
            "blake3" => Ok(HashAlgorithm::Blake3),
            other => Err(MerkleError::InvalidData(format!(
                "unknown hash algorithm: {}",
                other
            ))),
        }
    }
}

/// Convert a byte slice into a [`Hash`], rejecting any other length.
pub fn hash_from_slice(bytes: &[u8]) -> Result<Hash, MerkleError> {
    bytes.try_into().map_err(|_| {
        MerkleError::InvalidData(format!(
            "expected {} hash bytes, got {}",
            HASH_LENGTH,
            bytes.len()
        ))
    })
}
