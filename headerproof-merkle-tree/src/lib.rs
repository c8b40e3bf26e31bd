//! Deterministic binary Merkle trees over block-header leaves.
//!
//! A tree is built level by level from an ordered sequence of 32-byte
//! leaves. Adjacent nodes are paired left to right and an odd trailing node
//! is paired with itself:
//!
//! `parent = H(left || right)`
//!
//! Only the root and the leaves are kept; internal levels are recomputed on
//! demand when a proof is generated. A leaf is derived from a canonical block
//! hash as `H(H(block_hash))`.

#![warn(missing_docs)]

mod error;
pub(crate) mod hash;
pub(crate) mod proof;
pub(crate) mod tree;
mod verify;


pub use error::MerkleError;
pub use hash::{HASH_LENGTH, Hash, HashAlgorithm, hash_from_slice};
pub use proof::{InclusionProof, MAX_PROOF_STEPS, ProofStep, Side};
pub use tree::{MerkleTree, compute_root, next_level, proof_depth};
pub use verify::compute_root_from_path;
