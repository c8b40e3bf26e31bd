//! Inclusion proof generation for the Merkle tree.
//!
//! An `InclusionProof` is the ordered list of sibling hashes from a leaf up
//! to the root. Concatenation is order-sensitive, so every step also records
//! which side the sibling sits on.

use bincode::{Decode, Encode};

use crate::{Hash, MerkleError, MerkleTree};


/// Upper bound on proof steps accepted by the decoder. A tree with more than
/// `2^64` leaves cannot exist.
pub const MAX_PROOF_STEPS: usize = 64;

/// Position of a sibling relative to the node being proven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum Side {
    /// The sibling is the left operand: `H(sibling || current)`.
    Left,
    /// The sibling is the right operand: `H(current || sibling)`.
    Right,
}

impl Side {
    /// Lowercase tag used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }

    /// Parse a wire tag. Only `left` and `right` are accepted.
    pub fn parse(tag: &str) -> Result<Self, MerkleError> {
        match tag {
            "left" | "Left" | "LEFT" => Ok(Side::Left),
            "right" | "Right" | "RIGHT" => Ok(Side::Right),
            other => Err(MerkleError::InvalidProof(format!(
                "unknown sibling side: {:?}",
                other
            ))),
        }
    }

    /// The other side.
    pub fn flipped(&self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// One level of an inclusion proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct ProofStep {
    /// Hash of the sibling node at this level.
    pub sibling: Hash,
    /// Which side the sibling sits on.
    pub side: Side,
}

/// An inclusion proof for one leaf, in leaf-to-root order.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct InclusionProof {
    /// Root of the tree the proof was generated from.
    pub root: Hash,
    /// Sibling steps, leaf-ward first.
    pub steps: Vec<ProofStep>,
}

impl MerkleTree {
    /// Generate a proof for the first occurrence of `leaf`.
    ///
    /// Returns `None` if the leaf is not in this tree.
    pub fn generate_proof(&self, leaf: &Hash) -> Option<InclusionProof> {
        let index = self.position_of(leaf)?;
        self.generate_proof_at(index).ok()
    }

    /// Generate a proof for the leaf at `index`.
    pub fn generate_proof_at(&self, index: usize) -> Result<InclusionProof, MerkleError> {
        if index >= self.leaf_count() {
            return Err(MerkleError::LeafIndexOutOfRange {
                index,
                leaf_count: self.leaf_count(),
            });
        }

        let levels = self.levels();
        let mut steps = Vec::with_capacity(self.depth());
        let mut position = index;

        // The last level is the root itself and has no sibling.
        for level in &levels[..levels.len() - 1] {
            let (sibling_position, side) = if position % 2 == 0 {
                (position + 1, Side::Right)
            } else {
                (position - 1, Side::Left)
            };
            // Odd trailing node: paired with itself.
            let sibling = level
                .get(sibling_position)
                .copied()
                .unwrap_or(level[position]);
            steps.push(ProofStep { sibling, side });
            position /= 2;
        }

        Ok(InclusionProof {
            root: *self.root(),
            steps,
        })
    }
}

impl InclusionProof {
    /// Number of sibling steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the proof has no steps (single-leaf tree).
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Encode to bytes using bincode.
    pub fn encode_to_vec(&self) -> Result<Vec<u8>, MerkleError> {
        let config = bincode::config::standard()
            .with_big_endian()
            .with_no_limit();
        bincode::encode_to_vec(self, config)
            .map_err(|e| MerkleError::InvalidProof(format!("encode error: {}", e)))
    }

    /// Decode from bytes using bincode.
    ///
    /// Rejects proofs with more than [`MAX_PROOF_STEPS`] steps and trailing
    /// bytes.
    pub fn decode_from_slice(bytes: &[u8]) -> Result<Self, MerkleError> {
        let config = bincode::config::standard()
            .with_big_endian()
            .with_limit::<{ 64 * 1024 }>();
        let (proof, read): (Self, usize) = bincode::decode_from_slice(bytes, config)
            .map_err(|e| MerkleError::InvalidProof(format!("decode error: {}", e)))?;
        if read != bytes.len() {
            return Err(MerkleError::InvalidProof(format!(
                "{} trailing bytes after proof",
                bytes.len() - read
            )));
        }
        if proof.steps.len() > MAX_PROOF_STEPS {
            return Err(MerkleError::InvalidProof(format!(
                "proof has {} steps, maximum is {}",
                proof.steps.len(),
                MAX_PROOF_STEPS
            )));
        }
        Ok(proof)
    }
}
