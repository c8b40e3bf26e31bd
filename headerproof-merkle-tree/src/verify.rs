//! Proof verification.
//!
//! Pure functions, no tree required: the root is recomputed by folding the
//! sibling steps over the leaf and compared to the expected root.

use crate::{Hash, HashAlgorithm, InclusionProof, ProofStep, Side};

/// Fold `steps` over `leaf` and return the resulting root.
pub fn compute_root_from_path(algorithm: HashAlgorithm, leaf: &Hash, steps: &[ProofStep]) -> Hash {
    steps.iter().fold(*leaf, |current, step| match step.side {
        Side::Left => algorithm.hash_pair(&step.sibling, &current),
        Side::Right => algorithm.hash_pair(&current, &step.sibling),
    })
}

impl InclusionProof {
    /// Root obtained by folding this proof's steps over `leaf`.
    pub fn compute_root(&self, algorithm: HashAlgorithm, leaf: &Hash) -> Hash {
        compute_root_from_path(algorithm, leaf, &self.steps)
    }

    /// Whether folding the steps over `leaf` yields `expected_root`.
    ///
    /// The `root` field carried inside the proof is not trusted here.
    pub fn verify(&self, algorithm: HashAlgorithm, expected_root: &Hash, leaf: &Hash) -> bool {
        &self.compute_root(algorithm, leaf) == expected_root
    }
}
