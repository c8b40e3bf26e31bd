use crate::{Hash, HashAlgorithm, MerkleError};

/// An immutable binary Merkle tree over an ordered sequence of leaves.
///
/// Leaves are never sorted or deduplicated. Internal levels are not stored;
/// [`levels`](Self::levels) recomputes them from the leaves, which is cheap
/// for batch-sized trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    algorithm: HashAlgorithm,
    root: Hash,
    leaves: Vec<Hash>,
}

impl MerkleTree {
    /// Build a tree from leaves in the given order.
    ///
    /// Returns `(tree, hash_calls)`. Fails on an empty leaf sequence.
    pub fn build(algorithm: HashAlgorithm, leaves: Vec<Hash>) -> Result<(Self, u32), MerkleError> {
        let (root, hash_calls) = compute_root(algorithm, &leaves)?;
        Ok((
            Self {
                algorithm,
                root,
                leaves,
            },
            hash_calls,
        ))
    }

    /// The root hash.
    pub fn root(&self) -> &Hash {
        &self.root
    }

    /// The leaves in insertion order.
    pub fn leaves(&self) -> &[Hash] {
        &self.leaves
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// The hash algorithm the tree was built with.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Number of sibling steps in an inclusion proof for this tree.
    pub fn depth(&self) -> usize {
        proof_depth(self.leaves.len())
    }

    /// Index of the first occurrence of `leaf`.
    pub fn position_of(&self, leaf: &Hash) -> Option<usize> {
        self.leaves.iter().position(|l| l == leaf)
    }

    /// Whether `leaf` is one of the tree's leaves.
    pub fn contains_leaf(&self, leaf: &Hash) -> bool {
        self.position_of(leaf).is_some()
    }

    /// All levels from the leaves (index 0) up to the single-node root level.
    pub(crate) fn levels(&self) -> Vec<Vec<Hash>> {
        let mut levels = Vec::with_capacity(self.depth() + 1);
        levels.push(self.leaves.clone());
        while let Some(current) = levels.last() {
            if current.len() <= 1 {
                break;
            }
            let (parents, _) = next_level(self.algorithm, current);
            levels.push(parents);
        }
        levels
    }
}

/// Compute the parent level of `level`.
///
/// Pairs `(0, 1), (2, 3), ...`; an odd trailing node is paired with itself.
/// Returns `(parents, hash_calls)`.
pub fn next_level(algorithm: HashAlgorithm, level: &[Hash]) -> (Vec<Hash>, u32) {
    let mut parents = Vec::with_capacity(level.len().div_ceil(2));
    for pair in level.chunks(2) {
        let left = &pair[0];
        let right = pair.get(1).unwrap_or(left);
        parents.push(algorithm.hash_pair(left, right));
    }
    let hash_calls = parents.len() as u32;
    (parents, hash_calls)
}

/// Compute the root of a tree built from `leaves` without keeping the tree.
///
/// Returns `(root, hash_calls)`. A single leaf is its own root.
pub fn compute_root(algorithm: HashAlgorithm, leaves: &[Hash]) -> Result<(Hash, u32), MerkleError> {
    if leaves.is_empty() {
        return Err(MerkleError::EmptyLeaves);
    }
    let mut level = leaves.to_vec();
    let mut hash_calls = 0u32;
    while level.len() > 1 {
        let (parents, calls) = next_level(algorithm, &level);
        hash_calls += calls;
        level = parents;
    }
    Ok((level[0], hash_calls))
}

/// Number of levels above the leaves for `leaf_count` leaves, i.e.
/// `ceil(log2(leaf_count))`. Zero for zero or one leaf.
pub fn proof_depth(leaf_count: usize) -> usize {
    let mut width = leaf_count;
    let mut depth = 0;
    while width > 1 {
        width = width.div_ceil(2);
        depth += 1;
    }
    depth
}
