//! Append-only store of committed trees.

use headerproof_merkle_tree::{Hash, MerkleTree};

/// Committed trees in batch order.
///
/// Roots are not deduplicated. Lookups return the first match in insertion
/// order.
#[derive(Debug, Clone, Default)]
pub struct TreeStore {
    trees: Vec<MerkleTree>,
}

impl TreeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a tree and return its index.
    pub fn append(&mut self, tree: MerkleTree) -> usize {
        self.trees.push(tree);
        self.trees.len() - 1
    }

    /// First tree whose root is `root`.
    pub fn find_by_root(&self, root: &Hash) -> Option<&MerkleTree> {
        self.trees.iter().find(|t| t.root() == root)
    }

    /// First tree that has `leaf` among its leaves.
    pub fn find_by_leaf(&self, leaf: &Hash) -> Option<&MerkleTree> {
        self.trees.iter().find(|t| t.contains_leaf(leaf))
    }

    pub fn get(&self, index: usize) -> Option<&MerkleTree> {
        self.trees.get(index)
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// Roots in commit order.
    pub fn roots(&self) -> impl Iterator<Item = &Hash> {
        self.trees.iter().map(MerkleTree::root)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MerkleTree> {
        self.trees.iter()
    }
}
