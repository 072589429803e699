use std::{
    collections::{HashMap, HashSet},
    time::Instant,
};

use itertools::Itertools as _;
use parking_lot::RwLock;
use types::primitives::{BlockNumber, H256};

use crate::{fork_choice_rule::ForkChoiceRule, node::Node};

/// Snapshot of a chain tip with everything fork choice needs to rank it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Leaf {
    pub hash: H256,
    pub number: BlockNumber,
    pub arrival_time: Instant,
    pub primary_ancestors: usize,
}

impl Leaf {
    #[must_use]
    pub const fn new(node: &Node, primary_ancestors: usize) -> Self {
        Self {
            hash: node.hash,
            number: node.number,
            arrival_time: node.arrival_time,
            primary_ancestors,
        }
    }
}

/// Current chain tips.
///
/// Guarded by its own lock so that fork choice does not have to walk the tree.
/// Only [`BlockTree`] mutates it, and only while holding the tree lock for writing.
///
/// [`BlockTree`]: crate::BlockTree
#[derive(Default, Debug)]
pub struct LeafIndex {
    leaves: RwLock<HashMap<H256, Leaf>>,
}

impl FromIterator<Leaf> for LeafIndex {
    fn from_iter<I: IntoIterator<Item = Leaf>>(leaves: I) -> Self {
        Self {
            leaves: RwLock::new(leaves.into_iter().map(|leaf| (leaf.hash, leaf)).collect()),
        }
    }
}

impl LeafIndex {
    pub fn store(&self, leaf: Leaf) {
        self.leaves.write().insert(leaf.hash, leaf);
    }

    #[must_use]
    pub fn load(&self, hash: H256) -> Option<Leaf> {
        self.leaves.read().get(&hash).copied()
    }

    /// Removes the entry for `old` (if there is one) and stores `new`.
    ///
    /// `old` is the parent of `new`. It is not checked for other children.
    /// Siblings of `new` stay in the index either way.
    pub fn replace(&self, old: H256, new: Leaf) {
        let mut leaves = self.leaves.write();
        leaves.remove(&old);
        leaves.insert(new.hash, new);
    }

    /// Replaces the whole index.
    pub fn reset(&self, leaves: impl IntoIterator<Item = Leaf>) {
        *self.leaves.write() = leaves.into_iter().map(|leaf| (leaf.hash, leaf)).collect();
    }

    #[must_use]
    pub fn best_leaf(&self, rule: ForkChoiceRule) -> Option<Leaf> {
        rule.best(self.leaves.read().values()).copied()
    }

    #[must_use]
    pub fn to_set(&self) -> HashSet<H256> {
        self.leaves.read().keys().copied().collect()
    }

    /// Leaves ordered by hash.
    #[must_use]
    pub fn all(&self) -> Vec<Leaf> {
        self.leaves
            .read()
            .values()
            .copied()
            .sorted_by_key(|leaf| leaf.hash)
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.leaves.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leaves.read().is_empty()
    }
}
