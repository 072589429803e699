//! Unfinalized blocks and the arena that owns them.
//!
//! Nodes refer to each other by hash. A parent lists its children in insertion order.
//! A child only remembers the hash of its parent. [`Nodes`] owns every node,
//! so removing a subtree is a batch of map removals rather than anything involving pointers.
//!
//! Nothing here locks. [`BlockTree`] serializes all mutation.
//!
//! Block numbers increase by exactly one from parent to child.
//! Several traversals rely on this to stop early.
//!
//! [`BlockTree`]: crate::BlockTree

use core::fmt::{Formatter, Result as FmtResult};
use std::time::Instant;

use im::HashMap;
use itertools::Itertools as _;
use types::primitives::{BlockNumber, H256};

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Node {
    pub hash: H256,
    pub parent: Option<H256>,
    pub children: Vec<H256>,
    pub number: BlockNumber,
    pub arrival_time: Instant,
    pub is_primary: bool,
}

impl Node {
    #[must_use]
    pub const fn new(
        hash: H256,
        parent: Option<H256>,
        number: BlockNumber,
        arrival_time: Instant,
        is_primary: bool,
    ) -> Self {
        Self {
            hash,
            parent,
            children: Vec::new(),
            number,
            arrival_time,
            is_primary,
        }
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn add_child(&mut self, child: H256) {
        self.children.push(child);
    }

    pub fn delete_child(&mut self, target: H256) {
        self.children.retain(|child| *child != target);
    }
}

// `im::HashMap` makes cloning the whole arena cheap,
// but `Nodes::deep_copy` still builds a fresh map so that copies share nothing.
#[derive(Clone, Default, Debug)]
pub struct Nodes {
    root: Option<H256>,
    nodes: HashMap<H256, Node>,
}

impl Nodes {
    #[must_use]
    pub fn with_root(root: Node) -> Self {
        let hash = root.hash;

        Self {
            root: Some(hash),
            nodes: HashMap::unit(hash, Node { parent: None, ..root }),
        }
    }

    #[must_use]
    pub const fn root_hash(&self) -> Option<H256> {
        self.root
    }

    #[must_use]
    pub fn root(&self) -> Option<&Node> {
        self.root.and_then(|hash| self.get(hash))
    }

    #[must_use]
    pub fn get(&self, hash: H256) -> Option<&Node> {
        self.nodes.get(&hash)
    }

    #[must_use]
    pub fn contains(&self, hash: H256) -> bool {
        self.nodes.contains_key(&hash)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Attaches `child` to its parent.
    ///
    /// The caller must have checked that the parent exists, that `child` is not already present,
    /// and that `child.number` is one more than the parent's.
    pub fn add_child(&mut self, child: Node) {
        let parent_hash = child
            .parent
            .expect("only the root has no parent and it is never added as a child");

        self.nodes
            .get_mut(&parent_hash)
            .expect("caller checks that the parent exists")
            .add_child(child.hash);

        self.nodes.insert(child.hash, child);
    }

    pub fn delete_child(&mut self, parent: H256, target: H256) {
        if let Some(parent) = self.nodes.get_mut(&parent) {
            parent.delete_child(target);
        }
    }

    /// Iterates over `hash` and its ancestors, ending with the root.
    pub fn ancestors(&self, hash: H256) -> impl Iterator<Item = &Node> {
        core::iter::successors(self.get(hash), |node| {
            node.parent.and_then(|parent| self.get(parent))
        })
    }

    /// Looks for `hash` among `from` and its descendants.
    #[must_use]
    pub fn find(&self, from: H256, hash: H256) -> Option<&Node> {
        self.get(hash).filter(|_| self.is_descendant_of(hash, from))
    }

    /// Whether `hash` can be reached from `ancestor` by following children.
    /// Every node is a descendant of itself.
    #[must_use]
    pub fn is_descendant_of(&self, hash: H256, ancestor: H256) -> bool {
        let Some(ancestor) = self.get(ancestor) else {
            return false;
        };

        self.ancestors(hash)
            .take_while(|node| node.number >= ancestor.number)
            .any(|node| node.hash == ancestor.hash)
    }

    /// Appends to `accumulator` the hashes of descendants of `from` (including `from` itself)
    /// whose number is exactly `number`.
    pub fn descendants_at_number(
        &self,
        from: H256,
        number: BlockNumber,
        accumulator: &mut Vec<H256>,
    ) {
        let Some(node) = self.get(from) else {
            return;
        };

        if node.number == number {
            accumulator.push(node.hash);
            return;
        }

        // Numbers only grow further down.
        if node.number > number {
            return;
        }

        for child in &node.children {
            self.descendants_at_number(*child, number, accumulator);
        }
    }

    #[must_use]
    pub fn hashes_at_number(&self, from: H256, number: BlockNumber) -> Vec<H256> {
        let mut hashes = vec![];
        self.descendants_at_number(from, number, &mut hashes);
        hashes
    }

    /// Appends to `accumulator` every descendant of `from` (including `from` itself)
    /// that has no children.
    pub fn leaves<'nodes>(&'nodes self, from: H256, accumulator: &mut Vec<&'nodes Node>) {
        let Some(node) = self.get(from) else {
            return;
        };

        if node.is_leaf() {
            accumulator.push(node);
        }

        for child in &node.children {
            self.leaves(*child, accumulator);
        }
    }

    /// Appends `from` and all of its descendants to `accumulator` in depth-first order.
    pub fn all_descendants(&self, from: H256, accumulator: &mut Vec<H256>) {
        let Some(node) = self.get(from) else {
            return;
        };

        accumulator.push(node.hash);

        for child in &node.children {
            self.all_descendants(*child, accumulator);
        }
    }

    /// Number of blocks authored in primary slots between `hash` and the root.
    /// The root is shared by every chain and is not counted.
    #[must_use]
    pub fn primary_ancestor_count(&self, hash: H256) -> usize {
        self.ancestors(hash)
            .filter(|node| node.parent.is_some() && node.is_primary)
            .count()
    }

    /// Builds an arena containing only `from` and its descendants, with `from` as the root.
    ///
    /// The result does not share any nodes with `self`.
    #[must_use]
    pub fn deep_copy(&self, from: H256) -> Self {
        let mut copy = Self::default();

        if let Some(node) = self.get(from) {
            copy.root = Some(from);
            self.copy_subtree(node, None, &mut copy.nodes);
        }

        copy
    }

    fn copy_subtree(
        &self,
        node: &Node,
        new_parent: Option<H256>,
        nodes: &mut HashMap<H256, Node>,
    ) {
        let copied = Node {
            hash: node.hash,
            parent: new_parent,
            children: node.children.clone(),
            number: node.number,
            arrival_time: node.arrival_time,
            is_primary: node.is_primary,
        };

        nodes.insert(copied.hash, copied);

        for child in node.children.iter().filter_map(|child| self.get(*child)) {
            self.copy_subtree(child, Some(node.hash), nodes);
        }
    }

    /// Removes every node in the subtree of `from` that is neither an ancestor
    /// nor a descendant of `finalized`.
    ///
    /// Subtrees that descend from `finalized` are kept without being visited.
    /// Ancestors of `finalized` are kept and searched for forks.
    /// Everything else is detached from its parent and removed along with all its descendants.
    /// The hashes of all removed nodes are appended to `accumulator`.
    pub fn prune(&mut self, from: H256, finalized: H256, accumulator: &mut Vec<H256>) {
        let Some(node) = self.get(from) else {
            return;
        };

        if self.is_descendant_of(from, finalized) {
            return;
        }

        if self.is_descendant_of(finalized, from) {
            for child in node.children.clone() {
                self.prune(child, finalized, accumulator);
            }

            return;
        }

        let parent = node.parent;

        if let Some(parent) = parent {
            self.delete_child(parent, from);
        }

        let first_removed = accumulator.len();

        self.all_descendants(from, accumulator);

        for hash in &accumulator[first_removed..] {
            self.nodes.remove(hash);
        }
    }

    /// Makes `finalized` the new root.
    ///
    /// Returns the path from the old root to `finalized` (both included, oldest first)
    /// and the hashes of all nodes on forks that do not contain `finalized`.
    /// Ancestors of `finalized` are removed from the arena but not reported as pruned.
    ///
    /// Does nothing if `finalized` is not in the arena.
    pub fn finalize(&mut self, finalized: H256) -> (Vec<H256>, Vec<H256>) {
        let Some(root) = self.root.filter(|_| self.contains(finalized)) else {
            return (vec![], vec![]);
        };

        let mut finalized_path = self
            .ancestors(finalized)
            .map(|node| node.hash)
            .collect_vec();

        finalized_path.reverse();

        let mut pruned = vec![];
        self.prune(root, finalized, &mut pruned);

        for ancestor in &finalized_path[..finalized_path.len() - 1] {
            self.nodes.remove(ancestor);
        }

        if let Some(node) = self.nodes.get_mut(&finalized) {
            node.parent = None;
        }

        self.root = Some(finalized);

        (finalized_path, pruned)
    }

    pub fn fmt_subtree(
        &self,
        formatter: &mut Formatter,
        hash: H256,
        depth: usize,
    ) -> FmtResult {
        let Some(node) = self.get(hash) else {
            return Ok(());
        };

        writeln!(
            formatter,
            "{:indent$}{:?} (number: {}, primary: {})",
            "",
            node.hash,
            node.number,
            node.is_primary,
            indent = depth * 2,
        )?;

        for child in &node.children {
            self.fmt_subtree(formatter, *child, depth + 1)?;
        }

        Ok(())
    }
}
