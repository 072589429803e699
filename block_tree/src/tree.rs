use core::{
    cmp::Ordering,
    fmt::{Display, Formatter, Result as FmtResult},
};
use std::{sync::Arc, time::Instant};

use itertools::Itertools as _;
use log::{debug, info, warn};
use parking_lot::RwLock;
use prometheus_metrics::{start_timer, stop_and_discard, stop_and_record, Metrics, METRICS};
use types::{
    header::Header,
    primitives::{BlockNumber, H256},
};

use crate::{
    error::Error,
    handle_cache::{HandleCache, RuntimeHandle},
    leaf_index::{Leaf, LeafIndex},
    node::{Node, Nodes},
    tree_config::BlockTreeConfig,
};

/// Unfinalized blocks descending from the last finalized one.
///
/// One lock guards the topology. Inserts and prunes take it for writing, queries for reading.
/// The leaf index is only mutated while that lock is held for writing,
/// so a reader never sees leaves that disagree with the nodes.
/// Runtime handles have a lock of their own.
/// Storing or loading one does not touch the topology.
pub struct BlockTree<R: ?Sized = dyn RuntimeHandle> {
    config: BlockTreeConfig,
    nodes: RwLock<Nodes>,
    leaves: LeafIndex,
    handles: HandleCache<R>,
    metrics: Option<Arc<Metrics>>,
}

impl<R: RuntimeHandle + ?Sized> BlockTree<R> {
    /// Creates a tree with no root. Nothing can be inserted until [`Self::initialize`] is called.
    #[must_use]
    pub fn empty(config: BlockTreeConfig) -> Self {
        Self {
            config,
            nodes: RwLock::default(),
            leaves: LeafIndex::default(),
            handles: HandleCache::default(),
            metrics: METRICS.get().cloned(),
        }
    }

    #[must_use]
    pub fn from_root(block_hash: H256, header: &Header, config: BlockTreeConfig) -> Self {
        let root = root_node(block_hash, header);

        Self {
            config,
            leaves: core::iter::once(Leaf::new(&root, 0)).collect(),
            nodes: RwLock::new(Nodes::with_root(root)),
            handles: HandleCache::default(),
            metrics: METRICS.get().cloned(),
        }
    }

    /// Overrides the globally registered [`METRICS`], if any.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub const fn config(&self) -> BlockTreeConfig {
        self.config
    }

    pub fn initialize(&self, block_hash: H256, header: &Header) -> Result<(), Error> {
        let mut nodes = self.nodes.write();

        if let Some(root) = nodes.root_hash() {
            return Err(Error::AlreadyInitialized { root });
        }

        let root = root_node(block_hash, header);

        self.leaves.reset([Leaf::new(&root, 0)]);
        *nodes = Nodes::with_root(root);

        info!(
            "block tree initialized with root {block_hash:?} (number: {})",
            header.number,
        );

        Ok(())
    }

    /// Adds a block whose parent is already in the tree.
    ///
    /// `block_hash` must be the hash of `header`. It is not recomputed.
    /// On failure the tree is left unchanged.
    pub fn insert(
        &self,
        block_hash: H256,
        header: &Header,
        arrival_time: Instant,
    ) -> Result<(), Error> {
        let timer = start_timer(
            self.metrics
                .as_deref()
                .map(|metrics| &metrics.block_tree_insert_times),
        );

        let result = self.insert_locked(block_hash, header, arrival_time);

        match result {
            Ok(()) => stop_and_record(timer),
            Err(_) => stop_and_discard(timer),
        }

        result
    }

    fn insert_locked(
        &self,
        block_hash: H256,
        header: &Header,
        arrival_time: Instant,
    ) -> Result<(), Error> {
        let parent_hash = header.parent_hash;
        let mut nodes = self.nodes.write();

        let parent_number = nodes
            .get(parent_hash)
            .ok_or(Error::ParentNotFound { parent_hash })?
            .number;

        if nodes.contains(block_hash) {
            return Err(Error::BlockExists { block_hash });
        }

        if parent_number.checked_add(1) != Some(header.number) {
            return Err(Error::UnexpectedNumber {
                parent_number,
                number: header.number,
            });
        }

        let is_primary = header.is_primary_slot();

        let node = Node::new(
            block_hash,
            Some(parent_hash),
            header.number,
            arrival_time,
            is_primary,
        );

        let primary_ancestors =
            nodes.primary_ancestor_count(parent_hash) + usize::from(is_primary);
        let leaf = Leaf::new(&node, primary_ancestors);

        nodes.add_child(node);
        self.leaves.replace(parent_hash, leaf);

        let block_count = nodes.len();

        debug!(
            "inserted block {block_hash:?} \
             (number: {}, parent: {parent_hash:?}, primary: {is_primary}, blocks: {block_count})",
            header.number,
        );

        if block_count == self.config.unfinalized_blocks_warning.saturating_add(1) {
            warn!(
                "block tree holds {block_count} unfinalized blocks; \
                 finalization may have stalled (root: {:?})",
                nodes.root_hash(),
            );
        }

        if let Some(metrics) = self.metrics.as_ref() {
            metrics.set_block_tree_leaves(self.leaves.len());
            metrics.set_block_tree_blocks(block_count);
        }

        Ok(())
    }

    /// Makes `finalized` the new root and removes every block that does not descend from it.
    ///
    /// Returns the hashes of blocks on discarded forks.
    /// Ancestors of `finalized` leave the tree as well but are not included.
    /// Pruning to the current root or to an unknown block does nothing.
    pub fn prune(&self, finalized: H256) -> Vec<H256> {
        let timer = start_timer(
            self.metrics
                .as_deref()
                .map(|metrics| &metrics.block_tree_prune_times),
        );

        match self.prune_locked(finalized) {
            Some(pruned) => {
                stop_and_record(timer);
                pruned
            }
            None => {
                stop_and_discard(timer);
                vec![]
            }
        }
    }

    fn prune_locked(&self, finalized: H256) -> Option<Vec<H256>> {
        let mut nodes = self.nodes.write();

        if nodes.root_hash()? == finalized {
            return None;
        }

        if !nodes.contains(finalized) {
            warn!("block {finalized:?} is not in the block tree; assuming it was already pruned");
            return None;
        }

        let (finalized_path, pruned) = nodes.finalize(finalized);

        self.leaves.reset(leaves_of(&nodes));

        let released = self
            .handles
            .on_finalisation(&finalized_path, |block_hash| nodes.contains(block_hash));

        let number = nodes.root()?.number;

        info!(
            "block tree root moved to {finalized:?} (number: {number}, \
             finalized: {}, pruned: {}, runtime handles released: {released})",
            finalized_path.len().saturating_sub(1),
            pruned.len(),
        );

        debug!("pruned blocks: {pruned:?}");

        if let Some(metrics) = self.metrics.as_ref() {
            metrics.set_block_tree_leaves(self.leaves.len());
            metrics.set_block_tree_blocks(nodes.len());
            metrics.add_block_tree_pruned_blocks(pruned.len());
            metrics.set_block_tree_finalized_number(number);
            metrics.set_runtime_handles(self.handles.len());
            metrics.add_runtime_handles_released(released);
        }

        drop(nodes);

        self.track_collection_metrics();

        Some(pruned)
    }

    /// Hashes of all blocks one higher than `block_hash`, on every fork.
    ///
    /// Returns nothing if `block_hash` is unknown.
    #[must_use]
    pub fn blocks_at_number(&self, block_hash: H256) -> Vec<H256> {
        let nodes = self.nodes.read();

        let (Some(node), Some(root)) = (nodes.get(block_hash), nodes.root()) else {
            return vec![];
        };

        let Some(number) = node.number.checked_add(1) else {
            return vec![];
        };

        if root.number == number {
            return vec![root.hash];
        }

        nodes.hashes_at_number(root.hash, number)
    }

    /// Hashes of all blocks at `number`, on every fork.
    #[must_use]
    pub fn hashes_at_number(&self, number: BlockNumber) -> Vec<H256> {
        let nodes = self.nodes.read();

        nodes
            .root_hash()
            .map(|root| nodes.hashes_at_number(root, number))
            .unwrap_or_default()
    }

    #[must_use]
    pub fn root_hash(&self) -> Option<H256> {
        self.nodes.read().root_hash()
    }

    /// Head of the canonical chain according to the configured [`ForkChoiceRule`].
    ///
    /// [`ForkChoiceRule`]: crate::ForkChoiceRule
    #[must_use]
    pub fn best_block_hash(&self) -> Option<H256> {
        self.best_leaf(&self.nodes.read()).map(|leaf| leaf.hash)
    }

    /// Hashes from the root to the best block, root first.
    #[must_use]
    pub fn best_chain(&self) -> Vec<H256> {
        let nodes = self.nodes.read();

        let Some(best) = self.best_leaf(&nodes) else {
            return vec![];
        };

        let mut chain = nodes.ancestors(best.hash).map(|node| node.hash).collect_vec();
        chain.reverse();
        chain
    }

    /// Whether `child` descends from `parent`. Every block descends from itself.
    pub fn is_descendant_of(&self, parent: H256, child: H256) -> Result<bool, Error> {
        let nodes = self.nodes.read();

        ensure_known(&nodes, parent)?;
        ensure_known(&nodes, child)?;

        Ok(nodes.is_descendant_of(child, parent))
    }

    /// Current chain tips ordered by hash.
    #[must_use]
    pub fn leaves(&self) -> Vec<H256> {
        let _nodes = self.nodes.read();

        self.leaves.all().into_iter().map(|leaf| leaf.hash).collect()
    }

    #[must_use]
    pub fn leaf_count(&self) -> usize {
        let _nodes = self.nodes.read();

        self.leaves.len()
    }

    pub fn highest_common_ancestor(&self, a: H256, b: H256) -> Result<H256, Error> {
        let nodes = self.nodes.read();

        let mut a_node = ensure_known(&nodes, a)?;
        let mut b_node = ensure_known(&nodes, b)?;

        let parent_of = |node: &Node| node.parent.and_then(|parent| nodes.get(parent));

        while a_node.hash != b_node.hash {
            let (next_a, next_b) = match a_node.number.cmp(&b_node.number) {
                Ordering::Greater => (parent_of(a_node), Some(b_node)),
                Ordering::Less => (Some(a_node), parent_of(b_node)),
                Ordering::Equal => (parent_of(a_node), parent_of(b_node)),
            };

            let (Some(next_a), Some(next_b)) = (next_a, next_b) else {
                return Err(Error::NoCommonAncestor { a, b });
            };

            a_node = next_a;
            b_node = next_b;
        }

        Ok(a_node.hash)
    }

    /// Hashes of all blocks in the tree in depth-first order, starting with the root.
    #[must_use]
    pub fn all_blocks(&self) -> Vec<H256> {
        let nodes = self.nodes.read();
        let mut hashes = vec![];

        if let Some(root) = nodes.root_hash() {
            nodes.all_descendants(root, &mut hashes);
        }

        hashes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Hash of the block at `number` on the best chain.
    pub fn hash_at_number(&self, number: BlockNumber) -> Result<H256, Error> {
        let nodes = self.nodes.read();

        let root_number = nodes.root().ok_or(Error::EmptyTree)?.number;
        let best = self.best_leaf(&nodes).ok_or(Error::EmptyTree)?;

        if number > best.number {
            return Err(Error::NumberTooHigh {
                number,
                best_number: best.number,
            });
        }

        if number < root_number {
            return Err(Error::NumberTooLow {
                number,
                root_number,
            });
        }

        let hash = nodes
            .ancestors(best.hash)
            .find(|node| node.number == number)
            .map(|node| node.hash)
            .expect("every number between the root and the best leaf is on the best chain");

        Ok(hash)
    }

    /// Hashes from `start` to `end`, both included.
    pub fn sub_chain(&self, start: H256, end: H256) -> Result<Vec<H256>, Error> {
        let nodes = self.nodes.read();

        let start_number = ensure_known(&nodes, start)?.number;
        ensure_known(&nodes, end)?;

        let mut chain = nodes
            .ancestors(end)
            .take_while(|node| node.number >= start_number)
            .map(|node| node.hash)
            .collect_vec();

        if chain.last() != Some(&start) {
            return Err(Error::NotDescendant {
                ancestor: start,
                descendant: end,
            });
        }

        chain.reverse();

        Ok(chain)
    }

    pub fn arrival_time(&self, block_hash: H256) -> Result<Instant, Error> {
        Ok(ensure_known(&self.nodes.read(), block_hash)?.arrival_time)
    }

    pub fn number(&self, block_hash: H256) -> Result<BlockNumber, Error> {
        Ok(ensure_known(&self.nodes.read(), block_hash)?.number)
    }

    pub fn is_primary(&self, block_hash: H256) -> Result<bool, Error> {
        Ok(ensure_known(&self.nodes.read(), block_hash)?.is_primary)
    }

    /// Number of blocks authored in primary slots from the root (exclusive) to `block_hash`.
    pub fn primary_ancestor_count(&self, block_hash: H256) -> Result<usize, Error> {
        let nodes = self.nodes.read();

        ensure_known(&nodes, block_hash)?;

        Ok(nodes.primary_ancestor_count(block_hash))
    }

    /// Copies the topology into a tree that shares nothing with this one.
    ///
    /// The copy starts with no runtime handles and no metrics.
    #[must_use]
    pub fn deep_copy(&self) -> Self {
        let nodes = self.nodes.read();

        let copy = nodes
            .root_hash()
            .map(|root| nodes.deep_copy(root))
            .unwrap_or_default();

        let leaves = self
            .leaves
            .all()
            .into_iter()
            .filter_map(|leaf| {
                let node = copy.get(leaf.hash)?;
                Some(Leaf::new(node, leaf.primary_ancestors))
            })
            .collect();

        Self {
            config: self.config,
            nodes: RwLock::new(copy),
            leaves,
            handles: HandleCache::default(),
            metrics: None,
        }
    }

    pub fn store_handle(&self, block_hash: H256, handle: Arc<R>) {
        self.handles.set(block_hash, handle);

        if let Some(metrics) = self.metrics.as_ref() {
            metrics.set_runtime_handles(self.handles.len());
        }
    }

    pub fn get_handle(&self, block_hash: H256) -> Result<Arc<R>, Error> {
        self.handles
            .get(block_hash)
            .ok_or(Error::HandleNotFound { block_hash })
    }

    /// Removes all runtime handles without stopping them and returns them to the caller.
    pub fn clear_all_handles(&self) -> Vec<(H256, Arc<R>)> {
        let handles = self.handles.clear();

        if let Some(metrics) = self.metrics.as_ref() {
            metrics.set_runtime_handles(0);
        }

        handles
    }

    pub fn track_collection_metrics(&self) {
        if let Some(metrics) = self.metrics.as_ref() {
            let type_name = tynm::type_name::<Self>();

            metrics.set_collection_length(&type_name, "nodes", self.len());
            metrics.set_collection_length(&type_name, "leaves", self.leaves.len());
            metrics.set_collection_length(&type_name, "handles", self.handles.len());
        }
    }

    fn best_leaf(&self, nodes: &Nodes) -> Option<Leaf> {
        let root = nodes.root()?;

        if root.is_leaf() {
            return Some(Leaf::new(root, 0));
        }

        self.leaves.best_leaf(self.config.fork_choice_rule)
    }
}

impl<R: ?Sized> Display for BlockTree<R> {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        let nodes = self.nodes.read();

        writeln!(formatter, "Leaves:")?;

        for leaf in self.leaves.all() {
            writeln!(formatter, "  {:?}", leaf.hash)?;
        }

        writeln!(formatter, "Tree:")?;

        match nodes.root_hash() {
            Some(root) => nodes.fmt_subtree(formatter, root, 1),
            None => writeln!(formatter, "  (empty)"),
        }
    }
}

fn root_node(block_hash: H256, header: &Header) -> Node {
    Node::new(block_hash, None, header.number, Instant::now(), false)
}

fn ensure_known(nodes: &Nodes, block_hash: H256) -> Result<&Node, Error> {
    nodes
        .get(block_hash)
        .ok_or(Error::NodeNotFound { block_hash })
}

fn leaves_of(nodes: &Nodes) -> Vec<Leaf> {
    let mut leaves = vec![];

    if let Some(root) = nodes.root_hash() {
        nodes.leaves(root, &mut leaves);
    }

    leaves
        .into_iter()
        .map(|node| Leaf::new(node, nodes.primary_ancestor_count(node.hash)))
        .collect()
}
