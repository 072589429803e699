//! In-memory tree of unfinalized blocks with fork choice.
//!
//! The tree is rooted at the last finalized block. Every other block in it descends from the root
//! and has not been finalized yet. Blocks enter through [`BlockTree::insert`] and leave through
//! [`BlockTree::prune`], which is called when a block is finalized.
//!
//! Nodes live in an arena keyed by block hash. A node stores the hashes of its children and the
//! hash of its parent. Removing a fork is a batch of map removals.
//!
//! Two indexes are kept next to the tree:
//! - [`LeafIndex`] holds the current chain tips so that fork choice does not walk the whole tree.
//! - [`HandleCache`] maps block hashes to runtime instances that are valid at those blocks.
//!   Finalization moves the handle of the old root onto the new root unless the new root already
//!   has one, and stops handles of blocks that left the tree.
//!
//! Fork choice is deterministic. See [`ForkChoiceRule`] for the available rules.
//! The default picks the highest leaf, preferring earlier arrival and then the smaller hash.
//!
//! Nothing here blocks on I/O. The tree is expected to hold the blocks produced since the last
//! finalization, which is tens of blocks rather than millions, so linear traversals are fine.
//!
//! Unknown blocks passed to [`BlockTree::prune`] are treated as already pruned.
//! Repeated finalization notifications are harmless.

pub use crate::{
    error::Error,
    fork_choice_rule::ForkChoiceRule,
    handle_cache::{HandleCache, RuntimeHandle},
    leaf_index::{Leaf, LeafIndex},
    tree::BlockTree,
    tree_config::BlockTreeConfig,
};

mod error;
mod fork_choice_rule;
mod handle_cache;
mod leaf_index;
mod node;
mod tree;
mod tree_config;
