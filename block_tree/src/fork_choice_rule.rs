use core::cmp::Ordering;

use serde::Deserialize;

use crate::leaf_index::Leaf;

/// Rule used to pick the best chain tip among the leaves of the block tree.
///
/// Both rules end with the same tie-breaks:
/// the earlier arrival wins, and if arrival times are equal the smaller hash wins.
/// The last one only exists to make the choice deterministic.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForkChoiceRule {
    /// Highest block number first.
    #[default]
    DeepestLeaf,
    /// Most blocks authored in primary slots first, then highest block number.
    /// The root is shared by every chain and is never counted.
    PrimaryAncestors,
}

impl ForkChoiceRule {
    /// Returns [`Ordering::Greater`] if `a` is a better chain tip than `b`.
    #[must_use]
    pub fn compare(self, a: &Leaf, b: &Leaf) -> Ordering {
        let primary = match self {
            Self::DeepestLeaf => Ordering::Equal,
            Self::PrimaryAncestors => a.primary_ancestors.cmp(&b.primary_ancestors),
        };

        primary
            .then_with(|| a.number.cmp(&b.number))
            .then_with(|| b.arrival_time.cmp(&a.arrival_time))
            .then_with(|| b.hash.cmp(&a.hash))
    }

    pub fn best<'leaf>(self, leaves: impl IntoIterator<Item = &'leaf Leaf>) -> Option<&'leaf Leaf> {
        leaves.into_iter().max_by(|a, b| self.compare(a, b))
    }
}
