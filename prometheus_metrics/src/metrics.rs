use std::sync::Arc;

use anyhow::Result;
use log::warn;
use once_cell::sync::OnceCell;
use prometheus::{histogram_opts, opts, Histogram, IntCounter, IntGauge, IntGaugeVec};

pub static METRICS: OnceCell<Arc<Metrics>> = OnceCell::new();

#[derive(Debug)]
pub struct Metrics {
    // Block tree
    block_tree_leaves: IntGauge,
    block_tree_blocks: IntGauge,
    block_tree_pruned_blocks: IntCounter,
    block_tree_finalized_number: IntGauge,
    pub block_tree_insert_times: Histogram,
    pub block_tree_prune_times: Histogram,

    // Runtime handles
    runtime_handles: IntGauge,
    runtime_handles_released: IntCounter,

    // Collection Lengths
    collection_lengths: IntGaugeVec,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        Ok(Self {
            // Block tree
            block_tree_leaves: IntGauge::new(
                "BLOCK_TREE_LEAVES",
                "Number of chain tips in the block tree",
            )?,
            block_tree_blocks: IntGauge::new(
                "BLOCK_TREE_BLOCKS",
                "Number of unfinalized blocks in the block tree, including the root",
            )?,
            block_tree_pruned_blocks: IntCounter::new(
                "BLOCK_TREE_PRUNED_BLOCKS",
                "Number of blocks removed from the block tree by finalization",
            )?,
            block_tree_finalized_number: IntGauge::new(
                "BLOCK_TREE_FINALIZED_NUMBER",
                "Number of the block at the root of the block tree",
            )?,
            block_tree_insert_times: Histogram::with_opts(histogram_opts!(
                "BLOCK_TREE_INSERT_TIMES",
                "Time spent inserting a block into the block tree",
            ))?,
            block_tree_prune_times: Histogram::with_opts(histogram_opts!(
                "BLOCK_TREE_PRUNE_TIMES",
                "Time spent pruning the block tree on finalization",
            ))?,

            // Runtime handles
            runtime_handles: IntGauge::new(
                "RUNTIME_HANDLES",
                "Number of runtime handles cached per block",
            )?,
            runtime_handles_released: IntCounter::new(
                "RUNTIME_HANDLES_RELEASED",
                "Number of runtime handles stopped after their blocks left the block tree",
            )?,

            // Collection Lengths
            collection_lengths: IntGaugeVec::new(
                opts!("COLLECTION_LENGTHS", "Number of items in each collection"),
                &["type", "name"],
            )?,
        })
    }

    pub fn register_with_default_metrics(&self) -> Result<()> {
        let default_registry = prometheus::default_registry();

        default_registry.register(Box::new(self.block_tree_leaves.clone()))?;
        default_registry.register(Box::new(self.block_tree_blocks.clone()))?;
        default_registry.register(Box::new(self.block_tree_pruned_blocks.clone()))?;
        default_registry.register(Box::new(self.block_tree_finalized_number.clone()))?;
        default_registry.register(Box::new(self.block_tree_insert_times.clone()))?;
        default_registry.register(Box::new(self.block_tree_prune_times.clone()))?;
        default_registry.register(Box::new(self.runtime_handles.clone()))?;
        default_registry.register(Box::new(self.runtime_handles_released.clone()))?;
        default_registry.register(Box::new(self.collection_lengths.clone()))?;

        Ok(())
    }

    // Block tree
    pub fn set_block_tree_leaves(&self, leaf_count: usize) {
        self.block_tree_leaves.set(saturating_i64(leaf_count))
    }

    pub fn set_block_tree_blocks(&self, block_count: usize) {
        self.block_tree_blocks.set(saturating_i64(block_count))
    }

    pub fn add_block_tree_pruned_blocks(&self, pruned_count: usize) {
        self.block_tree_pruned_blocks
            .inc_by(u64::try_from(pruned_count).unwrap_or(u64::MAX))
    }

    pub fn set_block_tree_finalized_number(&self, number: u64) {
        self.block_tree_finalized_number
            .set(i64::try_from(number).unwrap_or(i64::MAX))
    }

    // Runtime handles
    pub fn set_runtime_handles(&self, handle_count: usize) {
        self.runtime_handles.set(saturating_i64(handle_count))
    }

    pub fn add_runtime_handles_released(&self, released_count: usize) {
        self.runtime_handles_released
            .inc_by(u64::try_from(released_count).unwrap_or(u64::MAX))
    }

    // Collection Lengths
    pub fn set_collection_length(&self, typename: &str, collection_name: &str, value: usize) {
        match self
            .collection_lengths
            .get_metric_with_label_values(&[typename, collection_name])
        {
            Ok(gauge) => gauge.set(saturating_i64(value)),
            Err(error) => warn!(
                "unable to set length of {typename}::{collection_name} \
                 in collection_lengths: {error:?}",
            ),
        }
    }

    #[cfg(test)]
    fn block_tree_leaves(&self) -> i64 {
        self.block_tree_leaves.get()
    }
}

fn saturating_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauges_reflect_last_value_set() -> Result<()> {
        let metrics = Metrics::new()?;

        metrics.set_block_tree_leaves(3);
        metrics.set_block_tree_leaves(2);

        assert_eq!(metrics.block_tree_leaves(), 2);

        Ok(())
    }

    // The only test in this crate that touches the default registry.
    #[test]
    fn metrics_register_with_default_registry_only_once() -> Result<()> {
        let metrics = Metrics::new()?;

        metrics.register_with_default_metrics()?;

        assert!(metrics.register_with_default_metrics().is_err());
        assert!(Metrics::new()?.register_with_default_metrics().is_err());

        Ok(())
    }

    #[test]
    fn collection_lengths_accept_two_labels() -> Result<()> {
        let metrics = Metrics::new()?;

        metrics.set_collection_length("BlockTree", "nodes", 7);

        assert_eq!(
            metrics
                .collection_lengths
                .get_metric_with_label_values(&["BlockTree", "nodes"])?
                .get(),
            7,
        );

        Ok(())
    }
}
