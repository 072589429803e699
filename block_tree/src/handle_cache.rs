use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;
use types::primitives::H256;

/// A runtime instance that is valid at some block.
pub trait RuntimeHandle: Send + Sync {
    /// Releases whatever the runtime holds.
    /// Called at most once per handle by [`HandleCache::on_finalisation`].
    fn stop(&self);
}

/// Runtime handles keyed by the hash of the block they are valid at.
///
/// The same handle may be cached under several hashes.
/// A handle is only stopped once none of them survive finalization.
pub struct HandleCache<R: ?Sized> {
    handles: RwLock<HashMap<H256, Arc<R>>>,
}

impl<R: ?Sized> Default for HandleCache<R> {
    fn default() -> Self {
        Self {
            handles: RwLock::default(),
        }
    }
}

impl<R: RuntimeHandle + ?Sized> HandleCache<R> {
    #[must_use]
    pub fn get(&self, block_hash: H256) -> Option<Arc<R>> {
        self.handles.read().get(&block_hash).cloned()
    }

    pub fn set(&self, block_hash: H256, handle: Arc<R>) {
        self.handles.write().insert(block_hash, handle);
    }

    /// Removes the entry without stopping the handle.
    pub fn delete(&self, block_hash: H256) -> Option<Arc<R>> {
        self.handles.write().remove(&block_hash)
    }

    /// Removes all entries without stopping any handles and returns them.
    pub fn clear(&self) -> Vec<(H256, Arc<R>)> {
        self.handles.write().drain().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.read().is_empty()
    }

    /// Moves the cache past a finalized block.
    ///
    /// `finalized_path` runs from the previous root to the newly finalized block, oldest first.
    /// The new root keeps its own handle if it has one.
    /// Otherwise it inherits the handle of its newest ancestor on the path that has one.
    /// Every entry for a block that is neither the new root nor `retained` is removed.
    /// Handles that are no longer cached under any hash are stopped.
    ///
    /// Returns the number of handles stopped. Calling this again with the same path does nothing.
    pub fn on_finalisation(
        &self,
        finalized_path: &[H256],
        retained: impl Fn(H256) -> bool,
    ) -> usize {
        let Some(&new_root) = finalized_path.last() else {
            return 0;
        };

        let mut handles = self.handles.write();

        if !handles.contains_key(&new_root) {
            let inherited = finalized_path
                .iter()
                .rev()
                .find_map(|block_hash| handles.get(block_hash))
                .cloned();

            if let Some(handle) = inherited {
                handles.insert(new_root, handle);
            }
        }

        let (kept, removed): (Vec<_>, Vec<_>) = handles
            .drain()
            .partition(|(block_hash, _)| *block_hash == new_root || retained(*block_hash));

        *handles = kept.into_iter().collect();

        let mut stopped = Vec::<Arc<R>>::new();

        for (_, handle) in removed {
            let still_cached = handles.values().any(|kept| Arc::ptr_eq(kept, &handle));
            let already_stopped = stopped.iter().any(|other| Arc::ptr_eq(other, &handle));

            if !still_cached && !already_stopped {
                stopped.push(handle);
            }
        }

        drop(handles);

        for handle in &stopped {
            handle.stop();
        }

        stopped.len()
    }
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct CountingRuntime {
        stops: AtomicUsize,
    }

    impl RuntimeHandle for CountingRuntime {
        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl CountingRuntime {
        fn stops(&self) -> usize {
            self.stops.load(Ordering::SeqCst)
        }
    }

    fn hash(byte: u8) -> H256 {
        H256::repeat_byte(byte)
    }

    #[test]
    fn new_root_inherits_handle_of_old_root() {
        let cache = HandleCache::default();
        let runtime = Arc::new(CountingRuntime::default());

        cache.set(hash(1), runtime.clone());

        let stopped = cache.on_finalisation(&[hash(1), hash(2)], |_| false);

        assert_eq!(stopped, 0);
        assert_eq!(runtime.stops(), 0);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(hash(1)).is_none());
        assert!(cache.get(hash(2)).is_some_and(|handle| Arc::ptr_eq(&handle, &runtime)));
    }

    #[test]
    fn upgraded_runtime_on_new_root_is_not_overwritten() {
        let cache = HandleCache::default();
        let old = Arc::new(CountingRuntime::default());
        let upgraded = Arc::new(CountingRuntime::default());

        cache.set(hash(1), old.clone());
        cache.set(hash(3), upgraded.clone());

        let stopped = cache.on_finalisation(&[hash(1), hash(2), hash(3)], |_| false);

        assert_eq!(stopped, 1);
        assert_eq!(old.stops(), 1);
        assert_eq!(upgraded.stops(), 0);
        assert!(cache.get(hash(3)).is_some_and(|handle| Arc::ptr_eq(&handle, &upgraded)));
    }

    #[test]
    fn new_root_inherits_newest_handle_on_the_path() {
        let cache = HandleCache::default();
        let old = Arc::new(CountingRuntime::default());
        let upgraded = Arc::new(CountingRuntime::default());

        cache.set(hash(1), old.clone());
        cache.set(hash(2), upgraded.clone());

        cache.on_finalisation(&[hash(1), hash(2), hash(3)], |_| false);

        assert_eq!(old.stops(), 1);
        assert_eq!(upgraded.stops(), 0);
        assert!(cache.get(hash(3)).is_some_and(|handle| Arc::ptr_eq(&handle, &upgraded)));
    }

    #[test]
    fn pruned_forks_are_stopped_and_retained_blocks_are_kept() {
        let cache = HandleCache::default();
        let canonical = Arc::new(CountingRuntime::default());
        let fork = Arc::new(CountingRuntime::default());
        let descendant = Arc::new(CountingRuntime::default());

        cache.set(hash(1), canonical.clone());
        cache.set(hash(7), fork.clone());
        cache.set(hash(4), descendant.clone());

        let stopped = cache.on_finalisation(&[hash(1), hash(2)], |block_hash| {
            block_hash == hash(4)
        });

        assert_eq!(stopped, 1);
        assert_eq!(fork.stops(), 1);
        assert_eq!(canonical.stops(), 0);
        assert_eq!(descendant.stops(), 0);
        assert_eq!(cache.len(), 2);
        assert!(cache.get(hash(7)).is_none());
    }

    #[test]
    fn shared_handle_is_stopped_once_and_only_when_unreferenced() {
        let cache = HandleCache::default();
        let shared = Arc::new(CountingRuntime::default());
        let dropped = Arc::new(CountingRuntime::default());

        cache.set(hash(1), shared.clone());
        cache.set(hash(5), shared.clone());
        cache.set(hash(6), dropped.clone());
        cache.set(hash(7), dropped.clone());

        let stopped = cache.on_finalisation(&[hash(1), hash(2)], |_| false);

        assert_eq!(stopped, 1);
        assert_eq!(shared.stops(), 0);
        assert_eq!(dropped.stops(), 1);
    }

    #[test]
    fn repeated_finalisation_does_nothing() {
        let cache = HandleCache::default();
        let runtime = Arc::new(CountingRuntime::default());
        let fork = Arc::new(CountingRuntime::default());

        cache.set(hash(1), runtime.clone());
        cache.set(hash(9), fork.clone());

        assert_eq!(cache.on_finalisation(&[hash(1), hash(2)], |_| false), 1);
        assert_eq!(cache.on_finalisation(&[hash(1), hash(2)], |_| false), 0);

        assert_eq!(runtime.stops(), 0);
        assert_eq!(fork.stops(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn delete_and_clear_do_not_stop_handles() {
        let cache = HandleCache::default();
        let runtime = Arc::new(CountingRuntime::default());

        cache.set(hash(1), runtime.clone());
        cache.set(hash(2), runtime.clone());

        assert!(cache.delete(hash(1)).is_some());
        assert_eq!(cache.clear().len(), 1);
        assert!(cache.is_empty());
        assert_eq!(runtime.stops(), 0);
    }

    #[test]
    fn empty_path_does_nothing() {
        let cache = HandleCache::<CountingRuntime>::default();

        assert_eq!(cache.on_finalisation(&[], |_| false), 0);
    }
}
