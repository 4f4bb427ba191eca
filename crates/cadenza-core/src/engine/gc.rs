//! Deferred deallocation for render-side objects
//!
//! Nodes and render plans are allocated on the control thread and handed to
//! the render thread inside [`basedrop::Owned`] boxes. When the render thread
//! drops one (a node is removed, a plan is replaced) no memory is freed
//! there: the pointer is queued, and the control thread frees it on its next
//! [`RenderCollector::collect`].
//!
//! ```ignore
//! let collector = RenderCollector::new();
//! let node = Owned::new(&collector.handle(), RenderNode::passthrough("util"));
//! // ... node is sent to the render thread, later dropped there ...
//! collector.collect(); // memory is released here
//! ```

use basedrop::{Collector, Handle};

/// Owns the `basedrop` collector on the control thread
pub struct RenderCollector {
    collector: Collector,
}

impl RenderCollector {
    pub fn new() -> Self {
        Self {
            collector: Collector::new(),
        }
    }

    /// Handle for allocating `Owned`/`Shared` values reclaimed here
    pub fn handle(&self) -> Handle {
        self.collector.handle()
    }

    /// Free everything the render thread has released so far
    pub fn collect(&mut self) {
        self.collector.collect();
    }
}

impl Default for RenderCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RenderCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderCollector").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basedrop::Owned;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountsDrops(Arc<AtomicUsize>);

    impl Drop for CountsDrops {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_drop_is_deferred_until_collect() {
        let mut collector = RenderCollector::new();
        let drops = Arc::new(AtomicUsize::new(0));
        let owned = Owned::new(&collector.handle(), CountsDrops(Arc::clone(&drops)));

        let render_thread = std::thread::spawn(move || drop(owned));
        render_thread.join().unwrap();
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        collector.collect();
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}
