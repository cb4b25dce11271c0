use std::sync::Arc;

use corestore_vfs::VfsFile;

/// A reference-counted handle a transaction holds to keep a pager's mapped
/// file alive for the transaction's lifetime, plus an ordered list of
/// callbacks run the moment the last clone of this handle is dropped.
///
/// Modeled as an explicit `Arc<DisposeHooks>` rather than a C#-style event,
/// since Rust's `Drop` on the last owner already gives the "last reference
/// released" signal for free.
#[derive(Clone)]
pub struct PagerState {
    _file: Arc<dyn VfsFile>,
    hooks: Arc<DisposeHooks>,
}

impl PagerState {
    pub(crate) fn new(file: Arc<dyn VfsFile>) -> Self {
        Self {
            _file: file,
            hooks: Arc::new(DisposeHooks::default()),
        }
    }

    /// Registers `hook` to run, in registration order, when the last clone
    /// of this `PagerState` (or any clone derived from it) is dropped.
    pub fn on_dispose(&self, hook: impl FnOnce() + Send + 'static) {
        self.hooks.push(hook);
    }
}

#[derive(Default)]
struct DisposeHooks {
    callbacks: parking_lot::Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl DisposeHooks {
    fn push(&self, hook: impl FnOnce() + Send + 'static) {
        self.callbacks.lock().push(Box::new(hook));
    }
}

impl Drop for DisposeHooks {
    fn drop(&mut self) {
        for hook in self.callbacks.get_mut().drain(..) {
            hook();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corestore_vfs::{MemoryVfs, Vfs};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn dispose_hooks_run_once_all_clones_are_dropped() {
        let vfs = MemoryVfs::new();
        let file = vfs.open("f").unwrap();
        let state = PagerState::new(Arc::new(file));
        let ran = Arc::new(AtomicUsize::new(0));

        let ran_clone = Arc::clone(&ran);
        state.on_dispose(move || {
            ran_clone.fetch_add(1, Ordering::SeqCst);
        });

        let second = state.clone();
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        drop(state);
        assert_eq!(ran.load(Ordering::SeqCst), 0, "hook fires only after the last clone drops");
        drop(second);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn hooks_run_in_registration_order() {
        let vfs = MemoryVfs::new();
        let file = vfs.open("f").unwrap();
        let state = PagerState::new(Arc::new(file));
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = Arc::clone(&order);
            state.on_dispose(move || order.lock().push(i));
        }
        drop(state);
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }
}
