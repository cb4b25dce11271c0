//! Free-page tracking consumed by `LowLevelTransaction`.
//!
//! This component's internal bookkeeping is explicitly out of scope:
//! the core only requires the two calls below plus reentrancy safety. A
//! production implementation stores its own free-list in pages and recurses
//! back into the owning transaction to read/modify them; `SimpleFreeSpaceHandler`
//! instead keeps an in-memory set, which is sufficient to satisfy the
//! interface without introducing a dependency cycle between this crate and
//! the transaction core. It only ever services single-page requests — runs
//! of more than one page always fall back to `AllocatePage`'s tail growth,
//! matching how a page-backed free list would behave before it has
//! accumulated a large-enough contiguous run to offer.

use std::collections::BTreeSet;

use corestore_types::PageNumber;
use parking_lot::Mutex;

/// The free-page interface `LowLevelTransaction` consumes.
pub trait FreeSpaceHandler: Send + Sync {
    /// Attempts to satisfy an `n`-page allocation from previously freed
    /// pages. Returns `None` (never an error) when no suitable free run is
    /// available; the caller falls back to extending the file's tail.
    fn try_allocate(&self, n: u64) -> Option<PageNumber>;

    /// Records that `page` was freed by a committing/committed transaction
    /// and is available for future allocation.
    fn free_page(&self, page: PageNumber);

    /// Number of pages currently tracked as free, for diagnostics/tests.
    fn free_page_count(&self) -> usize;
}

/// An in-memory, single-page-granularity [`FreeSpaceHandler`].
#[derive(Default)]
pub struct SimpleFreeSpaceHandler {
    free: Mutex<BTreeSet<PageNumber>>,
}

impl SimpleFreeSpaceHandler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl FreeSpaceHandler for SimpleFreeSpaceHandler {
    fn try_allocate(&self, n: u64) -> Option<PageNumber> {
        if n != 1 {
            return None;
        }
        let mut free = self.free.lock();
        let first = *free.iter().next()?;
        free.remove(&first);
        Some(first)
    }

    fn free_page(&self, page: PageNumber) {
        self.free.lock().insert(page);
    }

    fn free_page_count(&self) -> usize {
        self.free.lock().len()
    }
}
