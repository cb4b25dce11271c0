use std::collections::{HashMap, HashSet};

use corestore_scratch::PageFromScratch;
use corestore_types::PageNumber;

/// Reusable containers borrowed by the single active write transaction and
/// reset (not reallocated) when it ends.
///
/// Safe to share without per-field locking because the environment never
/// allows more than one write transaction to be open at a time.
#[derive(Default)]
pub struct WriteTransactionPool {
    dirty_pages: Option<HashSet<PageNumber>>,
    scratch_table: Option<HashMap<PageNumber, PageFromScratch>>,
    dirty_overflow_pages: Option<HashMap<PageNumber, u64>>,
    borrows: u64,
    resets: u64,
}

pub(crate) type BorrowedContainers = (
    HashSet<PageNumber>,
    HashMap<PageNumber, PageFromScratch>,
    HashMap<PageNumber, u64>,
);

impl WriteTransactionPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn borrow(&mut self) -> BorrowedContainers {
        self.borrows += 1;
        (
            self.dirty_pages.take().unwrap_or_default(),
            self.scratch_table.take().unwrap_or_default(),
            self.dirty_overflow_pages.take().unwrap_or_default(),
        )
    }

    pub(crate) fn reset_and_return(&mut self, mut containers: BorrowedContainers) {
        containers.0.clear();
        containers.1.clear();
        containers.2.clear();
        self.dirty_pages = Some(containers.0);
        self.scratch_table = Some(containers.1);
        self.dirty_overflow_pages = Some(containers.2);
        self.resets += 1;
    }

    /// Number of times a write transaction has borrowed these containers.
    #[must_use]
    pub fn borrows(&self) -> u64 {
        self.borrows
    }

    /// Number of times the containers have been cleared and returned.
    #[must_use]
    pub fn resets(&self) -> u64 {
        self.resets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn borrow_then_return_clears_but_keeps_the_allocation() {
        let mut pool = WriteTransactionPool::new();
        let (mut dirty, mut scratch, mut overflow) = pool.borrow();
        dirty.insert(PageNumber::new(1));
        scratch.insert(
            PageNumber::new(1),
            PageFromScratch {
                file_id: corestore_types::ScratchFileId::new(0),
                slot: 0,
                run_length: 1,
                original_run_length: 1,
                previous_page: None,
            },
        );
        overflow.insert(PageNumber::new(2), 3);
        let cap_before = dirty.capacity();

        pool.reset_and_return((dirty, scratch, overflow));
        assert_eq!(pool.borrows(), 1);
        assert_eq!(pool.resets(), 1);

        let (dirty, scratch, overflow) = pool.borrow();
        assert!(dirty.is_empty());
        assert!(scratch.is_empty());
        assert!(overflow.is_empty());
        assert!(
            dirty.capacity() >= cap_before || cap_before == 0,
            "reuse should not have reallocated a smaller map"
        );
        assert_eq!(pool.borrows(), 2);
    }
}
