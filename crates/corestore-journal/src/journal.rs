use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use corestore_error::{Result, StorageError};
use corestore_types::{Page, PageNumber, TransactionHeader, TransactionId};
use parking_lot::RwLock;

use crate::entry::JournalEntry;
use crate::snapshot::JournalSnapshot;

/// Append-only log of committed page mutations.
///
/// The log (`Vec<Arc<JournalEntry>>`) and the page-translation table
/// (`HashMap<PageNumber, usize>`) are both stored behind an `Arc` that is
/// replaced, not mutated, on every commit — this is what lets
/// [`Journal::get_snapshots`] hand out an O(1) immutable view without
/// cloning the whole structure.
pub struct Journal {
    log: RwLock<Arc<Vec<Arc<JournalEntry>>>>,
    translation: RwLock<Arc<HashMap<PageNumber, usize>>>,
    last_committed_id: RwLock<Option<TransactionId>>,
    has_lazy_transactions: AtomicBool,
}

impl Default for Journal {
    fn default() -> Self {
        Self::new()
    }
}

impl Journal {
    #[must_use]
    pub fn new() -> Self {
        Self {
            log: RwLock::new(Arc::new(Vec::new())),
            translation: RwLock::new(Arc::new(HashMap::new())),
            last_committed_id: RwLock::new(None),
            has_lazy_transactions: AtomicBool::new(false),
        }
    }

    /// `GetSnapshots`: an O(1) atomic snapshot of every page version the
    /// journal currently holds.
    #[must_use]
    pub fn get_snapshots(&self) -> JournalSnapshot {
        JournalSnapshot {
            log: Arc::clone(&self.log.read()),
            translation: Arc::clone(&self.translation.read()),
        }
    }

    /// A write transaction's id must be strictly greater than every id
    /// already committed through this journal. Violating this is fatal.
    pub fn check_transaction_id(&self, id: TransactionId) -> Result<()> {
        if let Some(observed) = *self.last_committed_id.read() {
            if id <= observed {
                return Err(StorageError::DuplicateTransactionId {
                    attempted: id,
                    observed,
                });
            }
        }
        Ok(())
    }

    /// Whether any lazy (buffered, not yet flushed to the pager) transaction
    /// has ever been written through this journal.
    ///
    /// Modeled as a one-way latch per the Open Question resolution in
    /// `DESIGN.md`: once set by [`Journal::write_to_journal`], it is never
    /// cleared for the lifetime of this `Journal` value, even once the
    /// backlog is fully flushed.
    #[must_use]
    pub fn has_lazy_transactions(&self) -> bool {
        self.has_lazy_transactions.load(Ordering::SeqCst)
    }

    /// `WriteToJournal`: durably records `pages` as committed under
    /// `header.transaction_id`. Returns the number of pages written.
    ///
    /// Once this returns `Ok`, the transaction is considered committed even
    /// if a later step (e.g. releasing the header's scratch slot) fails —
    /// that failure must be surfaced as `StorageError::CatastrophicFailure`
    /// by the caller, not retried here.
    pub fn write_to_journal(
        &self,
        header: &TransactionHeader,
        pages: impl IntoIterator<Item = (PageNumber, Page)>,
    ) -> Result<u64> {
        self.check_transaction_id(header.transaction_id)?;

        let mut log_guard = self.log.write();
        let mut translation_guard = self.translation.write();

        let mut new_log = (**log_guard).clone();
        let mut new_translation = (**translation_guard).clone();
        let mut written = 0u64;

        for (page_number, page) in pages {
            let idx = new_log.len();
            new_log.push(Arc::new(JournalEntry {
                transaction_id: header.transaction_id,
                page_number,
                page,
            }));
            new_translation.insert(page_number, idx);
            written += 1;
        }

        *log_guard = Arc::new(new_log);
        *translation_guard = Arc::new(new_translation);
        *self.last_committed_id.write() = Some(header.transaction_id);
        if written > 0 {
            self.has_lazy_transactions.store(true, Ordering::SeqCst);
        }

        tracing::debug!(
            transaction_id = header.transaction_id.get(),
            pages_written = written,
            "journal commit durable"
        );
        Ok(written)
    }

    /// `UpdateCacheForJournalSnapshots`: invalidates any cached
    /// snapshot view after a rollback.
    ///
    /// This journal always computes [`JournalSnapshot`]s fresh from the
    /// current `log`/`translation` `Arc`s, so there is no separate cache to
    /// invalidate; a rolled-back write transaction never called
    /// `write_to_journal`, so the journal's state is already exactly as it
    /// was before that transaction began. Exposed so a future caching layer
    /// has an obvious hook to invalidate against.
    pub fn update_cache_for_journal_snapshots(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(id: u64) -> TransactionHeader {
        TransactionHeader::new(TransactionId::new(id), PageNumber::new(1))
    }

    #[test]
    fn snapshot_taken_before_a_commit_does_not_see_it() {
        let journal = Journal::new();
        let before = journal.get_snapshots();

        journal
            .write_to_journal(
                &header(1),
                [(PageNumber::new(1), Page::zeroed(4096, PageNumber::new(1)))],
            )
            .unwrap();

        assert!(before.read_page(PageNumber::new(1)).is_none());
        let after = journal.get_snapshots();
        assert!(after.read_page(PageNumber::new(1)).is_some());
    }

    #[test]
    fn later_commit_to_the_same_page_number_is_the_new_latest_version() {
        let journal = Journal::new();
        let mut p1 = Page::zeroed(4096, PageNumber::new(1));
        p1.payload_mut().fill(0xAA);
        journal
            .write_to_journal(&header(1), [(PageNumber::new(1), p1)])
            .unwrap();

        let mut p2 = Page::zeroed(4096, PageNumber::new(1));
        p2.payload_mut().fill(0xBB);
        journal
            .write_to_journal(&header(2), [(PageNumber::new(1), p2)])
            .unwrap();

        let snap = journal.get_snapshots();
        let read = snap.read_page(PageNumber::new(1)).unwrap();
        assert!(read.payload().iter().all(|&b| b == 0xBB));
    }

    #[test]
    fn duplicate_or_out_of_order_transaction_id_is_rejected() {
        let journal = Journal::new();
        journal.write_to_journal(&header(5), []).unwrap();
        let err = journal.write_to_journal(&header(5), []).unwrap_err();
        assert!(matches!(err, StorageError::DuplicateTransactionId { .. }));
        let err = journal.write_to_journal(&header(3), []).unwrap_err();
        assert!(matches!(err, StorageError::DuplicateTransactionId { .. }));
    }

    #[test]
    fn lazy_transaction_latch_is_one_way() {
        let journal = Journal::new();
        assert!(!journal.has_lazy_transactions());
        journal
            .write_to_journal(
                &header(1),
                [(PageNumber::new(1), Page::zeroed(4096, PageNumber::new(1)))],
            )
            .unwrap();
        assert!(journal.has_lazy_transactions());
        // Writing a no-op commit afterwards must not clear the latch.
        journal.write_to_journal(&header(2), []).unwrap();
        assert!(journal.has_lazy_transactions());
    }
}
