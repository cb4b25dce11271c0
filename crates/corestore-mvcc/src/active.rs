use std::collections::BTreeSet;

use corestore_types::TransactionId;

/// Tracks which transactions are currently open so the environment (and,
/// through it, a background flusher) can learn the oldest live transaction
/// — the point before which no committed page version can safely be
/// reclaimed.
#[derive(Default)]
pub struct ActiveTransactions {
    readers: BTreeSet<TransactionId>,
    writer: Option<TransactionId>,
}

impl ActiveTransactions {
    pub fn register_reader(&mut self, id: TransactionId) {
        self.readers.insert(id);
    }

    pub fn deregister_reader(&mut self, id: TransactionId) {
        self.readers.remove(&id);
    }

    pub fn set_writer(&mut self, id: TransactionId) {
        self.writer = Some(id);
    }

    pub fn clear_writer(&mut self) {
        self.writer = None;
    }

    #[must_use]
    pub fn writer(&self) -> Option<TransactionId> {
        self.writer
    }

    /// The oldest transaction (reader or the writer) still open, if any.
    #[must_use]
    pub fn oldest_active(&self) -> Option<TransactionId> {
        match (self.readers.iter().next().copied(), self.writer) {
            (Some(r), Some(w)) => Some(r.min(w)),
            (Some(r), None) => Some(r),
            (None, Some(w)) => Some(w),
            (None, None) => None,
        }
    }

    #[must_use]
    pub fn reader_count(&self) -> usize {
        self.readers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oldest_active_considers_both_readers_and_the_writer() {
        let mut active = ActiveTransactions::default();
        assert_eq!(active.oldest_active(), None);

        active.register_reader(TransactionId::new(5));
        active.register_reader(TransactionId::new(3));
        assert_eq!(active.oldest_active(), Some(TransactionId::new(3)));

        active.set_writer(TransactionId::new(1));
        assert_eq!(active.oldest_active(), Some(TransactionId::new(1)));

        active.deregister_reader(TransactionId::new(3));
        active.clear_writer();
        assert_eq!(active.oldest_active(), Some(TransactionId::new(5)));
    }
}
