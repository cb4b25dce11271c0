use corestore_types::{Page, PageNumber, TransactionId};

/// One committed page version recorded in the journal's append-only log.
pub struct JournalEntry {
    pub transaction_id: TransactionId,
    pub page_number: PageNumber,
    pub page: Page,
}
