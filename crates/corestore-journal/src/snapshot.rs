use std::collections::HashMap;
use std::sync::Arc;

use corestore_types::{Page, PageNumber};

use crate::entry::JournalEntry;

/// An atomic, immutable view of the journal's page-translation table as of
/// the moment it was taken.
///
/// A read transaction binds one of these at open time and holds it for its
/// whole lifetime, which is what gives it snapshot isolation:
/// later commits append new log entries and swap in a new translation map,
/// but never mutate the `Arc`s this snapshot already holds.
#[derive(Clone)]
pub struct JournalSnapshot {
    pub(crate) log: Arc<Vec<Arc<JournalEntry>>>,
    pub(crate) translation: Arc<HashMap<PageNumber, usize>>,
}

impl JournalSnapshot {
    /// Returns the most recent version of `page_number` visible to this
    /// snapshot, or `None` if the journal has never recorded a write to it
    /// (in which case the page, if it exists at all, lives only in the data
    /// file).
    #[must_use]
    pub fn read_page(&self, page_number: PageNumber) -> Option<Page> {
        let idx = *self.translation.get(&page_number)?;
        Some(self.log[idx].page.clone())
    }
}
