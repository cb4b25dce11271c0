use corestore_types::{PageNumber, ScratchFileId};

/// A reference to a copy-on-write slot in the scratch pool.
///
/// Uniquely identifies a physical location; the logical page number it is
/// currently redirected from lives in the owning transaction's scratch
/// table, not here.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PageFromScratch {
    pub file_id: ScratchFileId,
    pub slot: u64,
    pub run_length: u64,
    pub original_run_length: u64,
    pub previous_page: Option<PageNumber>,
}

impl PageFromScratch {
    #[must_use]
    pub fn byte_len(&self, page_size: usize) -> usize {
        self.run_length as usize * page_size
    }

    #[must_use]
    pub fn byte_offset(&self, page_size: usize) -> u64 {
        self.slot * page_size as u64
    }
}
