//! The pager: maps the data file and hands out pages by number.
//!
//! `Pager` itself never mutates committed pages in place during a
//! transaction — writers go through the scratch pool instead — it is
//! consulted only as the bottom tier of `LowLevelTransaction::get_page`'s
//! three-tier lookup, and as the target of the background flush that copies
//! committed scratch pages back once no reader can still observe their prior
//! version.

mod state;

use std::sync::Arc;

use corestore_error::{Result, StorageError};
use corestore_types::{Page, PageNumber};
use corestore_vfs::VfsFile;

pub use state::PagerState;

/// Maps a single data file and serves page reads/writes by page number.
///
/// One pager per open environment, generic over the file implementation so
/// tests run against `corestore_vfs::MemoryFile` and production against
/// `corestore_vfs::MappedFile`.
pub struct Pager<F: VfsFile> {
    file: Arc<F>,
    page_size: usize,
    max_storage_size_pages: Option<u64>,
}

impl<F: VfsFile> Pager<F> {
    #[must_use]
    pub fn new(file: F, page_size: usize, max_storage_size_pages: Option<u64>) -> Self {
        Self {
            file: Arc::new(file),
            page_size,
            max_storage_size_pages,
        }
    }

    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    #[must_use]
    pub fn max_storage_size_pages(&self) -> Option<u64> {
        self.max_storage_size_pages
    }

    /// `GetNumberOfOverflowPages`.
    #[must_use]
    pub fn number_of_overflow_pages(&self, byte_count: u64) -> u64 {
        corestore_types::number_of_overflow_pages(byte_count, self.page_size)
    }

    /// Pins this pager's backing file alive for as long as the returned
    /// handle is held, per `EnsurePagerStateReference`.
    #[must_use]
    pub fn state(&self) -> PagerState {
        PagerState::new(Arc::clone(&self.file) as Arc<dyn VfsFile>)
    }

    fn offset_of(&self, page_number: PageNumber) -> u64 {
        page_number.get() * self.page_size as u64
    }

    /// Reads `run_length` contiguous pages (1 for a non-overflow page)
    /// starting at `page_number` directly from the mapped data file.
    ///
    /// Returns `StorageError::Io`/`InvalidOperation` (never panics) when the
    /// page lies beyond the current file length — the core treats an
    /// out-of-range read through the pager as a fatal, unrecoverable
    /// condition.
    pub fn read_page(&self, page_number: PageNumber, run_length: u64) -> Result<Page> {
        let len = run_length.max(1) as usize * self.page_size;
        let offset = self.offset_of(page_number);
        if offset + len as u64 > self.file.len() {
            return Err(StorageError::catastrophic(format!(
                "pager read of page {page_number} (run {run_length}) is out of bounds for a {}-byte data file",
                self.file.len()
            )));
        }
        let mut buf = vec![0u8; len].into_boxed_slice();
        self.file.read_at(offset, &mut buf)?;
        Ok(Page::from_buf(buf))
    }

    /// Writes `page`'s full bytes (header included) back into the data file
    /// at `page_number`, growing the file first if necessary. Used only by
    /// the background flush that publishes committed scratch pages; never
    /// called mid-transaction.
    pub fn write_page(&self, page_number: PageNumber, page: &Page) -> Result<()> {
        let offset = self.offset_of(page_number);
        self.file.grow_to(offset + page.bytes().len() as u64)?;
        self.file.write_at(offset, page.bytes())
    }

    pub fn sync(&self) -> Result<()> {
        self.file.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corestore_types::PageHeader;
    use corestore_vfs::{MemoryVfs, Vfs};

    fn pager() -> Pager<corestore_vfs::MemoryFile> {
        let vfs = MemoryVfs::new();
        let file = vfs.open("data.db").unwrap();
        file.grow_to(4096 * 8).unwrap();
        Pager::new(file, 4096, None)
    }

    #[test]
    fn write_then_read_back_same_bytes() {
        let pager = pager();
        let mut page = Page::zeroed(4096, PageNumber::new(3));
        page.payload_mut().fill(0x42);
        pager.write_page(PageNumber::new(3), &page).unwrap();

        let read_back = pager.read_page(PageNumber::new(3), 1).unwrap();
        assert_eq!(read_back.page_number(), PageNumber::new(3));
        assert!(read_back.payload().iter().all(|&b| b == 0x42));
    }

    #[test]
    fn reading_past_the_end_of_the_file_is_an_error() {
        let pager = pager();
        assert!(pager.read_page(PageNumber::new(1_000_000), 1).is_err());
    }

    #[test]
    fn overflow_run_reads_as_one_contiguous_block() {
        let pager = pager();
        let mut head = Page::zeroed(4096 * 3, PageNumber::new(1));
        head.set_header(&PageHeader {
            page_number: PageNumber::new(1),
            overflow_byte_count: 10_000,
            flags: corestore_types::PageFlags::OVERFLOW,
            tree_flags: corestore_types::TreePageFlags::empty(),
        });
        head.payload_mut().fill(0x7A);
        pager.write_page(PageNumber::new(1), &head).unwrap();

        let read_back = pager.read_page(PageNumber::new(1), 3).unwrap();
        assert_eq!(read_back.bytes().len(), 4096 * 3);
        assert_eq!(read_back.header().overflow_byte_count, 10_000);
    }

    #[test]
    fn pager_state_keeps_the_file_alive_independent_of_the_pager() {
        let pager = pager();
        let state = pager.state();
        drop(pager);
        // The state handle alone still pins the mapped file's Arc; this
        // merely exercises that `state()` does not borrow from `&self`.
        drop(state);
    }
}
