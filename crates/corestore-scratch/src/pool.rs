use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use corestore_error::{Result, StorageError};
use corestore_types::{Page, PageNumber, ScratchFileId};
use memmap2::MmapMut;
use parking_lot::Mutex;

use crate::handle::PageFromScratch;
use crate::reader_pin::ReaderPin;

/// Supplies page-aligned slots backed by anonymous mapped memory, disjoint
/// from the data file.
///
/// Each scratch file is a single `memmap2::MmapMut` anonymous mapping
/// bump-allocated from the front; freed ranges go onto a per-file free list
/// but are only made visible to future allocations once
/// [`ScratchBufferPool::free`]'s deferred reclamation runs, which happens
/// once no [`ReaderPin`] older than the free could still be alive, using
/// `crossbeam-epoch` for exactly this kind of "safe once no reader can see
/// the old version" reclamation.
pub struct ScratchBufferPool {
    page_size: usize,
    max_scratch_file_pages: u64,
    files: Mutex<Vec<Arc<Mutex<ScratchFileState>>>>,
    collector: crossbeam_epoch::Collector,
    in_use_slots: Arc<AtomicU64>,
}

struct ScratchFileState {
    map: MmapMut,
    capacity_pages: u64,
    next_free_slot: u64,
    free_list: Vec<(u64, u64)>,
}

impl ScratchFileState {
    fn new(capacity_pages: u64, page_size: usize) -> Result<Self> {
        let map = MmapMut::map_anon(capacity_pages as usize * page_size)
            .map_err(StorageError::Io)?;
        Ok(Self {
            map,
            capacity_pages,
            next_free_slot: 0,
            free_list: Vec::new(),
        })
    }

    fn try_allocate(&mut self, n: u64) -> Option<u64> {
        if let Some(idx) = self
            .free_list
            .iter()
            .position(|&(_, len)| len >= n)
        {
            let (start, len) = self.free_list.remove(idx);
            if len > n {
                self.free_list.push((start + n, len - n));
            }
            return Some(start);
        }
        if self.next_free_slot + n <= self.capacity_pages {
            let start = self.next_free_slot;
            self.next_free_slot += n;
            Some(start)
        } else {
            None
        }
    }

    fn release(&mut self, slot: u64, len: u64) {
        self.free_list.push((slot, len));
    }
}

impl ScratchBufferPool {
    #[must_use]
    pub fn new(page_size: usize, max_scratch_file_pages: u64) -> Self {
        Self {
            page_size,
            max_scratch_file_pages,
            files: Mutex::new(Vec::new()),
            collector: crossbeam_epoch::Collector::new(),
            in_use_slots: Arc::new(AtomicU64::new(0)),
        }
    }

    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of scratch-pool pages currently allocated to some transaction,
    /// used by tests to assert rollback returns the pool to its prior state.
    #[must_use]
    pub fn in_use_slots(&self) -> u64 {
        self.in_use_slots.load(Ordering::SeqCst)
    }

    /// Pins the current epoch so that any slot freed after this call stays
    /// valid for reads until the returned [`ReaderPin`] is dropped. A read
    /// transaction's snapshot holds one of these for its entire lifetime.
    #[must_use]
    pub fn pin_reader(&self) -> ReaderPin {
        ReaderPin::new(self.collector.register().pin())
    }

    /// Reserves a contiguous run of `n` scratch slots.
    pub fn allocate(&self, n: u64) -> Result<PageFromScratch> {
        let mut files = self.files.lock();
        for (idx, file) in files.iter().enumerate() {
            if let Some(slot) = file.lock().try_allocate(n) {
                self.in_use_slots.fetch_add(n, Ordering::SeqCst);
                return Ok(PageFromScratch {
                    file_id: ScratchFileId::new(idx as u32),
                    slot,
                    run_length: n,
                    original_run_length: n,
                    previous_page: None,
                });
            }
        }
        if n > self.max_scratch_file_pages {
            return Err(StorageError::ScratchBufferFull { requested: n });
        }
        let mut new_file = ScratchFileState::new(self.max_scratch_file_pages, self.page_size)?;
        let slot = new_file
            .try_allocate(n)
            .ok_or(StorageError::ScratchBufferFull { requested: n })?;
        let file_id = ScratchFileId::new(files.len() as u32);
        files.push(Arc::new(Mutex::new(new_file)));
        self.in_use_slots.fetch_add(n, Ordering::SeqCst);
        Ok(PageFromScratch {
            file_id,
            slot,
            run_length: n,
            original_run_length: n,
            previous_page: None,
        })
    }

    /// Returns a copy of the bytes at `handle`.
    pub fn read_page(&self, handle: &PageFromScratch) -> Result<Page> {
        let files = self.files.lock();
        let file = files
            .get(handle.file_id.0 as usize)
            .ok_or_else(|| StorageError::invalid_operation("scratch file id out of range"))?;
        let guard = file.lock();
        let start = handle.byte_offset(self.page_size) as usize;
        let len = handle.byte_len(self.page_size);
        Ok(Page::from_buf(guard.map[start..start + len].to_vec().into_boxed_slice()))
    }

    /// Overwrites the bytes at `handle` with `page`'s full buffer. Used by
    /// `ModifyPage`/`AllocatePage` to populate a freshly allocated slot.
    pub fn write_page(&self, handle: &PageFromScratch, page: &Page) -> Result<()> {
        let files = self.files.lock();
        let file = files
            .get(handle.file_id.0 as usize)
            .ok_or_else(|| StorageError::invalid_operation("scratch file id out of range"))?;
        let mut guard = file.lock();
        let start = handle.byte_offset(self.page_size) as usize;
        let len = handle.byte_len(self.page_size);
        guard.map[start..start + len].copy_from_slice(page.bytes());
        Ok(())
    }

    /// Zeroes the bytes at `handle`, used by `AllocatePage(zero = true)`.
    pub fn zero_page(&self, handle: &PageFromScratch) -> Result<()> {
        let files = self.files.lock();
        let file = files
            .get(handle.file_id.0 as usize)
            .ok_or_else(|| StorageError::invalid_operation("scratch file id out of range"))?;
        let mut guard = file.lock();
        let start = handle.byte_offset(self.page_size) as usize;
        let len = handle.byte_len(self.page_size);
        guard.map[start..start + len].fill(0);
        Ok(())
    }

    /// Splits a single contiguous run into consecutive sub-runs of the given
    /// `sizes`, same physical bytes, independent metadata. `sizes` must sum
    /// to `handle.run_length`.
    #[must_use]
    pub fn split_run(&self, handle: &PageFromScratch, sizes: &[u64]) -> Vec<PageFromScratch> {
        debug_assert_eq!(sizes.iter().sum::<u64>(), handle.run_length);
        let mut offset = 0u64;
        sizes
            .iter()
            .map(|&n| {
                let sub = PageFromScratch {
                    file_id: handle.file_id,
                    slot: handle.slot + offset,
                    run_length: n,
                    original_run_length: n,
                    previous_page: None,
                };
                offset += n;
                sub
            })
            .collect()
    }

    /// Splits a run-of-`n` allocation into `n` single-page allocations
    /// in place, same physical bytes, new metadata.
    #[must_use]
    pub fn break_into_single_pages(&self, handle: &PageFromScratch) -> Vec<PageFromScratch> {
        self.split_run(handle, &vec![1; handle.run_length as usize])
    }

    /// Releases `handle`'s slot back to the pool once no pinned reader could
    /// still observe it. Non-blocking: schedules the release and returns
    /// immediately; the actual free-list update happens the next time a
    /// reader pin is taken or dropped and the epoch can advance past it.
    pub fn free(&self, handle: PageFromScratch) {
        let files = Arc::clone(
            self.files
                .lock()
                .get(handle.file_id.0 as usize)
                .expect("free() called with a file_id this pool allocated"),
        );
        let in_use = Arc::clone(&self.in_use_slots);
        // A short-lived guard is enough to register the deferred closure;
        // it does not need to stay pinned after `defer` returns. The
        // collector will not actually run the closure until every
        // `ReaderPin` pinned at an older epoch has been dropped.
        let guard = self.collector.register().pin();
        let run_length = handle.run_length;
        guard.defer(move || {
            files.lock().release(handle.slot, handle.run_length);
            in_use.fetch_sub(run_length, Ordering::SeqCst);
        });
        guard.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_then_free_eventually_returns_slots_to_the_pool() {
        let pool = ScratchBufferPool::new(4096, 64);
        let h1 = pool.allocate(4).unwrap();
        assert_eq!(pool.in_use_slots(), 4);
        pool.free(h1);
        // No reader pinned, so the epoch can advance immediately; a few
        // pin/unpin cycles give the collector a chance to run the deferred
        // release (as it would in `ScratchBufferPool::allocate`'s callers).
        for _ in 0..4 {
            drop(pool.pin_reader());
        }
        assert_eq!(pool.in_use_slots(), 0);
    }

    #[test]
    fn write_then_read_round_trips_bytes() {
        let pool = ScratchBufferPool::new(4096, 64);
        let handle = pool.allocate(1).unwrap();
        let mut page = Page::zeroed(4096, PageNumber::new(9));
        page.payload_mut().fill(0x5C);
        pool.write_page(&handle, &page).unwrap();

        let read_back = pool.read_page(&handle).unwrap();
        assert!(read_back.payload().iter().all(|&b| b == 0x5C));
    }

    #[test]
    fn break_into_single_pages_preserves_bytes_with_new_metadata() {
        let pool = ScratchBufferPool::new(4096, 64);
        let handle = pool.allocate(3).unwrap();
        let split = pool.break_into_single_pages(&handle);
        assert_eq!(split.len(), 3);
        assert!(split.iter().all(|p| p.run_length == 1));
        assert_eq!(split[0].slot, handle.slot);
        assert_eq!(split[1].slot, handle.slot + 1);
        assert_eq!(split[2].slot, handle.slot + 2);
    }

    #[test]
    fn split_run_hands_back_independent_sub_handles_covering_the_whole_run() {
        let pool = ScratchBufferPool::new(4096, 64);
        let handle = pool.allocate(6).unwrap();
        let parts = pool.split_run(&handle, &[1, 2, 3]);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].slot, handle.slot);
        assert_eq!(parts[0].run_length, 1);
        assert_eq!(parts[1].slot, handle.slot + 1);
        assert_eq!(parts[1].run_length, 2);
        assert_eq!(parts[2].slot, handle.slot + 3);
        assert_eq!(parts[2].run_length, 3);
    }

    #[test]
    fn scratch_buffer_full_when_a_run_exceeds_the_file_size_cap() {
        let pool = ScratchBufferPool::new(4096, 4);
        let err = pool.allocate(5).unwrap_err();
        assert!(matches!(err, StorageError::ScratchBufferFull { requested: 5 }));
    }

    #[test]
    fn second_file_is_opened_once_the_first_is_full() {
        let pool = ScratchBufferPool::new(4096, 4);
        let _first = pool.allocate(4).unwrap();
        let second = pool.allocate(2).unwrap();
        assert_eq!(second.file_id, ScratchFileId::new(1));
    }
}
