use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use corestore_error::{Result, StorageError};
use corestore_scratch::{PageFromScratch, ReaderPin};
use corestore_types::{
    Page, PageFlags, PageHeader, PageNumber, TransactionHeader, TransactionId, TreePageFlags,
    TxnHeaderFlags,
};
use corestore_vfs::VfsFile;

use corestore_journal::JournalSnapshot;
use corestore_pager::PagerState;

use crate::environment::StorageEnvironment;

/// Whether a transaction may mutate the store.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TxMode {
    ReadOnly,
    ReadWrite,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum TxState {
    Open,
    Committed,
    RolledBack,
    Disposed,
}

struct WriteState {
    header_slot: PageFromScratch,
    header: TransactionHeader,
    scratch_table: HashMap<PageNumber, PageFromScratch>,
    dirty_pages: HashSet<PageNumber>,
    dirty_overflow_pages: HashMap<PageNumber, u64>,
    unused_scratch: Vec<PageFromScratch>,
    freed_pages: HashSet<PageNumber>,
    pages_to_free_on_commit: Vec<PageNumber>,
    allocated_pages_in_transaction: u64,
    overflow_pages_in_transaction: u64,
    transaction_pages_count: u64,
    flushed_to_journal: bool,
}

/// The core engine: per-transaction page read/modify/allocate/free,
/// commit, rollback, snapshot isolation.
///
/// Uses an explicit state enum checked on every call and `tracing`-
/// instrumented commit/rollback, with a three-tier page lookup (scratch
/// table, journal snapshot, pager) and a dirty-page map kept separately
/// for readers and the single writer.
pub struct LowLevelTransaction<F: VfsFile> {
    env: Arc<StorageEnvironment<F>>,
    id: TransactionId,
    mode: TxMode,
    state: TxState,
    journal_snapshot: JournalSnapshot,
    _reader_pin: ReaderPin,
    _pager_state: PagerState,
    local_next_page_number: PageNumber,
    local_root: PageNumber,
    write: Option<WriteState>,
}

impl<F: VfsFile> LowLevelTransaction<F> {
    pub(crate) fn new(env: Arc<StorageEnvironment<F>>, mode: TxMode) -> Result<Self> {
        env.check_not_catastrophic()?;
        let id = env.next_transaction_id();
        let pager_state = env.pager.state();
        let journal_snapshot = env.journal.get_snapshots();
        let reader_pin = env.scratch.pin_reader();
        let (local_next_page_number, local_root) = env.current_state();

        match mode {
            TxMode::ReadOnly => {
                env.register_reader(id);
                Ok(Self {
                    env,
                    id,
                    mode,
                    state: TxState::Open,
                    journal_snapshot,
                    _reader_pin: reader_pin,
                    _pager_state: pager_state,
                    local_next_page_number,
                    local_root,
                    write: None,
                })
            }
            TxMode::ReadWrite => {
                env.journal.check_transaction_id(id)?;
                env.try_acquire_writer()?;

                let (dirty_pages, scratch_table, dirty_overflow_pages) =
                    env.borrow_write_containers();

                let header_slot = match env.scratch.allocate(1) {
                    Ok(slot) => slot,
                    Err(e) => {
                        env.deregister_writer();
                        env.return_write_containers((dirty_pages, scratch_table, dirty_overflow_pages));
                        return Err(e);
                    }
                };
                let mut header_page = Page::zeroed(env.pager.page_size(), PageNumber::ROOT);
                header_page.set_header(&PageHeader {
                    page_number: PageNumber::ROOT,
                    overflow_byte_count: 0,
                    flags: PageFlags::SINGLE,
                    tree_flags: TreePageFlags::empty(),
                });
                env.scratch.write_page(&header_slot, &header_page)?;

                let mut header = TransactionHeader::new(id, local_next_page_number);
                header.previous_root = local_root;
                header.new_root = local_root;

                env.register_writer(id);
                tracing::debug!(transaction_id = id.get(), "write transaction opened");

                Ok(Self {
                    env,
                    id,
                    mode,
                    state: TxState::Open,
                    journal_snapshot,
                    _reader_pin: reader_pin,
                    _pager_state: pager_state,
                    local_next_page_number,
                    local_root,
                    write: Some(WriteState {
                        header_slot,
                        header,
                        scratch_table,
                        dirty_pages,
                        dirty_overflow_pages,
                        unused_scratch: Vec::new(),
                        freed_pages: HashSet::new(),
                        pages_to_free_on_commit: Vec::new(),
                        allocated_pages_in_transaction: 0,
                        overflow_pages_in_transaction: 0,
                        transaction_pages_count: 0,
                        flushed_to_journal: false,
                    }),
                })
            }
        }
    }

    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    #[must_use]
    pub fn mode(&self) -> TxMode {
        self.mode
    }

    #[must_use]
    pub fn is_write(&self) -> bool {
        self.write.is_some()
    }

    fn require_not_disposed(&self) -> Result<()> {
        if self.state == TxState::Disposed {
            Err(StorageError::ObjectDisposed(self.id))
        } else {
            Ok(())
        }
    }

    fn require_open_write(&self) -> Result<()> {
        match self.state {
            TxState::Disposed => Err(StorageError::ObjectDisposed(self.id)),
            TxState::Open if self.write.is_some() => Ok(()),
            TxState::Open => Err(StorageError::invalid_operation(
                "operation requires a write transaction",
            )),
            TxState::Committed | TxState::RolledBack => Err(StorageError::invalid_operation(
                "transaction has already committed or rolled back",
            )),
        }
    }

    /// : scratch table, then journal snapshot, then the data file.
    pub fn get_page(&self, p: PageNumber) -> Result<Page> {
        self.require_not_disposed()?;
        if let Some(write) = &self.write {
            if let Some(handle) = write.scratch_table.get(&p) {
                let page = self.env.scratch.read_page(handle)?;
                debug_assert_eq!(page.page_number(), p);
                return Ok(page);
            }
        }
        if let Some(page) = self.journal_snapshot.read_page(p) {
            debug_assert_eq!(page.page_number(), p);
            return Ok(page);
        }
        let head = self.env.pager.read_page(p, 1)?;
        let header = head.header();
        let page = if header.flags.contains(PageFlags::OVERFLOW) {
            let run = self
                .env
                .pager
                .number_of_overflow_pages(u64::from(header.overflow_byte_count));
            self.env.pager.read_page(p, run)?
        } else {
            head
        };
        debug_assert_eq!(page.page_number(), p);
        Ok(page)
    }

    /// Copy-on-write, idempotent within a transaction: returns an owned copy
    /// of `p`'s current bytes, redirected into this transaction's scratch
    /// table if it wasn't already. Mutate the returned `Page` and pass it to
    /// [`LowLevelTransaction::write_page`] to persist the change; the
    /// returned copy is not itself written back.
    pub fn modify_page(&mut self, p: PageNumber) -> Result<Page> {
        self.require_open_write()?;
        if let Some(handle) = self.write.as_ref().unwrap().scratch_table.get(&p).copied() {
            return self.env.scratch.read_page(&handle);
        }
        let existing = self.get_page(p)?;
        let run_length = (existing.bytes().len() / self.env.pager.page_size()).max(1) as u64;
        self.allocate_page(run_length, Some(p), Some(p), false)?;
        let handle = self.write.as_ref().unwrap().scratch_table[&p];
        self.env.scratch.write_page(&handle, &existing)?;
        Ok(existing)
    }

    /// Writes `page`'s bytes back into this transaction's scratch slot for
    /// `p`. `p` must already be dirty in this transaction — via
    /// `modify_page`, `allocate_page`, `allocate_pages`, or
    /// `allocate_overflow_raw_page` — or this returns an error instead of
    /// silently allocating one.
    pub fn write_page(&mut self, p: PageNumber, page: &Page) -> Result<()> {
        self.require_open_write()?;
        let handle = *self
            .write
            .as_ref()
            .unwrap()
            .scratch_table
            .get(&p)
            .ok_or_else(|| {
                StorageError::invalid_operation(
                    "write_page: page is not dirty in this transaction; call modify_page or an allocate_* method first",
                )
            })?;
        self.env.scratch.write_page(&handle, page)
    }

    /// Allocates a fresh `n`-page run, optionally at a caller-chosen page
    /// number (used by `modify_page`'s copy-on-write redirect).
    pub fn allocate_page(
        &mut self,
        n: u64,
        page_number: Option<PageNumber>,
        previous_page: Option<PageNumber>,
        zero: bool,
    ) -> Result<Page> {
        self.require_open_write()?;
        let mut grows_tail = false;
        let page_number = match page_number {
            Some(p) => p,
            None => match self.env.free_space.try_allocate(n) {
                Some(p) => p,
                None => {
                    grows_tail = true;
                    self.local_next_page_number
                }
            },
        };
        if let Some(quota) = self.env.pager.max_storage_size_pages() {
            if page_number.get() + n - 1 > quota {
                return Err(StorageError::QuotaExceeded {
                    requested: n,
                    at: page_number,
                    quota,
                });
            }
        }
        if grows_tail {
            self.local_next_page_number = self.local_next_page_number.offset(n);
        }

        let handle = self.env.scratch.allocate(n)?;
        if zero {
            self.env.scratch.zero_page(&handle)?;
        }
        let mut page = self.env.scratch.read_page(&handle)?;
        let flags = if n > 1 {
            PageFlags::OVERFLOW
        } else {
            PageFlags::SINGLE
        };
        page.set_header(&PageHeader {
            page_number,
            overflow_byte_count: 0,
            flags,
            tree_flags: TreePageFlags::empty(),
        });
        self.env.scratch.write_page(&handle, &page)?;

        let mut handle = handle;
        handle.previous_page = previous_page;
        let write = self.write.as_mut().expect("checked by require_open_write");
        write.allocated_pages_in_transaction += 1;
        if n > 1 {
            write.overflow_pages_in_transaction += n - 1;
            write.dirty_overflow_pages.insert(page_number.next(), n - 1);
        }
        write.transaction_pages_count += n;
        write.scratch_table.insert(page_number, handle);
        write.dirty_pages.insert(page_number);

        Ok(page)
    }

    /// Allocates a run of overflow pages sized to hold `byte_count` bytes.
    pub fn allocate_overflow_raw_page(&mut self, byte_count: u64) -> Result<Page> {
        self.require_open_write()?;
        if byte_count > u64::from(u32::MAX) - 1 {
            return Err(StorageError::InvalidAllocation { byte_count });
        }
        let n = self.env.pager.number_of_overflow_pages(byte_count);
        let mut page = self.allocate_page(n, None, None, true)?;
        let page_number = page.page_number();
        let mut header = page.header();
        header.flags = PageFlags::OVERFLOW;
        header.overflow_byte_count = byte_count as u32;
        page.set_header(&header);

        let handle = self.write.as_ref().unwrap().scratch_table[&page_number];
        self.env.scratch.write_page(&handle, &page)?;
        Ok(page)
    }

    /// Allocates `sizes.len()` independent page runs out of one contiguous
    /// scratch allocation. `total` defaults to the sum of `sizes` when
    /// omitted, and must equal that sum when given explicitly.
    pub fn allocate_pages(&mut self, sizes: &[u64], total: Option<u64>) -> Result<Vec<Page>> {
        self.require_open_write()?;
        if sizes.is_empty() {
            return Err(StorageError::invalid_operation(
                "allocate_pages requires at least one element size",
            ));
        }
        let computed_total: u64 = sizes.iter().sum();
        let total = total.unwrap_or(computed_total);
        if total != computed_total {
            return Err(StorageError::invalid_operation(format!(
                "allocate_pages: explicit total {total} does not match the sum of element sizes {computed_total}"
            )));
        }

        let mut grows_tail = false;
        let page_number_start = match self.env.free_space.try_allocate(total) {
            Some(p) => p,
            None => {
                grows_tail = true;
                self.local_next_page_number
            }
        };
        if let Some(quota) = self.env.pager.max_storage_size_pages() {
            if page_number_start.get() + total - 1 > quota {
                return Err(StorageError::QuotaExceeded {
                    requested: total,
                    at: page_number_start,
                    quota,
                });
            }
        }
        if grows_tail {
            self.local_next_page_number = self.local_next_page_number.offset(total);
        }

        let run_handle = self.env.scratch.allocate(total)?;
        let sub_handles = self.env.scratch.split_run(&run_handle, sizes);
        let page_size = self.env.pager.page_size();

        let mut pages = Vec::with_capacity(sizes.len());
        let mut offset = 0u64;
        for (&n, handle) in sizes.iter().zip(sub_handles.iter()) {
            let page_number = page_number_start.offset(offset);
            offset += n;
            let flags = if n > 1 {
                PageFlags::OVERFLOW
            } else {
                PageFlags::SINGLE
            };
            let mut page = Page::zeroed(n as usize * page_size, page_number);
            page.set_header(&PageHeader {
                page_number,
                overflow_byte_count: 0,
                flags,
                tree_flags: TreePageFlags::empty(),
            });
            self.env.scratch.write_page(handle, &page)?;
            pages.push(page);

            let write = self.write.as_mut().expect("checked by require_open_write");
            write.scratch_table.insert(page_number, *handle);
            write.dirty_pages.insert(page_number);
            if n > 1 {
                write.dirty_overflow_pages.insert(page_number.next(), n - 1);
            }
        }

        let write = self.write.as_mut().expect("checked by require_open_write");
        write.allocated_pages_in_transaction += sizes.len() as u64;
        write.overflow_pages_in_transaction += total - sizes.len() as u64;
        write.transaction_pages_count += total;

        Ok(pages)
    }

    /// Splits an overflow run this transaction already allocated into
    /// independent single pages.
    pub fn break_large_allocation_to_separate_pages(&mut self, p: PageNumber) -> Result<()> {
        self.require_open_write()?;
        let handle = {
            let write = self.write.as_ref().unwrap();
            *write.scratch_table.get(&p).ok_or_else(|| {
                StorageError::invalid_operation("break_large: page not allocated by this transaction")
            })?
        };
        if handle.run_length <= 1 {
            return Err(StorageError::invalid_operation(
                "break_large: page is not an overflow run",
            ));
        }
        let n = handle.run_length;
        let sub_handles = self.env.scratch.break_into_single_pages(&handle);

        for (i, h) in sub_handles.iter().enumerate() {
            let page_number = p.offset(i as u64);
            let mut page = self.env.scratch.read_page(h)?;
            page.set_header(&PageHeader {
                page_number,
                overflow_byte_count: 0,
                flags: PageFlags::SINGLE,
                tree_flags: TreePageFlags::empty(),
            });
            self.env.scratch.write_page(h, &page)?;

            let write = self.write.as_mut().unwrap();
            write.scratch_table.insert(page_number, *h);
            write.dirty_pages.insert(page_number);
        }

        let write = self.write.as_mut().unwrap();
        write.dirty_overflow_pages.remove(&p.next());
        write.allocated_pages_in_transaction += n - 1;
        write.overflow_pages_in_transaction -= n - 1;
        Ok(())
    }

    /// , deferred variant: actual freeing happens during `Commit`.
    pub fn free_page_on_commit(&mut self, p: PageNumber) -> Result<()> {
        self.require_open_write()?;
        self.write.as_mut().unwrap().pages_to_free_on_commit.push(p);
        Ok(())
    }

    /// , eager variant.
    pub fn free_page(&mut self, p: PageNumber) -> Result<()> {
        self.require_open_write()?;
        // Learn the page's current overflow extent (if any) before mutating
        // any state, from whichever tier currently holds it.
        let existing = self.get_page(p)?;
        let run_length = (existing.bytes().len() / self.env.pager.page_size()).max(1) as u64;

        self.env.free_space.free_page(p);

        let write = self.write.as_mut().expect("checked by require_open_write");
        write.freed_pages.insert(p);

        if let Some(handle) = write.scratch_table.remove(&p) {
            write.dirty_pages.remove(&p);
            write.allocated_pages_in_transaction =
                write.allocated_pages_in_transaction.saturating_sub(1);
            if handle.run_length > 1 {
                write.dirty_overflow_pages.remove(&p.next());
                write.overflow_pages_in_transaction = write
                    .overflow_pages_in_transaction
                    .saturating_sub(handle.run_length - 1);
            }
            write.transaction_pages_count =
                write.transaction_pages_count.saturating_sub(handle.run_length);
            write.unused_scratch.push(handle);
        } else if run_length > 1 {
            // A pre-existing, durable overflow page freed by this
            // transaction: preserve its tail extent so later bookkeeping
            // still knows how many physical pages it spans.
            write.dirty_overflow_pages.insert(p.next(), run_length - 1);
        }
        Ok(())
    }

    /// Flushes every dirty page to the journal and, if configured, fsyncs
    /// the data file before returning.
    pub fn commit(&mut self) -> Result<()> {
        match self.state {
            TxState::Disposed => return Err(StorageError::ObjectDisposed(self.id)),
            TxState::Committed | TxState::RolledBack => {
                return Err(StorageError::invalid_operation(
                    "commit called on a transaction that already finished",
                ))
            }
            TxState::Open => {}
        }

        if self.write.is_none() {
            self.state = TxState::Committed;
            return Ok(());
        }

        let to_free = std::mem::take(&mut self.write.as_mut().unwrap().pages_to_free_on_commit);
        for p in to_free {
            self.free_page(p)?;
        }

        let dirty_page_numbers: Vec<PageNumber> = {
            let write = self.write.as_ref().unwrap();
            write.dirty_pages.iter().copied().collect()
        };

        let mut entries = Vec::with_capacity(dirty_page_numbers.len());
        let mut hash_input = Vec::new();
        for page_number in dirty_page_numbers {
            let handle = self.write.as_ref().unwrap().scratch_table[&page_number];
            let page = self.env.scratch.read_page(&handle)?;
            hash_input.extend_from_slice(page.bytes());
            entries.push((page_number, page));
        }

        let (header_snapshot, total_dirty) = {
            let write = self.write.as_mut().unwrap();
            write.header.last_page_number =
                PageNumber::new(self.local_next_page_number.get().saturating_sub(1));
            write.header.next_page_number = self.local_next_page_number;
            write.header.page_count = write.dirty_pages.len() as u32;
            write.header.flags |= TxnHeaderFlags::COMMIT;
            write.header.content_hash = TransactionHeader::hash_payload(&hash_input);
            write.header.uncompressed_size = hash_input.len() as u64;
            write.header.compressed_size = hash_input.len() as u64;
            write.header.timestamp_unix_ms = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0);
            (
                write.header,
                write.allocated_pages_in_transaction + write.overflow_pages_in_transaction,
            )
        };

        if total_dirty > 0 || self.env.journal.has_lazy_transactions() {
            let written = self.env.journal.write_to_journal(&header_snapshot, entries)?;
            self.write.as_mut().unwrap().flushed_to_journal = true;
            tracing::info!(
                transaction_id = self.id.get(),
                pages_written = written,
                "transaction committed"
            );
        }

        if self.env.config.sync_on_commit_value() {
            // Post-durability: everything from here on must be treated as
            // catastrophic if it fails, because the journal write above
            // already returned successfully.
            if let Err(e) = self.env.pager.sync() {
                let message = format!(
                    "transaction {} durable in the journal but the data file failed to sync: {e}",
                    self.id
                );
                self.env.latch_catastrophic(message.clone());
                return Err(StorageError::catastrophic(message));
            }
        }

        self.finish_commit();
        self.state = TxState::Committed;
        Ok(())
    }

    fn finish_commit(&mut self) {
        let write = self.write.as_mut().unwrap();
        for (_, handle) in write.scratch_table.drain() {
            self.env.scratch.free(handle);
        }
        for handle in write.unused_scratch.drain(..) {
            self.env.scratch.free(handle);
        }
        self.env.scratch.free(write.header_slot);
        self.env
            .publish_commit(self.local_next_page_number, self.id);
    }

    /// Discards every page this transaction allocated or modified and
    /// returns its scratch slots to the pool.
    pub fn rollback(&mut self) -> Result<()> {
        match self.state {
            TxState::Disposed => return Err(StorageError::ObjectDisposed(self.id)),
            TxState::Committed | TxState::RolledBack => {
                return Err(StorageError::invalid_operation(
                    "rollback called on a transaction that already finished",
                ))
            }
            TxState::Open => {}
        }

        if let Some(write) = self.write.as_mut() {
            for (_, handle) in write.scratch_table.drain() {
                self.env.scratch.free(handle);
            }
            for handle in write.unused_scratch.drain(..) {
                self.env.scratch.free(handle);
            }
            self.env.scratch.free(write.header_slot);
            self.env.journal.update_cache_for_journal_snapshots();
            tracing::debug!(transaction_id = self.id.get(), "write transaction rolled back");
        }
        self.state = TxState::RolledBack;
        Ok(())
    }

    /// Idempotent; implicitly rolls back an `Open` write
    /// transaction first.
    pub fn dispose(&mut self) {
        if self.state == TxState::Disposed {
            return;
        }
        if self.state == TxState::Open {
            if let Err(e) = self.rollback() {
                tracing::error!(transaction_id = self.id.get(), error = %e, "implicit rollback on dispose failed");
            }
        }
        if let Some(write) = self.write.take() {
            self.env.return_write_containers((
                write.dirty_pages,
                write.scratch_table,
                write.dirty_overflow_pages,
            ));
            self.env.deregister_writer();
        } else if self.mode == TxMode::ReadOnly {
            self.env.deregister_reader(self.id);
        }
        self.state = TxState::Disposed;
    }
}

impl<F: VfsFile> Drop for LowLevelTransaction<F> {
    fn drop(&mut self) {
        self.dispose();
    }
}
