use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use corestore_error::{Result, StorageError};
use corestore_freespace::FreeSpaceHandler;
use corestore_journal::Journal;
use corestore_pager::Pager;
use corestore_scratch::ScratchBufferPool;
use corestore_types::{PageNumber, TransactionId};
use corestore_vfs::VfsFile;
use parking_lot::{Mutex, RwLock};

use crate::active::ActiveTransactions;
use crate::config::StorageConfig;
use crate::low_level::{LowLevelTransaction, TxMode};
use crate::write_pool::WriteTransactionPool;

pub(crate) struct EnvState {
    pub(crate) next_page_number: PageNumber,
    pub(crate) root: PageNumber,
}

/// The process-wide handle for one open database directory.
///
/// Owns the transaction id allocator, the active-transaction registry, the
/// single `WriteTransactionPool`, and the catastrophic-failure latch every
/// transaction entry point checks first.
pub struct StorageEnvironment<F: VfsFile> {
    pub(crate) pager: Pager<F>,
    pub(crate) scratch: Arc<ScratchBufferPool>,
    pub(crate) journal: Arc<Journal>,
    pub(crate) free_space: Arc<dyn FreeSpaceHandler>,
    pub(crate) config: StorageConfig,
    next_transaction_id: AtomicU64,
    writer_active: AtomicBool,
    state: RwLock<EnvState>,
    active: Mutex<ActiveTransactions>,
    write_pool: Mutex<WriteTransactionPool>,
    catastrophic: RwLock<Option<String>>,
    on_commit_hooks: Mutex<Vec<Box<dyn Fn(TransactionId) + Send + Sync>>>,
}

impl<F: VfsFile> StorageEnvironment<F> {
    /// Opens an environment over an already-grown data file. `page_size`
    /// and quotas come from `config`; `data_file` is expected to already be
    /// sized to a multiple of the configured page size (page 0 is the
    /// environment's reserved root header page).
    pub fn open(
        config: StorageConfig,
        data_file: F,
        free_space: Arc<dyn FreeSpaceHandler>,
    ) -> Result<Arc<Self>> {
        config
            .validate()
            .map_err(StorageError::invalid_operation)?;
        let pager = Pager::new(
            data_file,
            config.page_size_bytes(),
            config.max_storage_size_pages_value(),
        );
        let scratch = Arc::new(ScratchBufferPool::new(
            config.page_size_bytes(),
            config.max_scratch_file_pages_value(),
        ));
        Ok(Arc::new(Self {
            pager,
            scratch,
            journal: Arc::new(Journal::new()),
            free_space,
            config,
            next_transaction_id: AtomicU64::new(1),
            writer_active: AtomicBool::new(false),
            state: RwLock::new(EnvState {
                next_page_number: PageNumber::new(1),
                root: PageNumber::ROOT,
            }),
            active: Mutex::new(ActiveTransactions::default()),
            write_pool: Mutex::new(WriteTransactionPool::new()),
            catastrophic: RwLock::new(None),
            on_commit_hooks: Mutex::new(Vec::new()),
        }))
    }

    #[must_use]
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Registers a callback invoked (with the committing transaction's id)
    /// after every successful commit.
    pub fn on_commit(&self, hook: impl Fn(TransactionId) + Send + Sync + 'static) {
        self.on_commit_hooks.lock().push(Box::new(hook));
    }

    #[must_use]
    pub fn oldest_active_transaction(&self) -> Option<TransactionId> {
        self.active.lock().oldest_active()
    }

    #[must_use]
    pub fn active_reader_count(&self) -> usize {
        self.active.lock().reader_count()
    }

    #[must_use]
    pub fn is_catastrophically_failed(&self) -> bool {
        self.catastrophic.read().is_some()
    }

    pub(crate) fn check_not_catastrophic(&self) -> Result<()> {
        if let Some(msg) = self.catastrophic.read().clone() {
            return Err(StorageError::catastrophic(msg));
        }
        Ok(())
    }

    pub(crate) fn latch_catastrophic(&self, message: String) {
        tracing::error!(message = %message, "environment latched into catastrophic failure");
        *self.catastrophic.write() = Some(message);
    }

    pub(crate) fn next_transaction_id(&self) -> TransactionId {
        TransactionId::new(self.next_transaction_id.fetch_add(1, Ordering::SeqCst))
    }

    pub(crate) fn current_state(&self) -> (PageNumber, PageNumber) {
        let s = self.state.read();
        (s.next_page_number, s.root)
    }

    pub(crate) fn try_acquire_writer(&self) -> Result<()> {
        self.writer_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| {
                StorageError::invalid_operation(
                    "a write transaction is already active on this environment",
                )
            })?;
        Ok(())
    }

    pub(crate) fn register_reader(&self, id: TransactionId) {
        self.active.lock().register_reader(id);
    }

    pub(crate) fn register_writer(&self, id: TransactionId) {
        self.active.lock().set_writer(id);
    }

    pub(crate) fn deregister_reader(&self, id: TransactionId) {
        self.active.lock().deregister_reader(id);
    }

    pub(crate) fn deregister_writer(&self) {
        self.active.lock().clear_writer();
        self.writer_active.store(false, Ordering::SeqCst);
    }

    pub(crate) fn borrow_write_containers(&self) -> crate::write_pool::BorrowedContainers {
        self.write_pool.lock().borrow()
    }

    pub(crate) fn return_write_containers(&self, containers: crate::write_pool::BorrowedContainers) {
        self.write_pool.lock().reset_and_return(containers);
    }

    #[must_use]
    pub fn write_pool_stats(&self) -> (u64, u64) {
        let pool = self.write_pool.lock();
        (pool.borrows(), pool.resets())
    }

    /// Publishes a committed write transaction's advanced `next_page_number`
    /// and invokes registered commit hooks.
    pub(crate) fn publish_commit(&self, next_page_number: PageNumber, committed_id: TransactionId) {
        {
            let mut s = self.state.write();
            s.next_page_number = next_page_number;
        }
        for hook in self.on_commit_hooks.lock().iter() {
            hook(committed_id);
        }
    }

    /// Opens a new transaction. Read transactions may always be
    /// opened concurrently with the (at most one) active write transaction;
    /// attempting to open a second write transaction fails.
    pub fn begin(self: &Arc<Self>, mode: TxMode) -> Result<LowLevelTransaction<F>> {
        self.check_not_catastrophic()?;
        LowLevelTransaction::new(Arc::clone(self), mode)
    }

    /// Opens the named-tree wrapper over a fresh low-level
    /// transaction.
    pub fn begin_transaction(self: &Arc<Self>, mode: TxMode) -> Result<crate::transaction::Transaction<F>> {
        self.check_not_catastrophic()?;
        crate::transaction::Transaction::new(Arc::clone(self), mode)
    }
}
