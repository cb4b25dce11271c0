//! Public facade over the copy-on-write, single-writer/many-reader page
//! store core.
//!
//! Most callers only need [`open_in_memory`] or [`open_on_disk`] plus the
//! re-exported [`Transaction`]/[`LowLevelTransaction`] types; the
//! `corestore-*` crates underneath stay reachable for callers that want to
//! depend on a narrower surface (e.g. embedding just [`corestore_vfs`]).

use std::sync::Arc;

use corestore_error::Result;
use corestore_freespace::SimpleFreeSpaceHandler;
use corestore_vfs::{FileVfs, MappedFile, MemoryFile, MemoryVfs, Vfs};

pub use corestore_error::StorageError;
pub use corestore_freespace::FreeSpaceHandler;
pub use corestore_mvcc::{LowLevelTransaction, StorageConfig, StorageEnvironment, Transaction, TxMode};
pub use corestore_types::{
    Page, PageFlags, PageHeader, PageNumber, ScratchFileId, TransactionHeader, TransactionId,
    TreePageFlags,
};
pub use corestore_vfs::{Vfs as VfsOpen, VfsFile};

/// Opens a purely in-memory environment backed by [`MemoryVfs`], useful for
/// tests and scratch workloads that don't need durability across process
/// restarts.
pub fn open_in_memory(config: StorageConfig, file_name: &str) -> Result<Arc<StorageEnvironment<MemoryFile>>> {
    let vfs = MemoryVfs::new();
    let data_file = vfs.open(file_name)?;
    StorageEnvironment::open(config, data_file, Arc::new(SimpleFreeSpaceHandler::new()))
}

/// Opens an environment backed by a real, memory-mapped file under
/// `base_dir`.
pub fn open_on_disk(
    config: StorageConfig,
    base_dir: impl Into<std::path::PathBuf>,
    file_name: &str,
) -> Result<Arc<StorageEnvironment<MappedFile>>> {
    let vfs = FileVfs::new(base_dir);
    let data_file = vfs.open(file_name)?;
    StorageEnvironment::open(config, data_file, Arc::new(SimpleFreeSpaceHandler::new()))
}
