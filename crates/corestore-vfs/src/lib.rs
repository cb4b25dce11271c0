//! The virtual file system boundary consumed by the pager and scratch pool.
//!
//! `Vfs` is the only place this crate family touches an actual file
//! descriptor. Two implementations are provided: [`FileVfs`], which maps a
//! real file on disk, and [`MemoryVfs`], an in-memory stand-in used by the
//! test suite of every crate built on top of it.

mod file;
mod memory;

use corestore_error::Result;

pub use file::{FileVfs, MappedFile};
pub use memory::{MemoryFile, MemoryVfs};

/// A growable, byte-addressable mapped region backing either the data file
/// or a scratch file.
pub trait VfsFile: Send + Sync {
    /// Current length in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Grows the file to at least `len` bytes, zero-filling the extension.
    /// No-op if `len <= self.len()`.
    fn grow_to(&self, len: u64) -> Result<()>;

    /// Reads exactly `buf.len()` bytes starting at `offset`.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Writes `buf` at `offset`. The file must already be large enough;
    /// callers grow it first via [`VfsFile::grow_to`].
    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()>;

    /// Flushes to durable storage. A no-op for the in-memory backend.
    fn sync(&self) -> Result<()>;
}

/// Opens [`VfsFile`]s by path (or by a purely-in-memory name).
pub trait Vfs: Send + Sync {
    type File: VfsFile;

    fn open(&self, name: &str) -> Result<Self::File>;
}
