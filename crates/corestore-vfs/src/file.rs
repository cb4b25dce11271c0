use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use corestore_error::{Result, StorageError};
use memmap2::MmapMut;
use parking_lot::RwLock;

use crate::{Vfs, VfsFile};

/// Opens real files under a base directory and maps them with `memmap2`.
///
/// A mapping is remapped whenever the file is grown, since an `mmap`
/// region's length is fixed at creation time.
pub struct FileVfs {
    base_dir: PathBuf,
}

impl FileVfs {
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

impl Vfs for FileVfs {
    type File = MappedFile;

    fn open(&self, name: &str) -> Result<Self::File> {
        let path = self.base_dir.join(name);
        MappedFile::open(&path)
    }
}

/// A single real file, memory-mapped for read/write access.
pub struct MappedFile {
    file: File,
    map: RwLock<Option<MmapMut>>,
}

impl MappedFile {
    fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let len = file.metadata()?.len();
        let map = if len == 0 {
            None
        } else {
            // SAFETY: `file` is exclusively owned by this `MappedFile` for its
            // lifetime; nothing else in this process mutates it concurrently
            // outside the `&self` methods below, which serialize through `map`.
            Some(unsafe { MmapMut::map_mut(&file)? })
        };
        Ok(Self {
            file,
            map: RwLock::new(map),
        })
    }

    fn remap(&self) -> Result<()> {
        // SAFETY: see `open`; we hold the write lock on `map` for the
        // duration of the remap so no reader observes a torn mapping.
        let new_map = unsafe { MmapMut::map_mut(&self.file)? };
        *self.map.write() = Some(new_map);
        Ok(())
    }
}

impl VfsFile for MappedFile {
    fn len(&self) -> u64 {
        self.map
            .read()
            .as_ref()
            .map_or(0, |m| m.len() as u64)
    }

    fn grow_to(&self, len: u64) -> Result<()> {
        if len <= self.len() {
            return Ok(());
        }
        self.file.set_len(len)?;
        self.remap()
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let guard = self.map.read();
        let map = guard.as_ref().ok_or_else(|| {
            StorageError::invalid_operation("read from an empty, never-grown mapped file")
        })?;
        let start = offset as usize;
        let end = start + buf.len();
        if end > map.len() {
            return Err(StorageError::invalid_operation(format!(
                "read [{start}..{end}) out of bounds for mapped file of length {}",
                map.len()
            )));
        }
        buf.copy_from_slice(&map[start..end]);
        Ok(())
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        let mut guard = self.map.write();
        let map = guard.as_mut().ok_or_else(|| {
            StorageError::invalid_operation("write to an empty, never-grown mapped file")
        })?;
        let start = offset as usize;
        let end = start + buf.len();
        if end > map.len() {
            return Err(StorageError::invalid_operation(format!(
                "write [{start}..{end}) out of bounds for mapped file of length {}",
                map.len()
            )));
        }
        map[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        if let Some(map) = self.map.read().as_ref() {
            map.flush()?;
        }
        Ok(())
    }
}
