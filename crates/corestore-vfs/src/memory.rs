use std::collections::HashMap;
use std::sync::Arc;

use corestore_error::{Result, StorageError};
use parking_lot::RwLock;

use crate::{Vfs, VfsFile};

/// An in-memory [`Vfs`] that never touches the filesystem.
///
/// Every test in this crate family runs against `MemoryVfs` by default;
/// it is cheap, deterministic, and makes no assumption about the host's
/// ability to `mmap` a real file.
#[derive(Clone, Default)]
pub struct MemoryVfs {
    files: Arc<RwLock<HashMap<String, MemoryFile>>>,
}

impl MemoryVfs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Vfs for MemoryVfs {
    type File = MemoryFile;

    fn open(&self, name: &str) -> Result<Self::File> {
        let mut files = self.files.write();
        let file = files.entry(name.to_string()).or_default().clone();
        Ok(file)
    }
}

/// A single file's bytes, reference-counted so cloning a handle shares state.
#[derive(Clone, Default)]
pub struct MemoryFile {
    buf: Arc<RwLock<Vec<u8>>>,
}

impl VfsFile for MemoryFile {
    fn len(&self) -> u64 {
        self.buf.read().len() as u64
    }

    fn grow_to(&self, len: u64) -> Result<()> {
        let mut buf = self.buf.write();
        if (len as usize) > buf.len() {
            buf.resize(len as usize, 0);
        }
        Ok(())
    }

    fn read_at(&self, offset: u64, out: &mut [u8]) -> Result<()> {
        let buf = self.buf.read();
        let start = offset as usize;
        let end = start + out.len();
        if end > buf.len() {
            return Err(StorageError::invalid_operation(format!(
                "read [{start}..{end}) out of bounds for in-memory file of length {}",
                buf.len()
            )));
        }
        out.copy_from_slice(&buf[start..end]);
        Ok(())
    }

    fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        let mut buf = self.buf.write();
        let start = offset as usize;
        let end = start + data.len();
        if end > buf.len() {
            return Err(StorageError::invalid_operation(format!(
                "write [{start}..{end}) out of bounds for in-memory file of length {}",
                buf.len()
            )));
        }
        buf[start..end].copy_from_slice(data);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_and_read_round_trip() {
        let vfs = MemoryVfs::new();
        let file = vfs.open("scratch-0").unwrap();
        file.grow_to(16).unwrap();
        file.write_at(0, b"hello-corestore!").unwrap();
        let mut out = [0u8; 16];
        file.read_at(0, &mut out).unwrap();
        assert_eq!(&out, b"hello-corestore!");
    }

    #[test]
    fn opening_the_same_name_twice_shares_state() {
        let vfs = MemoryVfs::new();
        let a = vfs.open("db").unwrap();
        a.grow_to(8).unwrap();
        a.write_at(0, b"12345678").unwrap();
        let b = vfs.open("db").unwrap();
        let mut out = [0u8; 8];
        b.read_at(0, &mut out).unwrap();
        assert_eq!(&out, b"12345678");
    }

    #[test]
    fn out_of_bounds_read_is_an_error_not_a_panic() {
        let vfs = MemoryVfs::new();
        let file = vfs.open("db").unwrap();
        file.grow_to(4).unwrap();
        let mut out = [0u8; 8];
        assert!(file.read_at(0, &mut out).is_err());
    }
}
