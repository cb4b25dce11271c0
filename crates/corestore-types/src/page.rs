use crate::flags::{PageFlags, TreePageFlags};
use crate::ids::PageNumber;

/// Byte layout of [`PageHeader`] as written at the front of every page:
/// page number (8), overflow byte count (4), page flags (1), tree
/// page flags (1).
pub const PAGE_HEADER_LEN: usize = 14;

/// Default page size. Must be a power of two between 512 B and 64 KiB.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// The fixed header every page carries at offset 0.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct PageHeader {
    pub page_number: PageNumber,
    pub overflow_byte_count: u32,
    pub flags: PageFlags,
    pub tree_flags: TreePageFlags,
}

impl PageHeader {
    #[must_use]
    pub fn encode(&self) -> [u8; PAGE_HEADER_LEN] {
        let mut buf = [0u8; PAGE_HEADER_LEN];
        buf[0..8].copy_from_slice(&self.page_number.get().to_le_bytes());
        buf[8..12].copy_from_slice(&self.overflow_byte_count.to_le_bytes());
        buf[12] = self.flags.bits();
        buf[13] = self.tree_flags.bits();
        buf
    }

    #[must_use]
    pub fn decode(buf: &[u8]) -> Self {
        debug_assert!(buf.len() >= PAGE_HEADER_LEN);
        let page_number = PageNumber::new(u64::from_le_bytes(buf[0..8].try_into().unwrap()));
        let overflow_byte_count = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        let flags = PageFlags::from_bits_truncate(buf[12]);
        let tree_flags = TreePageFlags::from_bits_truncate(buf[13]);
        Self {
            page_number,
            overflow_byte_count,
            flags,
            tree_flags,
        }
    }
}

/// An owned, fixed-size page buffer: header bytes followed by payload.
///
/// `Page` is the unit every read/write operation in the core traffics in. Its
/// contents above the header are opaque to this layer.
#[derive(Clone)]
pub struct Page {
    buf: Box<[u8]>,
}

impl Page {
    /// Allocates a zeroed page of `page_size` bytes stamped with `page_number`
    /// and no flags set.
    #[must_use]
    pub fn zeroed(page_size: usize, page_number: PageNumber) -> Self {
        let mut page = Self {
            buf: vec![0u8; page_size].into_boxed_slice(),
        };
        page.set_header(&PageHeader {
            page_number,
            ..PageHeader::default()
        });
        page
    }

    /// Wraps an already-populated buffer, e.g. one read back from a mapped
    /// file or scratch slot.
    #[must_use]
    pub fn from_buf(buf: Box<[u8]>) -> Self {
        Self { buf }
    }

    #[must_use]
    pub fn page_size(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn header(&self) -> PageHeader {
        PageHeader::decode(&self.buf)
    }

    pub fn set_header(&mut self, header: &PageHeader) {
        self.buf[0..PAGE_HEADER_LEN].copy_from_slice(&header.encode());
    }

    #[must_use]
    pub fn page_number(&self) -> PageNumber {
        self.header().page_number
    }

    /// Full page buffer, header included.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    /// Bytes after the header: the part callers outside this layer see.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.buf[PAGE_HEADER_LEN..]
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.buf[PAGE_HEADER_LEN..]
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("header", &self.header())
            .field("page_size", &self.page_size())
            .finish()
    }
}
