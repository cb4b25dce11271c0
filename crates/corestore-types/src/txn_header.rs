use xxhash_rust::xxh3::xxh3_64;

use crate::flags::TxnHeaderFlags;
use crate::ids::{PageNumber, TransactionId};

/// Marker written at the front of every `TransactionHeader`, distinguishing it
/// from an ordinary page in a disk dump.
pub const TRANSACTION_HEADER_MARKER: u64 = 0x434F_5245_5354_4F52; // "CORESTOR"

/// The page prepended to every committed transaction in the journal.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TransactionHeader {
    pub marker: u64,
    pub transaction_id: TransactionId,
    pub previous_root: PageNumber,
    pub new_root: PageNumber,
    pub next_page_number: PageNumber,
    pub last_page_number: PageNumber,
    pub page_count: u32,
    pub uncompressed_size: u64,
    pub compressed_size: u64,
    pub content_hash: u64,
    pub timestamp_unix_ms: u64,
    pub flags: TxnHeaderFlags,
}

impl TransactionHeader {
    #[must_use]
    pub fn new(transaction_id: TransactionId, next_page_number: PageNumber) -> Self {
        Self {
            marker: TRANSACTION_HEADER_MARKER,
            transaction_id,
            previous_root: PageNumber::ROOT,
            new_root: PageNumber::ROOT,
            next_page_number,
            last_page_number: PageNumber::ROOT,
            page_count: 0,
            uncompressed_size: 0,
            compressed_size: 0,
            content_hash: 0,
            timestamp_unix_ms: 0,
            flags: TxnHeaderFlags::empty(),
        }
    }

    /// Computes the 64-bit content hash of `payload` used to populate
    /// [`TransactionHeader::content_hash`] before a journal write.
    #[must_use]
    pub fn hash_payload(payload: &[u8]) -> u64 {
        xxh3_64(payload)
    }

    #[must_use]
    pub fn is_commit(&self) -> bool {
        self.flags.contains(TxnHeaderFlags::COMMIT)
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 * 9 + 4 + 1);
        buf.extend_from_slice(&self.marker.to_le_bytes());
        buf.extend_from_slice(&self.transaction_id.get().to_le_bytes());
        buf.extend_from_slice(&self.previous_root.get().to_le_bytes());
        buf.extend_from_slice(&self.new_root.get().to_le_bytes());
        buf.extend_from_slice(&self.next_page_number.get().to_le_bytes());
        buf.extend_from_slice(&self.last_page_number.get().to_le_bytes());
        buf.extend_from_slice(&self.page_count.to_le_bytes());
        buf.extend_from_slice(&self.uncompressed_size.to_le_bytes());
        buf.extend_from_slice(&self.compressed_size.to_le_bytes());
        buf.extend_from_slice(&self.content_hash.to_le_bytes());
        buf.extend_from_slice(&self.timestamp_unix_ms.to_le_bytes());
        buf.push(self.flags.bits());
        buf
    }

    #[must_use]
    pub fn decode(buf: &[u8]) -> Self {
        let mut at = 0usize;
        let mut take8 = || {
            let v = u64::from_le_bytes(buf[at..at + 8].try_into().unwrap());
            at += 8;
            v
        };
        let marker = take8();
        let transaction_id = TransactionId::new(take8());
        let previous_root = PageNumber::new(take8());
        let new_root = PageNumber::new(take8());
        let next_page_number = PageNumber::new(take8());
        let last_page_number = PageNumber::new(take8());
        let page_count = u32::from_le_bytes(buf[at..at + 4].try_into().unwrap());
        at += 4;
        let mut take8b = || {
            let v = u64::from_le_bytes(buf[at..at + 8].try_into().unwrap());
            at += 8;
            v
        };
        let uncompressed_size = take8b();
        let compressed_size = take8b();
        let content_hash = take8b();
        let timestamp_unix_ms = take8b();
        let flags = TxnHeaderFlags::from_bits_truncate(buf[at]);
        Self {
            marker,
            transaction_id,
            previous_root,
            new_root,
            next_page_number,
            last_page_number,
            page_count,
            uncompressed_size,
            compressed_size,
            content_hash,
            timestamp_unix_ms,
            flags,
        }
    }
}
