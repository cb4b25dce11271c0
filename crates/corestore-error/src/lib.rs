//! The error taxonomy shared by every `corestore-*` crate.
//!
//! Errors are split into two classes by [`StorageError::is_fatal`]:
//! non-fatal errors leave the environment usable (the failing transaction
//! must still be rolled back), while fatal errors latch
//! [`StorageError::CatastrophicFailure`]-style state on the environment and
//! require a process restart before further transactions can proceed.

use corestore_types::{PageNumber, TransactionId};
use thiserror::Error;

pub type Result<T, E = StorageError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum StorageError {
    /// Operation attempted on a transaction that already called `Dispose`.
    #[error("operation attempted on disposed transaction {0}")]
    ObjectDisposed(TransactionId),

    /// A request was well-formed but not valid in the current state (e.g.
    /// commit after rollback, write on a read transaction).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Allocating the requested page(s) would exceed the configured storage
    /// quota.
    #[error("allocation of {requested} page(s) at/after {at} would exceed the {quota}-page quota")]
    QuotaExceeded {
        requested: u64,
        at: PageNumber,
        quota: u64,
    },

    /// The scratch buffer pool could not grow to satisfy an allocation
    /// within its configured bounds.
    #[error("scratch buffer pool exhausted while allocating {requested} page(s)")]
    ScratchBufferFull { requested: u64 },

    /// An overflow allocation's byte count cannot be represented.
    #[error("invalid overflow allocation: {byte_count} bytes does not fit in the addressable range")]
    InvalidAllocation { byte_count: u64 },

    /// A write transaction's id was not strictly greater than every id
    /// already present in a journal page-translation table. Detected before
    /// any write; always fatal.
    #[error("duplicate or out-of-order transaction id {attempted}, already observed {observed}")]
    DuplicateTransactionId {
        attempted: TransactionId,
        observed: TransactionId,
    },

    /// An unrecoverable failure occurred after a transaction's journal write
    /// had already returned successfully, or data corruption was detected.
    /// The environment must be treated as unusable until restarted.
    #[error("catastrophic failure, environment must be restarted: {0}")]
    CatastrophicFailure(String),

    /// Wraps the underlying VFS I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Whether this error leaves the environment permanently unusable until
    /// restart.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DuplicateTransactionId { .. } | Self::CatastrophicFailure(_)
        )
    }

    #[must_use]
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    #[must_use]
    pub fn catastrophic(msg: impl Into<String>) -> Self {
        Self::CatastrophicFailure(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_transaction_id_and_catastrophic_failure_are_fatal() {
        let dup = StorageError::DuplicateTransactionId {
            attempted: TransactionId::new(5),
            observed: TransactionId::new(9),
        };
        let cat = StorageError::catastrophic("journal write failed after durability point");
        assert!(dup.is_fatal());
        assert!(cat.is_fatal());
    }

    #[test]
    fn quota_and_scratch_full_are_not_fatal() {
        let quota = StorageError::QuotaExceeded {
            requested: 1,
            at: PageNumber::new(6),
            quota: 5,
        };
        let scratch = StorageError::ScratchBufferFull { requested: 4 };
        assert!(!quota.is_fatal());
        assert!(!scratch.is_fatal());
    }
}
