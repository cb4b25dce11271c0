//! The transaction core: a single-writer, many-reader, copy-on-write page
//! store with MVCC snapshot isolation.
//!
//! [`StorageEnvironment`] is the process-wide handle; [`LowLevelTransaction`]
//! is the primitive page read/modify/allocate/free/commit/rollback engine;
//! [`Transaction`] layers a named-tree directory on top for callers that
//! want to address pages by name instead of raw page number.

mod active;
mod config;
mod environment;
mod low_level;
mod transaction;
mod write_pool;

pub use config::StorageConfig;
pub use environment::StorageEnvironment;
pub use low_level::{LowLevelTransaction, TxMode};
pub use transaction::Transaction;
pub use write_pool::WriteTransactionPool;
