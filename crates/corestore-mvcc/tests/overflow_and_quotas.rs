use std::sync::Arc;

use corestore_error::StorageError;
use corestore_freespace::SimpleFreeSpaceHandler;
use corestore_mvcc::{StorageConfig, StorageEnvironment, TxMode};
use corestore_vfs::{MemoryFile, MemoryVfs, Vfs, VfsFile};

fn test_env_with_quota(quota: Option<u64>) -> Arc<StorageEnvironment<MemoryFile>> {
    let vfs = MemoryVfs::new();
    let file = vfs.open("data.db").unwrap();
    file.grow_to(4096 * 64).unwrap();
    let mut config = StorageConfig::new();
    if let Some(q) = quota {
        config = config.max_storage_size_pages(q);
    }
    StorageEnvironment::open(config, file, Arc::new(SimpleFreeSpaceHandler::new())).unwrap()
}

#[test]
fn an_overflow_run_survives_a_commit_and_reads_back_as_one_page() {
    let env = test_env_with_quota(None);

    let mut wtx = env.begin(TxMode::ReadWrite).unwrap();
    let page = wtx.allocate_overflow_raw_page(4096 * 3 + 10).unwrap();
    let page_number = page.page_number();
    wtx.commit().unwrap();

    let rtx = env.begin(TxMode::ReadOnly).unwrap();
    let read_back = rtx.get_page(page_number).unwrap();
    assert_eq!(read_back.header().overflow_byte_count, 4096 * 3 + 10);
    assert!(read_back.header().flags.contains(corestore_types::PageFlags::OVERFLOW));
}

#[test]
fn breaking_an_overflow_run_leaves_independently_addressable_pages() {
    let env = test_env_with_quota(None);

    let mut wtx = env.begin(TxMode::ReadWrite).unwrap();
    let page = wtx.allocate_page(3, None, None, true).unwrap();
    let base = page.page_number();
    wtx.break_large_allocation_to_separate_pages(base).unwrap();

    for i in 0..3u64 {
        let p = wtx.get_page(base.offset(i)).unwrap();
        assert_eq!(p.page_number(), base.offset(i));
        assert!(!p.header().flags.contains(corestore_types::PageFlags::OVERFLOW));
    }
}

#[test]
fn allocation_past_the_configured_quota_is_rejected_and_leaves_state_unharmed() {
    let env = test_env_with_quota(Some(4));

    let mut wtx = env.begin(TxMode::ReadWrite).unwrap();
    wtx.allocate_page(1, None, None, true).unwrap();
    wtx.allocate_page(1, None, None, true).unwrap();
    wtx.allocate_page(1, None, None, true).unwrap();
    let err = wtx.allocate_page(2, None, None, true).unwrap_err();
    assert!(matches!(err, StorageError::QuotaExceeded { .. }));

    // The transaction itself is still usable after a rejected allocation.
    wtx.allocate_page(1, None, None, true).unwrap();
    wtx.commit().unwrap();
}

#[test]
fn five_single_page_allocations_fit_a_five_page_quota_and_the_sixth_does_not() {
    let env = test_env_with_quota(Some(5));
    let mut wtx = env.begin(TxMode::ReadWrite).unwrap();
    for expected in 1..=5u64 {
        let page = wtx.allocate_page(1, None, None, true).unwrap();
        assert_eq!(page.page_number(), corestore_types::PageNumber::new(expected));
    }
    let err = wtx.allocate_page(1, None, None, true).unwrap_err();
    assert!(matches!(err, StorageError::QuotaExceeded { .. }));
}

#[test]
fn freeing_a_page_makes_it_available_to_a_later_allocation() {
    let env = test_env_with_quota(None);

    let mut w1 = env.begin(TxMode::ReadWrite).unwrap();
    let page = w1.allocate_page(1, None, None, true).unwrap();
    let freed_number = page.page_number();
    w1.commit().unwrap();

    let mut w2 = env.begin(TxMode::ReadWrite).unwrap();
    w2.free_page(freed_number).unwrap();
    w2.commit().unwrap();

    let mut w3 = env.begin(TxMode::ReadWrite).unwrap();
    let reused = w3.allocate_page(1, None, None, true).unwrap();
    assert_eq!(reused.page_number(), freed_number);
}

#[test]
fn allocate_pages_rejects_an_explicit_total_that_does_not_match_the_sizes() {
    let env = test_env_with_quota(None);
    let mut wtx = env.begin(TxMode::ReadWrite).unwrap();
    let err = wtx.allocate_pages(&[1, 2, 4], Some(100)).unwrap_err();
    assert!(matches!(err, StorageError::InvalidOperation(_)));
}

#[test]
fn allocate_pages_hands_back_independently_sized_pages_in_one_run() {
    let env = test_env_with_quota(None);
    let mut wtx = env.begin(TxMode::ReadWrite).unwrap();
    let pages = wtx.allocate_pages(&[2, 1, 3], None).unwrap();
    assert_eq!(pages.len(), 3);
    assert_eq!(pages[0].page_size(), 4096 * 2);
    assert_eq!(pages[1].page_size(), 4096);
    assert_eq!(pages[2].page_size(), 4096 * 3);
    wtx.commit().unwrap();
}
