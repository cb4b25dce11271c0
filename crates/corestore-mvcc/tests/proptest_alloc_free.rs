use std::collections::HashSet;
use std::sync::Arc;

use corestore_freespace::SimpleFreeSpaceHandler;
use corestore_mvcc::{StorageConfig, StorageEnvironment, TxMode};
use corestore_vfs::{MemoryFile, MemoryVfs, Vfs, VfsFile};
use proptest::prelude::*;

fn test_env() -> Arc<StorageEnvironment<MemoryFile>> {
    let vfs = MemoryVfs::new();
    let file = vfs.open("data.db").unwrap();
    file.grow_to(4096 * 256).unwrap();
    StorageEnvironment::open(StorageConfig::new(), file, Arc::new(SimpleFreeSpaceHandler::new())).unwrap()
}

proptest! {
    #[test]
    fn every_committed_allocation_is_independently_addressable(runs in prop::collection::vec(1u64..4, 1..12)) {
        let env = test_env();
        let mut wtx = env.begin(TxMode::ReadWrite).unwrap();
        let mut numbers = HashSet::new();
        for &n in &runs {
            let page = wtx.allocate_page(n, None, None, true).unwrap();
            prop_assert!(numbers.insert(page.page_number()));
        }
        wtx.commit().unwrap();

        let rtx = env.begin(TxMode::ReadOnly).unwrap();
        for p in numbers {
            prop_assert!(rtx.get_page(p).is_ok());
        }
    }

    #[test]
    fn a_page_written_then_rolled_back_is_never_observed(pattern in prop::collection::vec(any::<u8>(), 1..4000)) {
        let env = test_env();

        let mut setup = env.begin(TxMode::ReadWrite).unwrap();
        let mut page = setup.allocate_page(1, None, None, true).unwrap();
        let page_number = page.page_number();
        page.payload_mut()[..pattern.len()].copy_from_slice(&pattern);
        setup.write_page(page_number, &page).unwrap();
        setup.commit().unwrap();

        let mut wtx = env.begin(TxMode::ReadWrite).unwrap();
        let mut modified = wtx.modify_page(page_number).unwrap();
        modified.payload_mut().fill(0xEE);
        wtx.write_page(page_number, &modified).unwrap();
        wtx.rollback().unwrap();

        let rtx = env.begin(TxMode::ReadOnly).unwrap();
        let read_back = rtx.get_page(page_number).unwrap();
        prop_assert_eq!(&read_back.payload()[..pattern.len()], pattern.as_slice());
    }

    #[test]
    fn freeing_then_reallocating_never_loses_or_duplicates_a_page_number(
        count in 1usize..8,
    ) {
        let env = test_env();
        let mut allocated = Vec::new();

        let mut wtx = env.begin(TxMode::ReadWrite).unwrap();
        for _ in 0..count {
            allocated.push(wtx.allocate_page(1, None, None, true).unwrap().page_number());
        }
        wtx.commit().unwrap();

        let mut wtx2 = env.begin(TxMode::ReadWrite).unwrap();
        for &p in &allocated {
            wtx2.free_page(p).unwrap();
        }
        wtx2.commit().unwrap();

        let mut wtx3 = env.begin(TxMode::ReadWrite).unwrap();
        let mut reused = HashSet::new();
        for _ in 0..count {
            reused.insert(wtx3.allocate_page(1, None, None, true).unwrap().page_number());
        }
        prop_assert_eq!(reused.len(), count);
        prop_assert_eq!(reused, allocated.into_iter().collect());
    }
}
