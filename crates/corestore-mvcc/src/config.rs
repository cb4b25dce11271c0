use corestore_types::DEFAULT_PAGE_SIZE;

/// Resolves the on-disk layout, quotas, and durability knobs for a
/// `StorageEnvironment`. Every value is explicit here; nothing is
/// read from an environment variable or other ambient global.
#[derive(Clone, Debug)]
pub struct StorageConfig {
    page_size: usize,
    max_storage_size_pages: Option<u64>,
    max_scratch_file_pages: u64,
    sync_on_commit: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_storage_size_pages: None,
            max_scratch_file_pages: 16 * 1024,
            sync_on_commit: true,
        }
    }
}

impl StorageConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the page size in bytes. Must be a power of two in `[512, 65536]`.
    #[must_use]
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Bounds the total number of pages the data file may ever hold.
    /// `AllocatePage` fails with `QuotaExceeded` once it would be crossed.
    #[must_use]
    pub fn max_storage_size_pages(mut self, pages: u64) -> Self {
        self.max_storage_size_pages = Some(pages);
        self
    }

    /// How many pages a single scratch file may grow to before the pool
    /// opens another.
    #[must_use]
    pub fn max_scratch_file_pages(mut self, pages: u64) -> Self {
        self.max_scratch_file_pages = pages;
        self
    }

    /// Whether `Commit` should fsync the data file's backing storage before
    /// returning. Disabling this trades durability for throughput.
    #[must_use]
    pub fn sync_on_commit(mut self, sync: bool) -> Self {
        self.sync_on_commit = sync;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if !self.page_size.is_power_of_two() || !(512..=65536).contains(&self.page_size) {
            return Err(format!(
                "page_size must be a power of two in [512, 65536], got {}",
                self.page_size
            ));
        }
        if self.max_scratch_file_pages == 0 {
            return Err("max_scratch_file_pages must be at least 1".to_string());
        }
        Ok(())
    }

    #[must_use]
    pub fn page_size_bytes(&self) -> usize {
        self.page_size
    }

    #[must_use]
    pub fn max_storage_size_pages_value(&self) -> Option<u64> {
        self.max_storage_size_pages
    }

    #[must_use]
    pub fn max_scratch_file_pages_value(&self) -> u64 {
        self.max_scratch_file_pages
    }

    #[must_use]
    pub fn sync_on_commit_value(&self) -> bool {
        self.sync_on_commit
    }
}
