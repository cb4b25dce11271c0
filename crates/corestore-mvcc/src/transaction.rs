use std::collections::HashMap;
use std::sync::Arc;

use corestore_error::{Result, StorageError};
use corestore_types::{Page, PageNumber};
use corestore_vfs::VfsFile;

use crate::environment::StorageEnvironment;
use crate::low_level::{LowLevelTransaction, TxMode};

/// The public, named-tree transaction handle built on top of
/// [`LowLevelTransaction`].
///
/// Layers a name-to-root-page directory over the same three-tier page
/// lookup this crate's `LowLevelTransaction` already implements.
pub struct Transaction<F: VfsFile> {
    inner: LowLevelTransaction<F>,
    tree_roots: HashMap<String, PageNumber>,
    prepare_hooks: Vec<Box<dyn FnMut(&mut LowLevelTransaction<F>) -> Result<()> + Send>>,
}

impl<F: VfsFile> Transaction<F> {
    pub(crate) fn new(env: Arc<StorageEnvironment<F>>, mode: TxMode) -> Result<Self> {
        let inner = LowLevelTransaction::new(env, mode)?;
        Ok(Self {
            inner,
            tree_roots: HashMap::new(),
            prepare_hooks: Vec::new(),
        })
    }

    #[must_use]
    pub fn low_level(&self) -> &LowLevelTransaction<F> {
        &self.inner
    }

    pub fn low_level_mut(&mut self) -> &mut LowLevelTransaction<F> {
        &mut self.inner
    }

    /// Registers the root page for a named tree that already exists in this
    /// transaction's view.
    pub fn bind_tree(&mut self, name: impl Into<String>, root: PageNumber) {
        self.tree_roots.insert(name.into(), root);
    }

    /// Looks up a named tree's root page, reading it through the usual
    /// three-tier lookup so it reflects any modification already made in
    /// this transaction.
    pub fn read_tree(&self, name: &str) -> Result<(PageNumber, Page)> {
        let root = *self
            .tree_roots
            .get(name)
            .ok_or_else(|| StorageError::invalid_operation(format!("no such tree: {name}")))?;
        let page = self.inner.get_page(root)?;
        Ok((root, page))
    }

    /// Allocates a fresh root page and binds `name` to it.
    pub fn create_tree(&mut self, name: impl Into<String>) -> Result<PageNumber> {
        let name = name.into();
        if self.tree_roots.contains_key(&name) {
            return Err(StorageError::invalid_operation(format!(
                "tree already exists: {name}"
            )));
        }
        let page = self.inner.allocate_page(1, None, None, true)?;
        let root = page.page_number();
        self.tree_roots.insert(name, root);
        Ok(root)
    }

    /// Frees a named tree's root page and forgets its name. Does not walk
    /// or free the tree's other pages — that is a higher layer's job; this
    /// core only owns the page-allocation primitives.
    pub fn delete_tree(&mut self, name: &str) -> Result<()> {
        let root = self
            .tree_roots
            .remove(name)
            .ok_or_else(|| StorageError::invalid_operation(format!("no such tree: {name}")))?;
        self.inner.free_page_on_commit(root)
    }

    pub fn rename_tree(&mut self, old: &str, new: impl Into<String>) -> Result<()> {
        let root = self
            .tree_roots
            .remove(old)
            .ok_or_else(|| StorageError::invalid_operation(format!("no such tree: {old}")))?;
        self.tree_roots.insert(new.into(), root);
        Ok(())
    }

    /// Registers a callback run during `commit`, before the transaction's
    /// pages are handed to the journal, that may still fail the commit.
    pub fn on_prepare_commit(
        &mut self,
        hook: impl FnMut(&mut LowLevelTransaction<F>) -> Result<()> + Send + 'static,
    ) {
        self.prepare_hooks.push(Box::new(hook));
    }

    pub fn commit(&mut self) -> Result<()> {
        for hook in &mut self.prepare_hooks {
            hook(&mut self.inner)?;
        }
        self.inner.commit()
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.inner.rollback()
    }
}
