/// Keeps a read transaction's epoch pinned for as long as it is held,
/// preventing [`crate::ScratchBufferPool::free`]'s deferred reclamation from
/// running while this transaction's snapshot might still read the freed
/// slot.
///
/// Not `Send`/`Sync` (inherited from `crossbeam_epoch::Guard`): a pin is
/// tied to the thread that took it, matching this core's single-writer,
/// synchronous transaction model where a transaction is opened, used,
/// and disposed from one thread.
pub struct ReaderPin(crossbeam_epoch::Guard);

impl ReaderPin {
    pub(crate) fn new(guard: crossbeam_epoch::Guard) -> Self {
        Self(guard)
    }
}
