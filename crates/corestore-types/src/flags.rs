use bitflags::bitflags;

bitflags! {
    /// On-disk page header flags.
    ///
    /// `Overflow` pages are a contiguous run of N physical pages addressed by
    /// their head page number; everything above this layer treats the run as
    /// one logical page.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Hash)]
    pub struct PageFlags: u8 {
        const SINGLE   = 0b0000_0001;
        const OVERFLOW = 0b0000_0010;
    }
}

bitflags! {
    /// Domain-specific page-content flags.
    ///
    /// Opaque to the core: carried through allocation and copy-on-write, never
    /// interpreted. Higher layers (B-trees etc.) assign meaning to these bits.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Hash)]
    pub struct TreePageFlags: u8 {
        const BRANCH = 0b0000_0001;
        const LEAF   = 0b0000_0010;
    }
}

bitflags! {
    /// Transaction-header marker bits.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Hash)]
    pub struct TxnHeaderFlags: u8 {
        const COMMIT = 0b0000_0001;
    }
}
