//! Typed errors for the allocator's fallible boundaries (C0).

use thiserror::Error;

/// Everything that can go wrong setting up or growing an [`Allocator`](crate::alloc::Allocator).
#[derive(Debug, Error)]
pub enum AllocatorError<E> {
    /// The backing [`HeapProvider`](crate::provider::HeapProvider) failed to
    /// grow the heap, including a provider reporting that growth would
    /// exceed the 32-bit offset budget (e.g. [`SbrkError::TooLarge`](crate::provider::SbrkError::TooLarge)).
    #[error("heap provider error: {0}")]
    Provider(#[source] E),
    /// A single requested allocation size, once aligned and padded, does not
    /// fit the `u32` arithmetic the block layout is built around.
    #[error("requested size {0} exceeds the 32-bit heap offset budget")]
    SizeTooLarge(usize),
}

/// A violated invariant found by [`check_heap`](crate::check::check_heap).
///
/// Each variant names the offset(s) involved so a caller can locate the
/// corrupted block without re-deriving the traversal.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CheckViolation {
    #[error("block at offset {block}: header size/alloc ({header:#x}) disagrees with footer ({footer:#x})")]
    HeaderFooterMismatch {
        block: u32,
        header: u32,
        footer: u32,
    },
    #[error("small free list node at offset {block} is not exactly the minimum block size")]
    SmallListWrongSize { block: u32 },
    #[error("small free list is not properly doubly linked at offset {block}")]
    SmallListLinkMismatch { block: u32 },
    #[error("BST node at offset {block} is not properly linked to its parent at {parent}")]
    BstLinkMismatch { block: u32, parent: u32 },
    #[error("BST ordering violated: node {block} (size {size}) found under parent {parent} (size {parent_size})")]
    BstOrderViolation {
        block: u32,
        size: u32,
        parent: u32,
        parent_size: u32,
    },
    #[error("hanger chain at offset {block} contains a member of size {found} instead of {expected}")]
    HangerSizeMismatch {
        block: u32,
        expected: u32,
        found: u32,
    },
    #[error("two physically adjacent free blocks at offsets {first} and {second} were never coalesced")]
    UncoalescedNeighbors { first: u32, second: u32 },
    #[error("block at offset {block} has PREV_ALLOC={recorded} but the preceding block at {prev} is actually {actual}")]
    PrevAllocMismatch {
        block: u32,
        prev: u32,
        recorded: bool,
        actual: bool,
    },
}
