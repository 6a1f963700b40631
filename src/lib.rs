//! # rallocator - A Best-Fit Free-List Allocator
//!
//! This crate provides a **best-fit dynamic memory allocator** over a single,
//! monotonically growable heap. Unlike a bump allocator, freed blocks are
//! recycled: small blocks through a doubly linked free list, larger blocks
//! through a size-indexed binary search tree, so that `malloc` after `free`
//! does not just keep growing the heap.
//!
//! ## Overview
//!
//! ```text
//!   Free-block index:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                         HEAP MEMORY                                  │
//!   │                                                                      │
//!   │  ┌──────┬────────┬──────┬────────────┬──────┬───────────────────┐   │
//!   │  │ PROLG│ alloc  │ free │   alloc    │ free │    alloc ...      │   │
//!   │  └──────┴────────┴──┬───┴────────────┴──┬───┴───────────────────┘   │
//!   │                     │                   │                          │
//!   │           size == 16 bytes        size > 16 bytes                  │
//!   │                     │                   │                          │
//!   │                     ▼                   ▼                          │
//!   │           small_list_head          bst_root (by size)              │
//!   │           (doubly linked)          (BST, same-size hangers)         │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   malloc: best-fit lookup in the BST (or the small list's head for
//!   minimum-size requests) -> split -> payload pointer.
//!   free:   boundary-tag coalesce with physical neighbors -> reinsert.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   rallocator
//!   ├── offset      - BlockOffset: a NonZeroU32 heap offset, 0 == "none"
//!   ├── block       - header/footer layout, HeapMemory accessors (C2)
//!   ├── small_list  - doubly linked free list of minimum-size blocks (C3)
//!   ├── bst         - size-indexed BST of free blocks, with hangers (C4)
//!   ├── alloc       - Allocator<P>: malloc/free/realloc/calloc (C5)
//!   ├── check       - check_heap: invariant checker (C6)
//!   ├── provider    - HeapProvider trait, SbrkHeapProvider, ArenaHeapProvider
//!   └── error       - AllocatorError, CheckViolation, SbrkError, ArenaError
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rallocator::{Allocator, ArenaHeapProvider};
//!
//! let mut allocator = Allocator::new(ArenaHeapProvider::new(64 * 1024)).unwrap();
//!
//! let p = allocator.malloc(64).unwrap() as *mut u64;
//! assert!(!p.is_null());
//! unsafe {
//!     p.write(42);
//!     assert_eq!(p.read(), 42);
//! }
//! allocator.free(p as *mut u8);
//! ```
//!
//! ## How It Works
//!
//! Every block carries a one-word header packing its size (8-byte aligned,
//! so the low three bits are free) with an `ALLOC` bit and a `PREV_ALLOC`
//! bit. Free blocks additionally carry a footer and overlay their payload
//! with link fields (`PRED`/`SUCC` for minimum-size blocks, or
//! `LCHILD`/`RCHILD`/`PARENT`/`HANGER` for everything else), so a free
//! block's membership in the small list or the BST costs no extra space
//! beyond the payload it would have held anyway.
//!
//! ```text
//!   Single Allocation (no footer -- it is allocated):
//!   ┌───────────────────────┬────────────────────────────────┐
//!   │    Block Header       │         User Data              │
//!   │  ┌─────────────────┐  │                                │
//!   │  │ size | ALLOC |  │  │  ┌──────────────────────────┐  │
//!   │  │ PREV_ALLOC      │  │  │     N bytes usable       │  │
//!   │  └─────────────────┘  │  │                          │  │
//!   │      4 bytes          │  └──────────────────────────┘  │
//!   └───────────────────────┴────────────────────────────────┘
//!                           ▲
//!                           └── pointer returned to caller
//! ```
//!
//! ## Features
//!
//! - **Best-fit allocation**: the BST descent always returns the tightest
//!   available block, not just the first one that fits.
//! - **O(1) coalescing**: boundary tags let `free` merge with either
//!   physical neighbor without scanning.
//! - **Pluggable heap backing**: [`HeapProvider`] abstracts the real `sbrk`
//!   break from a fixed in-process arena, so tests never fight over the
//!   one real process heap.
//! - **Invariant checker**: [`Allocator::check_heap`] walks the small list
//!   and the BST, verifying every structural invariant, for use in tests.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no synchronization primitives; wrapping an
//!   `Allocator` in a mutex is left to the caller.
//! - **32-bit offset budget**: the heap cannot grow past `u32::MAX` bytes,
//!   by design (it is what makes every intra-heap link a 4-byte offset).
//! - **No defragmentation**: free blocks are coalesced with their physical
//!   neighbors but never relocated.
//! - **No return-to-OS**: the heap only grows; `free` never shrinks it back
//!   to the provider except implicitly via top-of-heap coalescing.
//!
//! ## Safety
//!
//! This crate is inherently unsafe where it touches heap bytes directly:
//! all such access is confined to `block::HeapMemory`'s accessor methods.
//! The public API (`malloc`/`free`/`realloc`/`calloc`) is safe to call, but
//! callers are responsible for only passing pointers previously returned by
//! this allocator to `free`/`realloc` — passing anything else is undefined
//! behavior, exactly as with the system allocator.

mod alloc;
mod block;
mod bst;
mod check;
mod error;
mod offset;
mod provider;
mod small_list;

pub use alloc::Allocator;
pub use check::CheckMode;
pub use error::{AllocatorError, CheckViolation};
pub use provider::{ArenaHeapProvider, HeapProvider, SbrkHeapProvider};
