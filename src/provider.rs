//! The heap-growing primitive (C1): the allocator core never talks to the OS
//! directly, it asks a [`HeapProvider`] for more bytes.
//!
//! ```text
//!   Allocator<P>
//!       │
//!       │ grow(n)
//!       ▼
//!   HeapProvider (trait)
//!       │
//!       ├── SbrkHeapProvider   (real process break, via libc::sbrk)
//!       └── ArenaHeapProvider  (fixed boxed-slice arena, used by every test)
//! ```
//!
//! Splitting this out keeps the block/list/BST/coalesce machinery completely
//! decoupled from the process's actual address space, which is what makes it
//! possible to run the whole test suite without every test fighting over the
//! one real `sbrk` break.

use std::error::Error;

use libc::{c_void, intptr_t, sbrk};
use thiserror::Error;

/// Supplies and grows the single contiguous region the allocator treats as
/// its heap.
///
/// Implementations grow monotonically; there is no shrink path. The heap is
/// never returned to the provider, not even for a trailing free block — see
/// the crate-level docs' Limitations section.
pub trait HeapProvider {
    /// The error type a failed `grow` reports.
    type Error: Error + Send + Sync + 'static;

    /// The current low address of the heap region. Stable for the
    /// provider's lifetime once the first successful `grow` has returned.
    fn lo(&self) -> *mut u8;

    /// The current size of the heap region, in bytes.
    fn size(&self) -> usize;

    /// Grows the heap by `bytes`, returning the *old* size (the byte offset
    /// at which the new space begins).
    fn grow(&mut self, bytes: usize) -> Result<usize, Self::Error>;
}

/// Error returned by [`SbrkHeapProvider`].
#[derive(Debug, Error)]
pub enum SbrkError {
    #[error("sbrk({0}) failed")]
    Failed(isize),
    #[error("heap would exceed the 32-bit offset budget")]
    TooLarge,
}

/// A [`HeapProvider`] backed by the process's real program break.
///
/// Grounded directly in the teacher's own `sbrk` usage: the `(void*)-1`
/// failure check is carried over unchanged, just behind a trait instead of
/// baked into the allocator.
pub struct SbrkHeapProvider {
    lo: *mut u8,
    size: usize,
}

impl SbrkHeapProvider {
    /// Captures the current program break as the heap's base. Does not grow
    /// the heap; the first `grow` call establishes real backing memory.
    pub fn new() -> Result<Self, SbrkError> {
        let brk = unsafe { sbrk(0) };
        if brk == usize::MAX as *mut c_void {
            return Err(SbrkError::Failed(0));
        }
        Ok(Self {
            lo: brk as *mut u8,
            size: 0,
        })
    }
}

impl HeapProvider for SbrkHeapProvider {
    type Error = SbrkError;

    fn lo(&self) -> *mut u8 {
        self.lo
    }

    fn size(&self) -> usize {
        self.size
    }

    fn grow(&mut self, bytes: usize) -> Result<usize, SbrkError> {
        if self.size + bytes > u32::MAX as usize {
            return Err(SbrkError::TooLarge);
        }
        let old_break = unsafe { sbrk(bytes as intptr_t) };
        if old_break == usize::MAX as *mut c_void {
            return Err(SbrkError::Failed(bytes as isize));
        }
        let old_size = self.size;
        self.size += bytes;
        Ok(old_size)
    }
}

/// Error returned by [`ArenaHeapProvider`].
#[derive(Debug, Error)]
pub enum ArenaError {
    #[error("arena exhausted: requested {requested} bytes, {remaining} remaining of {capacity}")]
    Exhausted {
        requested: usize,
        remaining: usize,
        capacity: usize,
    },
}

/// A [`HeapProvider`] backed by a fixed-capacity boxed slice.
///
/// Every test in this crate (and the `demos/` walkthrough's doctest-free
/// counterpart, where determinism matters more than realism) uses this
/// provider instead of [`SbrkHeapProvider`]: a real `sbrk` heap is global
/// process state, and parallel `#[test]` threads growing the same program
/// break would corrupt each other's view of it.
pub struct ArenaHeapProvider {
    storage: Box<[u8]>,
    used: usize,
}

impl ArenaHeapProvider {
    /// Reserves `capacity` bytes of backing storage. No bytes are handed to
    /// the allocator until `grow` is called.
    pub fn new(capacity: usize) -> Self {
        Self {
            storage: vec![0u8; capacity].into_boxed_slice(),
            used: 0,
        }
    }
}

impl HeapProvider for ArenaHeapProvider {
    type Error = ArenaError;

    fn lo(&self) -> *mut u8 {
        self.storage.as_ptr() as *mut u8
    }

    fn size(&self) -> usize {
        self.used
    }

    fn grow(&mut self, bytes: usize) -> Result<usize, ArenaError> {
        let capacity = self.storage.len();
        if self.used + bytes > capacity {
            return Err(ArenaError::Exhausted {
                requested: bytes,
                remaining: capacity - self.used,
                capacity,
            });
        }
        let old_size = self.used;
        self.used += bytes;
        Ok(old_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_grows_and_tracks_offsets() {
        let mut arena = ArenaHeapProvider::new(4096);
        assert_eq!(arena.grow(64).unwrap(), 0);
        assert_eq!(arena.grow(128).unwrap(), 64);
        assert_eq!(arena.size(), 192);
    }

    #[test]
    fn arena_rejects_growth_past_capacity() {
        let mut arena = ArenaHeapProvider::new(128);
        assert!(arena.grow(64).is_ok());
        assert!(matches!(
            arena.grow(128),
            Err(ArenaError::Exhausted { .. })
        ));
    }
}
