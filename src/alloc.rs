//! The allocator itself (C5): `malloc`/`free`/`realloc`/`calloc` built on top
//! of the block layout (C2), the heap provider (C1), the small free list
//! (C3), and the free-block BST (C4).
//!
//! ```text
//!   malloc(size)
//!       │
//!       ▼
//!   find_fit(asize) ──miss──► extend_heap(asize) ──► find_fit(asize) again
//!       │ hit                                               │
//!       ▼                                                   ▼
//!   place(bp, asize) ◄─────────────────────────────────────┘
//!       │
//!       ▼
//!   pointer into bp's payload
//! ```
//!
//! `insert_node`/`delete_node` are the only things in this module that touch
//! the small list or BST directly; every other function goes through them,
//! which is also where the next block's `PREV_ALLOC` bit gets kept in sync.

use std::ptr;

use log::{debug, trace, warn};

use crate::block::{ALLOC, DSIZE, HeapMemory, MIN_BLOCK_SIZE, PREV_ALLOC, WSIZE, align8, pack};
use crate::bst::FreeBst;
use crate::check::{self, CheckMode};
use crate::error::{AllocatorError, CheckViolation};
use crate::offset::BlockOffset;
use crate::provider::HeapProvider;
use crate::small_list::SmallFreeList;

/// A best-fit allocator over a single heap supplied by `P`.
///
/// The heap is never shrunk back to the provider except by [`Allocator::free`]
/// coalescing a block all the way out to the epilogue; everything else is
/// demand-grown, one `extend_heap` call at a time, exactly as much as a
/// `malloc` needs and no more.
pub struct Allocator<P: HeapProvider> {
    provider: P,
    mem: HeapMemory,
    /// The current epilogue block: always size 0, always `ALLOC`.
    epilogue: BlockOffset,
    /// The first real (non-prologue, non-epilogue) block position. Fixed at
    /// construction time; every block ever placed lives at or after this
    /// offset.
    first_block: BlockOffset,
    small_list: SmallFreeList,
    bst: FreeBst,
}

impl<P: HeapProvider> Allocator<P> {
    /// Sets up the heap's prologue/epilogue boundary tags over `provider`,
    /// growing it by the six words the original layout reserves for
    /// alignment padding, the prologue header/footer, and the epilogue
    /// header.
    pub fn new(mut provider: P) -> Result<Self, AllocatorError<P::Error>> {
        let region_base = provider
            .grow((6 * WSIZE) as usize)
            .map_err(AllocatorError::Provider)? as u32;
        let mem = unsafe { HeapMemory::new(provider.lo()) };

        unsafe {
            mem.write_word(region_base + 2 * WSIZE, 0);
            mem.write_word(region_base + 3 * WSIZE, pack(DSIZE, ALLOC));
            mem.write_word(region_base + 4 * WSIZE, pack(DSIZE, ALLOC));
            mem.write_word(region_base + 5 * WSIZE, pack(0, ALLOC | PREV_ALLOC));
        }

        let epilogue = BlockOffset::new(region_base + 6 * WSIZE)
            .expect("the epilogue never lands at offset 0");
        debug!("allocator initialized, epilogue at offset {}", epilogue.get());

        Ok(Self {
            provider,
            mem,
            epilogue,
            first_block: epilogue,
            small_list: SmallFreeList::new(),
            bst: FreeBst::new(),
        })
    }

    /// Allocates at least `size` bytes, returning a pointer to the payload.
    /// Returns a null pointer for a zero-sized request, matching the
    /// original's "ignore spurious requests" behavior.
    pub fn malloc(&mut self, size: usize) -> Result<*mut u8, AllocatorError<P::Error>> {
        if size == 0 {
            return Ok(ptr::null_mut());
        }
        let size: u32 = size
            .try_into()
            .map_err(|_| AllocatorError::SizeTooLarge(size))?;
        let requested = size
            .checked_add(WSIZE)
            .ok_or(AllocatorError::SizeTooLarge(size as usize))?;
        let asize = align8(requested).max(MIN_BLOCK_SIZE);
        trace!("malloc({size}) -> asize={asize}");

        let bp = match self.find_fit(asize) {
            Some(bp) => bp,
            None => {
                self.extend_heap(asize)?;
                match self.find_fit(asize) {
                    Some(bp) => bp,
                    None => {
                        warn!("malloc({size}): extend_heap succeeded but no fit was found");
                        return Ok(ptr::null_mut());
                    }
                }
            }
        };

        self.place(bp, asize);
        Ok(self.bp_to_ptr(bp))
    }

    /// Frees a pointer previously returned by `malloc`/`calloc`/`realloc`.
    /// A null pointer, or a pointer to an already-free block, is a no-op.
    pub fn free(&mut self, p: *mut u8) {
        if p.is_null() {
            return;
        }
        let bp = self.ptr_to_bp(p);
        let mem = self.mem;
        unsafe {
            if !mem.alloc_of(bp) {
                return;
            }
            let size = mem.size_of(bp);
            let flag = if mem.prev_alloc_of(bp) { PREV_ALLOC } else { 0 };
            mem.set_header(bp, pack(size, flag));
            mem.set_footer(bp, size, pack(size, flag));
            trace!("free: block at {} (size {size})", bp.get());
            let merged = self.coalesce(bp);
            self.insert_node(merged);
        }
    }

    /// Resizes the allocation at `p` to `size` bytes, copying the lesser of
    /// the old and new sizes and freeing the original block. A `size` of
    /// zero behaves like `free`; a null `p` behaves like `malloc`.
    pub fn realloc(&mut self, p: *mut u8, size: usize) -> Result<*mut u8, AllocatorError<P::Error>> {
        if size == 0 {
            self.free(p);
            return Ok(ptr::null_mut());
        }
        if p.is_null() {
            return self.malloc(size);
        }

        let new_ptr = self.malloc(size)?;
        if new_ptr.is_null() {
            return Ok(ptr::null_mut());
        }

        let bp = self.ptr_to_bp(p);
        let old_size = unsafe { self.mem.size_of(bp) } as usize;
        let copy_len = old_size.min(size);
        unsafe { ptr::copy_nonoverlapping(p, new_ptr, copy_len) };
        self.free(p);
        Ok(new_ptr)
    }

    /// Allocates space for `nmemb` elements of `size` bytes each, zeroed.
    pub fn calloc(&mut self, nmemb: usize, size: usize) -> Result<*mut u8, AllocatorError<P::Error>> {
        let total = nmemb
            .checked_mul(size)
            .ok_or(AllocatorError::SizeTooLarge(usize::MAX))?;
        let p = self.malloc(total)?;
        if !p.is_null() {
            unsafe { ptr::write_bytes(p, 0, total) };
        }
        Ok(p)
    }

    /// Verifies the heap's invariants, returning the first violation found.
    pub fn check_heap(&self, mode: CheckMode) -> Result<(), CheckViolation> {
        let result =
            unsafe { check::check_heap(self.mem, mode, &self.small_list, &self.bst, self.first_block) };
        if let Err(violation) = &result {
            warn!("check_heap({mode:?}): {violation}");
        }
        result
    }

    fn bp_to_ptr(&self, bp: BlockOffset) -> *mut u8 {
        unsafe { self.mem.base().add(bp.get() as usize) }
    }

    fn ptr_to_bp(&self, p: *mut u8) -> BlockOffset {
        let offset = (p as usize) - (self.mem.base() as usize);
        BlockOffset::new(offset as u32).expect("pointer does not name a valid block")
    }

    /// Grows the heap by at least `requested` bytes (less, if a free block
    /// already trails the heap and can be topped up instead), places fresh
    /// boundary tags, and folds the result into the free structures.
    fn extend_heap(&mut self, requested: u32) -> Result<BlockOffset, AllocatorError<P::Error>> {
        let mem = self.mem;
        let bp = self.epilogue;

        let prev_alloc = unsafe { mem.prev_alloc_of(bp) };
        let mut size = requested;
        if !prev_alloc {
            let prev = unsafe { mem.prev(bp) };
            let prev_size = unsafe { mem.size_of(prev) };
            if requested > prev_size && requested - prev_size >= MIN_BLOCK_SIZE {
                size = requested - prev_size;
            }
        }

        self.provider
            .grow(size as usize)
            .map_err(AllocatorError::Provider)?;
        debug!("extend_heap: grew by {size} bytes at offset {}", bp.get());

        let flag = if prev_alloc { PREV_ALLOC } else { 0 };
        unsafe {
            mem.set_header(bp, pack(size, flag));
            mem.set_footer(bp, size, pack(size, flag));
            let new_epilogue = mem.next(bp);
            mem.set_header(new_epilogue, pack(0, ALLOC));
            self.epilogue = new_epilogue;
        }

        let merged = self.coalesce(bp);
        self.insert_node(merged);
        Ok(merged)
    }

    /// Splits a free block down to `asize` if the remainder would still
    /// meet the minimum block size, otherwise hands over the whole block.
    fn place(&mut self, bp: BlockOffset, asize: u32) {
        let mem = self.mem;
        let csize = unsafe { mem.size_of(bp) };
        self.delete_node(bp);

        let prev_alloc = unsafe { mem.prev_alloc_of(bp) };
        let prev_flag = if prev_alloc { PREV_ALLOC } else { 0 };

        if csize - asize >= MIN_BLOCK_SIZE {
            trace!("place: splitting block at {} ({csize} bytes) into {asize} + {} remainder", bp.get(), csize - asize);
            unsafe {
                mem.set_header(bp, pack(asize, ALLOC | prev_flag));
                let remainder = mem.next(bp);
                let rsize = csize - asize;
                mem.set_header(remainder, pack(rsize, PREV_ALLOC));
                mem.set_footer(remainder, rsize, pack(rsize, PREV_ALLOC));
                let merged = self.coalesce(remainder);
                self.insert_node(merged);
            }
        } else {
            trace!("place: allocating block at {} whole ({csize} bytes, asize {asize})", bp.get());
            unsafe {
                mem.set_header(bp, pack(csize, ALLOC | prev_flag));
            }
        }
    }

    /// Finds a free block of at least `asize` bytes: the small list's head
    /// if `asize` fits there (any member does, they're all the same size),
    /// otherwise a best-fit descent of the BST.
    fn find_fit(&self, asize: u32) -> Option<BlockOffset> {
        if asize <= MIN_BLOCK_SIZE {
            if let Some(bp) = self.small_list.head() {
                return Some(bp);
            }
        }
        unsafe { self.bst.find_best_fit(self.mem, asize) }
    }

    /// Merges `bp` with whichever physically adjacent neighbors are free,
    /// returning the offset of the merged block (which may be `bp` itself,
    /// its predecessor, or — in the four-way merge case — still its
    /// predecessor).
    fn coalesce(&mut self, bp: BlockOffset) -> BlockOffset {
        let mem = self.mem;
        unsafe {
            let prev_alloc = mem.prev_alloc_of(bp);
            let next = mem.next(bp);
            let next_alloc = mem.alloc_of(next);
            let mut size = mem.size_of(bp);

            if prev_alloc && next_alloc {
                trace!("coalesce: block at {} has no free neighbors", bp.get());
                bp
            } else if prev_alloc && !next_alloc {
                trace!("coalesce: merging block at {} with free next at {}", bp.get(), next.get());
                size += mem.size_of(next);
                self.delete_node(next);
                let flag = PREV_ALLOC; // prev_alloc is true in this branch
                mem.set_header(bp, pack(size, flag));
                mem.set_footer(bp, size, pack(size, flag));
                bp
            } else if !prev_alloc && next_alloc {
                let prev = mem.prev(bp);
                trace!("coalesce: merging free prev at {} with block at {}", prev.get(), bp.get());
                let flag = if mem.prev_alloc_of(prev) { PREV_ALLOC } else { 0 };
                self.delete_node(prev);
                size += mem.size_of(prev);
                mem.set_header(prev, pack(size, flag));
                mem.set_footer(prev, size, pack(size, flag));
                prev
            } else {
                let prev = mem.prev(bp);
                trace!("coalesce: four-way merge of {}, {}, and {}", prev.get(), bp.get(), next.get());
                size += mem.size_of(prev) + mem.size_of(next);
                self.delete_node(prev);
                self.delete_node(next);
                let flag = if mem.prev_alloc_of(prev) { PREV_ALLOC } else { 0 };
                mem.set_header(prev, pack(size, flag));
                mem.set_footer(prev, size, pack(size, flag));
                prev
            }
        }
    }

    /// Links a free block into the small list or the BST (by size), and
    /// clears the next block's `PREV_ALLOC` bit.
    fn insert_node(&mut self, bp: BlockOffset) {
        let mem = self.mem;
        unsafe {
            let next = mem.next(bp);
            mem.clear_prev_alloc(next);
            if mem.size_of(bp) == MIN_BLOCK_SIZE {
                self.small_list.insert(mem, bp);
            } else {
                self.bst.insert(mem, bp);
            }
        }
    }

    /// Unlinks a free block from whichever structure holds it, and sets the
    /// next block's `PREV_ALLOC` bit (its predecessor is about to stop
    /// being free).
    fn delete_node(&mut self, bp: BlockOffset) {
        let mem = self.mem;
        unsafe {
            let next = mem.next(bp);
            mem.set_prev_alloc(next);
            if mem.size_of(bp) == MIN_BLOCK_SIZE {
                self.small_list.unlink(mem, bp);
            } else {
                self.bst.delete(mem, bp);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ArenaHeapProvider;

    fn new_allocator(capacity: usize) -> Allocator<ArenaHeapProvider> {
        Allocator::new(ArenaHeapProvider::new(capacity)).unwrap()
    }

    /// S1: a single allocation can be written to and read back.
    #[test]
    fn single_allocation_round_trips_data() {
        let mut a = new_allocator(4096);
        let p = a.malloc(64).unwrap() as *mut u64;
        assert!(!p.is_null());
        unsafe {
            *p = 0xDEAD_BEEF_u64;
            assert_eq!(*p, 0xDEAD_BEEF);
        }
        a.check_heap(CheckMode::All).unwrap();
    }

    /// S2: freeing the only allocation returns the heap to a consistent,
    /// fully-free state.
    #[test]
    fn free_after_single_allocation_is_consistent() {
        let mut a = new_allocator(4096);
        let p = a.malloc(128).unwrap();
        a.free(p);
        a.check_heap(CheckMode::All).unwrap();
    }

    /// S3: freeing a block sandwiched between two allocations coalesces
    /// with neither side, but freeing all three collapses them into one.
    #[test]
    fn adjacent_frees_coalesce() {
        let mut a = new_allocator(4096);
        let p1 = a.malloc(32).unwrap();
        let p2 = a.malloc(32).unwrap();
        let p3 = a.malloc(32).unwrap();
        a.free(p2);
        a.check_heap(CheckMode::All).unwrap();
        a.free(p1);
        a.check_heap(CheckMode::All).unwrap();
        a.free(p3);
        a.check_heap(CheckMode::All).unwrap();
    }

    /// S4: many same-size allocations exercise the small free list's
    /// chain, not just the BST.
    #[test]
    fn many_minimum_size_allocations_reuse_freed_slots() {
        let mut a = new_allocator(4096);
        let mut ptrs = Vec::new();
        for _ in 0..16 {
            ptrs.push(a.malloc(1).unwrap());
        }
        for &p in &ptrs {
            a.free(p);
        }
        a.check_heap(CheckMode::All).unwrap();
        let reused = a.malloc(1).unwrap();
        assert!(!reused.is_null());
        a.check_heap(CheckMode::All).unwrap();
    }

    /// S5: a request with no fit forces `extend_heap`, and the result still
    /// satisfies the request.
    #[test]
    fn allocation_larger_than_initial_heap_extends() {
        let mut a = new_allocator(64);
        let p = a.malloc(512).unwrap();
        assert!(!p.is_null());
        unsafe { ptr::write_bytes(p, 0xAB, 512) };
        a.check_heap(CheckMode::All).unwrap();
    }

    /// S6: `realloc` to a larger size preserves the original bytes.
    #[test]
    fn realloc_preserves_prefix() {
        let mut a = new_allocator(4096);
        let p = a.malloc(16).unwrap();
        unsafe { ptr::write_bytes(p, 0x42, 16) };
        let grown = a.realloc(p, 256).unwrap();
        assert!(!grown.is_null());
        unsafe {
            for i in 0..16 {
                assert_eq!(*grown.add(i), 0x42);
            }
        }
        a.check_heap(CheckMode::All).unwrap();
    }

    #[test]
    fn malloc_zero_returns_null() {
        let mut a = new_allocator(256);
        assert!(a.malloc(0).unwrap().is_null());
    }

    #[test]
    fn free_null_is_noop() {
        let mut a = new_allocator(256);
        a.free(ptr::null_mut());
        a.check_heap(CheckMode::All).unwrap();
    }

    #[test]
    fn calloc_zeroes_memory() {
        let mut a = new_allocator(4096);
        let p = a.calloc(8, 8).unwrap();
        assert!(!p.is_null());
        unsafe {
            for i in 0..64 {
                assert_eq!(*p.add(i), 0);
            }
        }
    }
}
