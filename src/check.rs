//! The heap invariant checker (C6).
//!
//! The original implementation printed diagnostics and called `exit(0)` the
//! moment it found something wrong. A library cannot unilaterally terminate
//! its caller's process, so this port walks the same structures and returns
//! the first [`CheckViolation`] it finds instead. Callers that want the
//! original's "abort on the first problem" behavior can `.expect(...)` the
//! result themselves.

use crate::block::{ALLOC, HeapMemory, MIN_BLOCK_SIZE, SIZE_MASK};
use crate::bst::FreeBst;
use crate::error::CheckViolation;
use crate::offset::BlockOffset;
use crate::small_list::SmallFreeList;

/// Which parts of the heap to verify. Mirrors the original's `lineno`
/// argument (`0` for the small list, `1` for the BST), plus a whole-heap
/// pass the original only performed implicitly by crashing on corruption.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CheckMode {
    /// Only the small free list's doubly-linked structure and sizes.
    SmallList,
    /// Only the BST and its hanger chains.
    Bst,
    /// Only the physical block chain (boundary tags, coalescing, PREV_ALLOC bits).
    Blocks,
    /// Everything.
    All,
}

/// # Safety
/// `first_block` must be the first real block following the prologue, and
/// every block reachable by walking `next()` from it, every node reachable
/// from `small_list`, and every node reachable from `bst` must be a live,
/// correctly initialized block in `mem`.
pub(crate) unsafe fn check_heap(
    mem: HeapMemory,
    mode: CheckMode,
    small_list: &SmallFreeList,
    bst: &FreeBst,
    first_block: BlockOffset,
) -> Result<(), CheckViolation> {
    unsafe {
        if matches!(mode, CheckMode::SmallList | CheckMode::All) {
            check_small_list(mem, small_list)?;
        }
        if matches!(mode, CheckMode::Bst | CheckMode::All) {
            check_bst(mem, bst)?;
        }
        if matches!(mode, CheckMode::Blocks | CheckMode::All) {
            check_heap_blocks(mem, first_block)?;
        }
        Ok(())
    }
}

unsafe fn check_header_footer(mem: HeapMemory, bp: BlockOffset) -> Result<(), CheckViolation> {
    unsafe {
        let size = mem.size_of(bp);
        let header = mem.header(bp);
        let footer = mem.footer(bp, size);
        if (header & SIZE_MASK) != (footer & SIZE_MASK) || (header & ALLOC) != (footer & ALLOC) {
            return Err(CheckViolation::HeaderFooterMismatch {
                block: bp.get(),
                header,
                footer,
            });
        }
        Ok(())
    }
}

unsafe fn check_small_list(mem: HeapMemory, list: &SmallFreeList) -> Result<(), CheckViolation> {
    unsafe {
        let mut cursor = list.head();
        let mut prev = None;
        while let Some(node) = cursor {
            check_header_footer(mem, node)?;
            if mem.size_of(node) != MIN_BLOCK_SIZE {
                return Err(CheckViolation::SmallListWrongSize { block: node.get() });
            }
            if mem.pred(node) != prev {
                return Err(CheckViolation::SmallListLinkMismatch { block: node.get() });
            }
            prev = Some(node);
            cursor = mem.succ(node);
        }
        Ok(())
    }
}

unsafe fn check_bst(mem: HeapMemory, bst: &FreeBst) -> Result<(), CheckViolation> {
    unsafe { check_bst_subtree(mem, bst.root(), None, None, None) }
}

/// Recursively verifies BST ordering, parent backlinks, and hanger-chain
/// consistency for the subtree rooted at `node`. `lo`/`hi` bound the sizes
/// permitted in this subtree (exclusive), enforcing that every left
/// descendant is strictly smaller and every right descendant strictly
/// larger than its ancestors — same-size blocks never become separate tree
/// nodes, they always join a hanger chain instead.
unsafe fn check_bst_subtree(
    mem: HeapMemory,
    node: Option<BlockOffset>,
    expected_parent: Option<BlockOffset>,
    lo: Option<u32>,
    hi: Option<u32>,
) -> Result<(), CheckViolation> {
    let Some(node) = node else {
        return Ok(());
    };
    unsafe {
        check_header_footer(mem, node)?;
        if mem.parent(node) != expected_parent {
            return Err(CheckViolation::BstLinkMismatch {
                block: node.get(),
                parent: expected_parent.map_or(0, BlockOffset::get),
            });
        }

        let size = mem.size_of(node);
        if let Some(lo) = lo {
            if size <= lo {
                return Err(CheckViolation::BstOrderViolation {
                    block: node.get(),
                    size,
                    parent: expected_parent.map_or(0, BlockOffset::get),
                    parent_size: lo,
                });
            }
        }
        if let Some(hi) = hi {
            if size >= hi {
                return Err(CheckViolation::BstOrderViolation {
                    block: node.get(),
                    size,
                    parent: expected_parent.map_or(0, BlockOffset::get),
                    parent_size: hi,
                });
            }
        }

        let mut chain_prev = node;
        let mut chain = mem.hanger(node);
        while let Some(h) = chain {
            check_header_footer(mem, h)?;
            let h_size = mem.size_of(h);
            if h_size != size {
                return Err(CheckViolation::HangerSizeMismatch {
                    block: h.get(),
                    expected: size,
                    found: h_size,
                });
            }
            if mem.parent(h) != Some(chain_prev) {
                return Err(CheckViolation::BstLinkMismatch {
                    block: h.get(),
                    parent: chain_prev.get(),
                });
            }
            chain_prev = h;
            chain = mem.hanger(h);
        }

        check_bst_subtree(mem, mem.lchild(node), Some(node), lo, Some(size))?;
        check_bst_subtree(mem, mem.rchild(node), Some(node), Some(size), hi)?;
    }
    Ok(())
}

/// Walks the physical block chain from the first real block to the
/// epilogue, checking boundary-tag consistency, the "no two adjacent free
/// blocks" coalescing invariant, and that every block's `PREV_ALLOC` bit
/// matches its predecessor's actual allocation state.
unsafe fn check_heap_blocks(mem: HeapMemory, first_block: BlockOffset) -> Result<(), CheckViolation> {
    unsafe {
        let mut bp = first_block;
        let mut prev_was_free = false;
        let mut prev_offset = 0u32;
        loop {
            let size = mem.size_of(bp);
            if size == 0 {
                break;
            }
            let alloc = mem.alloc_of(bp);
            if !alloc {
                check_header_footer(mem, bp)?;
            }

            let recorded_prev_alloc = mem.prev_alloc_of(bp);
            let actual_prev_alloc = !prev_was_free;
            if recorded_prev_alloc != actual_prev_alloc {
                return Err(CheckViolation::PrevAllocMismatch {
                    block: bp.get(),
                    prev: prev_offset,
                    recorded: recorded_prev_alloc,
                    actual: actual_prev_alloc,
                });
            }
            if prev_was_free && !alloc {
                return Err(CheckViolation::UncoalescedNeighbors {
                    first: prev_offset,
                    second: bp.get(),
                });
            }

            prev_was_free = !alloc;
            prev_offset = bp.get();
            bp = mem.next(bp);
        }
        Ok(())
    }
}
