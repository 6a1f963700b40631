//! The small free list (C3): a doubly linked list of free blocks that are
//! all exactly [`MIN_BLOCK_SIZE`](crate::block::MIN_BLOCK_SIZE) bytes.
//!
//! These blocks are too small to carry the four BST link fields
//! (`LCHILD`/`RCHILD`/`PARENT`/`HANGER`), so they get their own list keyed
//! by nothing but size — any member satisfies any request that reaches this
//! list, since by definition every member is the same size.

use crate::block::HeapMemory;
use crate::offset::BlockOffset;

/// Head of the small free list. `None` when empty.
#[derive(Default)]
pub(crate) struct SmallFreeList {
    head: Option<BlockOffset>,
}

impl SmallFreeList {
    pub(crate) fn new() -> Self {
        Self { head: None }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub(crate) fn head(&self) -> Option<BlockOffset> {
        self.head
    }

    /// Pushes `bp` onto the front of the list.
    ///
    /// # Safety
    /// `bp` must name a free block of exactly `MIN_BLOCK_SIZE` bytes that is
    /// not already linked into this list.
    pub(crate) unsafe fn insert(&mut self, mem: HeapMemory, bp: BlockOffset) {
        unsafe {
            mem.set_pred(bp, None);
            mem.set_succ(bp, self.head);
            if let Some(old_head) = self.head {
                mem.set_pred(old_head, Some(bp));
            }
            self.head = Some(bp);
        }
    }

    /// Removes `bp` from the list, wherever in it `bp` sits.
    ///
    /// # Safety
    /// `bp` must currently be linked into this exact list.
    pub(crate) unsafe fn unlink(&mut self, mem: HeapMemory, bp: BlockOffset) {
        unsafe {
            let pred = mem.pred(bp);
            let succ = mem.succ(bp);
            match pred {
                Some(pred) => mem.set_succ(pred, succ),
                None => self.head = succ,
            }
            if let Some(succ) = succ {
                mem.set_pred(succ, pred);
            }
        }
    }

    /// Removes and returns the head of the list, if any.
    ///
    /// # Safety
    /// The caller must hold the `HeapMemory` this list's blocks live in.
    pub(crate) unsafe fn pop_head(&mut self, mem: HeapMemory) -> Option<BlockOffset> {
        let head = self.head?;
        unsafe { self.unlink(mem, head) };
        Some(head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{MIN_BLOCK_SIZE, WSIZE, align8, pack};

    /// Lays out `count` free blocks of `MIN_BLOCK_SIZE` back to back and
    /// returns their offsets in placement order, along with the backing
    /// memory handle.
    fn small_blocks(count: u32) -> (Box<[u8]>, HeapMemory, Vec<BlockOffset>) {
        let block_bytes = align8(MIN_BLOCK_SIZE);
        let total = (WSIZE + block_bytes * count) as usize;
        let mut storage = vec![0u8; total].into_boxed_slice();
        let mem = unsafe { HeapMemory::new(storage.as_mut_ptr()) };
        let mut offsets = Vec::new();
        let mut byte_offset = WSIZE;
        for _ in 0..count {
            let bp = BlockOffset::new(byte_offset + WSIZE).unwrap();
            unsafe {
                mem.set_header(bp, pack(block_bytes, 0));
                mem.set_footer(bp, block_bytes, pack(block_bytes, 0));
            }
            offsets.push(bp);
            byte_offset += block_bytes;
        }
        (storage, mem, offsets)
    }

    #[test]
    fn insert_and_pop_is_lifo() {
        let (_storage, mem, blocks) = small_blocks(3);
        let mut list = SmallFreeList::new();
        unsafe {
            for &bp in &blocks {
                list.insert(mem, bp);
            }
            assert_eq!(list.pop_head(mem), Some(blocks[2]));
            assert_eq!(list.pop_head(mem), Some(blocks[1]));
            assert_eq!(list.pop_head(mem), Some(blocks[0]));
            assert!(list.pop_head(mem).is_none());
        }
    }

    #[test]
    fn unlink_from_middle_preserves_neighbors() {
        let (_storage, mem, blocks) = small_blocks(3);
        let mut list = SmallFreeList::new();
        unsafe {
            for &bp in &blocks {
                list.insert(mem, bp);
            }
            // List is now [blocks[2], blocks[1], blocks[0]] head to tail.
            list.unlink(mem, blocks[1]);
            assert_eq!(list.pop_head(mem), Some(blocks[2]));
            assert_eq!(list.pop_head(mem), Some(blocks[0]));
            assert!(list.is_empty());
        }
    }

    #[test]
    fn unlink_head_updates_head_pointer() {
        let (_storage, mem, blocks) = small_blocks(2);
        let mut list = SmallFreeList::new();
        unsafe {
            list.insert(mem, blocks[0]);
            list.insert(mem, blocks[1]);
            assert_eq!(list.head(), Some(blocks[1]));
            list.unlink(mem, blocks[1]);
            assert_eq!(list.head(), Some(blocks[0]));
        }
    }

    #[test]
    fn single_element_round_trips() {
        let (_storage, mem, blocks) = small_blocks(1);
        let mut list = SmallFreeList::new();
        unsafe {
            list.insert(mem, blocks[0]);
            assert!(!list.is_empty());
            list.unlink(mem, blocks[0]);
            assert!(list.is_empty());
        }
    }
}
