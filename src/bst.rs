//! The size-indexed BST of free blocks (C4), with same-size blocks
//! "hanging" off a single tree node as a singly linked chain instead of each
//! getting their own tree position.
//!
//! ```text
//!           ┌────────┐
//!           │ size=64│◄── tree node (head of its size's chain)
//!           └───┬────┘
//!         hanger │
//!           ┌────▼───┐
//!           │ size=64│◄── hanger body: own LCHILD/RCHILD are None,
//!           └───┬────┘    PARENT points at the node above it in the chain
//!         hanger │
//!           ┌────▼───┐
//!           │ size=64│◄── chain tail: HANGER is None
//!           └────────┘
//! ```
//!
//! Only the chain head carries live subtrees; every other member's
//! `LCHILD`/`RCHILD` are `None` and its `PARENT` names the node directly
//! above it in the chain, not a true BST parent. A node's `HANGER` field
//! tells you which of the two regimes you're in: `HANGER(PARENT(node)) ==
//! Some(node)` means `node`'s parent link is a chain link, not a tree edge.

use crate::block::HeapMemory;
use crate::offset::BlockOffset;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Side {
    Left,
    Right,
}

/// Which child of its parent `bp` is. `None` if `bp` has no parent, or if
/// the parent's child links don't actually name `bp` (it is a hanger body
/// instead, whose `PARENT` is a chain link).
unsafe fn side_of(mem: HeapMemory, bp: BlockOffset) -> Option<Side> {
    unsafe {
        let parent = mem.parent(bp)?;
        if mem.lchild(parent) == Some(bp) {
            Some(Side::Left)
        } else if mem.rchild(parent) == Some(bp) {
            Some(Side::Right)
        } else {
            None
        }
    }
}

/// The root of the free-block BST. `None` when empty.
#[derive(Default)]
pub(crate) struct FreeBst {
    root: Option<BlockOffset>,
}

impl FreeBst {
    pub(crate) fn new() -> Self {
        Self { root: None }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub(crate) fn root(&self) -> Option<BlockOffset> {
        self.root
    }

    /// Inserts `bp` (a free block strictly larger than the small-list
    /// threshold) into the tree, attaching it as the new chain head if a
    /// node of the same size already exists.
    ///
    /// # Safety
    /// `bp` must name a free block not already linked into this tree, whose
    /// size the caller has already confirmed belongs here (not in the small
    /// free list).
    pub(crate) unsafe fn insert(&mut self, mem: HeapMemory, bp: BlockOffset) {
        unsafe {
            let size = mem.size_of(bp);
            let Some(root) = self.root else {
                mem.set_lchild(bp, None);
                mem.set_rchild(bp, None);
                mem.set_parent(bp, None);
                mem.set_hanger(bp, None);
                self.root = Some(bp);
                return;
            };

            let mut parent = root;
            let mut cursor = Some(root);
            let mut side = Side::Left;

            while let Some(node) = cursor {
                let node_size = mem.size_of(node);
                if node_size == size {
                    let l = mem.lchild(node);
                    let r = mem.rchild(node);
                    let p = mem.parent(node);
                    let node_side = side_of(mem, node);

                    mem.set_lchild(bp, l);
                    mem.set_rchild(bp, r);
                    mem.set_parent(bp, p);
                    if let Some(l) = l {
                        mem.set_parent(l, Some(bp));
                    }
                    if let Some(r) = r {
                        mem.set_parent(r, Some(bp));
                    }
                    if let Some(p) = p {
                        match node_side.expect("a parented tree node must be one of its parent's children") {
                            Side::Left => mem.set_lchild(p, Some(bp)),
                            Side::Right => mem.set_rchild(p, Some(bp)),
                        }
                    }

                    mem.set_hanger(bp, Some(node));
                    mem.set_parent(node, Some(bp));
                    mem.set_lchild(node, None);
                    mem.set_rchild(node, None);

                    if self.root == Some(node) {
                        self.root = Some(bp);
                    }
                    return;
                } else if node_size < size {
                    parent = node;
                    side = Side::Right;
                    cursor = mem.rchild(node);
                } else {
                    parent = node;
                    side = Side::Left;
                    cursor = mem.lchild(node);
                }
            }

            match side {
                Side::Left => mem.set_lchild(parent, Some(bp)),
                Side::Right => mem.set_rchild(parent, Some(bp)),
            }
            mem.set_lchild(bp, None);
            mem.set_rchild(bp, None);
            mem.set_parent(bp, Some(parent));
            mem.set_hanger(bp, None);
        }
    }

    /// Removes `bp` from the tree, wherever in a chain it sits.
    ///
    /// # Safety
    /// `bp` must currently be linked into this exact tree.
    pub(crate) unsafe fn delete(&mut self, mem: HeapMemory, bp: BlockOffset) {
        unsafe {
            if self.root.is_none() {
                return;
            }

            if let Some(chain_next) = mem.hanger(bp) {
                let l = mem.lchild(bp);
                let r = mem.rchild(bp);
                let p = mem.parent(bp);

                mem.set_lchild(chain_next, l);
                mem.set_rchild(chain_next, r);
                mem.set_parent(chain_next, p);
                if let Some(l) = l {
                    mem.set_parent(l, Some(chain_next));
                }
                if let Some(r) = r {
                    mem.set_parent(r, Some(chain_next));
                }
                if let Some(p) = p {
                    if mem.hanger(p) == Some(bp) {
                        mem.set_hanger(p, Some(chain_next));
                    } else {
                        match side_of(mem, bp).expect("a parented chain head must be one of its parent's children") {
                            Side::Left => mem.set_lchild(p, Some(chain_next)),
                            Side::Right => mem.set_rchild(p, Some(chain_next)),
                        }
                    }
                }
                if self.root == Some(bp) {
                    self.root = Some(chain_next);
                }
                return;
            }

            if let Some(p) = mem.parent(bp) {
                if mem.hanger(p) == Some(bp) {
                    mem.set_hanger(p, None);
                    return;
                }
            }

            self.delete_bst_node(mem, bp);
        }
    }

    /// Removes a true BST node (no hanger above or below it) by splicing in
    /// its in-order predecessor — the rightmost node of its left subtree, or
    /// its right child outright if it has no left subtree.
    unsafe fn delete_bst_node(&mut self, mem: HeapMemory, bp: BlockOffset) {
        unsafe {
            let l = mem.lchild(bp);
            let r = mem.rchild(bp);
            let dp = mem.parent(bp);

            let replacement = match l {
                None => r,
                Some(l) => {
                    let mut replacement = l;
                    let mut replacement_parent = None;
                    while let Some(rc) = mem.rchild(replacement) {
                        replacement_parent = Some(replacement);
                        replacement = rc;
                    }
                    let replacement_left = mem.lchild(replacement);

                    let new_left = match replacement_parent {
                        None => replacement_left,
                        Some(rp) => {
                            mem.set_rchild(rp, replacement_left);
                            if let Some(rl) = replacement_left {
                                mem.set_parent(rl, Some(rp));
                            }
                            Some(l)
                        }
                    };

                    mem.set_lchild(replacement, new_left);
                    if let Some(nl) = new_left {
                        mem.set_parent(nl, Some(replacement));
                    }
                    mem.set_rchild(replacement, r);
                    if let Some(r) = r {
                        mem.set_parent(r, Some(replacement));
                    }
                    Some(replacement)
                }
            };

            match dp {
                None => self.root = replacement,
                Some(dp) => {
                    if mem.lchild(dp) == Some(bp) {
                        mem.set_lchild(dp, replacement);
                    } else {
                        mem.set_rchild(dp, replacement);
                    }
                }
            }
            if let Some(replacement) = replacement {
                mem.set_parent(replacement, dp);
            }
        }
    }

    /// Finds the smallest free block at least `asize` bytes: a best-fit
    /// descent that remembers the last node still large enough whenever it
    /// steps left, and gives up the match whenever it steps right.
    ///
    /// # Safety
    /// Every node reachable from `self.root` must be a live, linked node in
    /// this tree.
    pub(crate) unsafe fn find_best_fit(&self, mem: HeapMemory, asize: u32) -> Option<BlockOffset> {
        let mut best = None;
        let mut cursor = self.root;
        unsafe {
            while let Some(node) = cursor {
                if mem.size_of(node) >= asize {
                    best = Some(node);
                    cursor = mem.lchild(node);
                } else {
                    cursor = mem.rchild(node);
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{WSIZE, align8, pack};

    /// Builds a scratch heap with one block per requested size, each
    /// un-linked, returning the memory handle and offsets in the order
    /// given.
    fn blocks_of_sizes(sizes: &[u32]) -> (Box<[u8]>, HeapMemory, Vec<BlockOffset>) {
        let mut total = WSIZE;
        for &s in sizes {
            total += align8(s);
        }
        let mut storage = vec![0u8; total as usize].into_boxed_slice();
        let mem = unsafe { HeapMemory::new(storage.as_mut_ptr()) };
        let mut offsets = Vec::new();
        let mut byte_offset = WSIZE;
        for &s in sizes {
            let size = align8(s);
            let bp = BlockOffset::new(byte_offset + WSIZE).unwrap();
            unsafe {
                mem.set_header(bp, pack(size, 0));
                mem.set_footer(bp, size, pack(size, 0));
            }
            offsets.push(bp);
            byte_offset += size;
        }
        (storage, mem, offsets)
    }

    #[test]
    fn finds_best_fit_among_distinct_sizes() {
        let (_storage, mem, blocks) = blocks_of_sizes(&[32, 64, 128, 256]);
        let mut bst = FreeBst::new();
        unsafe {
            for &bp in &blocks {
                bst.insert(mem, bp);
            }
            assert_eq!(bst.find_best_fit(mem, 100), Some(blocks[2]));
            assert_eq!(bst.find_best_fit(mem, 256), Some(blocks[3]));
            assert_eq!(bst.find_best_fit(mem, 257), None);
            assert_eq!(bst.find_best_fit(mem, 1), Some(blocks[0]));
        }
    }

    #[test]
    fn same_size_blocks_chain_and_either_satisfies_a_fit() {
        let (_storage, mem, blocks) = blocks_of_sizes(&[64, 64, 64]);
        let mut bst = FreeBst::new();
        unsafe {
            for &bp in &blocks {
                bst.insert(mem, bp);
            }
            assert!(bst.find_best_fit(mem, 64).is_some());
            // the most recently inserted block becomes the chain head
            assert_eq!(bst.find_best_fit(mem, 64), Some(blocks[2]));
        }
    }

    #[test]
    fn deleting_chain_head_promotes_next_hanger() {
        let (_storage, mem, blocks) = blocks_of_sizes(&[64, 64]);
        let mut bst = FreeBst::new();
        unsafe {
            bst.insert(mem, blocks[0]);
            bst.insert(mem, blocks[1]);
            // blocks[1] is head, blocks[0] is its hanger
            bst.delete(mem, blocks[1]);
            assert_eq!(bst.find_best_fit(mem, 64), Some(blocks[0]));
            bst.delete(mem, blocks[0]);
            assert!(bst.is_empty());
        }
    }

    #[test]
    fn deleting_plain_bst_node_keeps_remaining_sizes_findable() {
        let (_storage, mem, blocks) = blocks_of_sizes(&[32, 64, 96, 128, 160]);
        let mut bst = FreeBst::new();
        unsafe {
            for &bp in &blocks {
                bst.insert(mem, bp);
            }
            bst.delete(mem, blocks[1]); // delete the 64-byte node (has both children)
            assert_eq!(bst.find_best_fit(mem, 50), Some(blocks[2]));
            assert_eq!(bst.find_best_fit(mem, 1), Some(blocks[0]));
            assert_eq!(bst.find_best_fit(mem, 150), Some(blocks[4]));
        }
    }

    #[test]
    fn deleting_root_with_both_children_splices_predecessor() {
        let (_storage, mem, blocks) = blocks_of_sizes(&[50, 30, 70, 20, 40]);
        let mut bst = FreeBst::new();
        unsafe {
            for &bp in &blocks {
                bst.insert(mem, bp);
            }
            bst.delete(mem, blocks[0]); // delete the root (size 50)
            assert_eq!(bst.find_best_fit(mem, 45), Some(blocks[2]));
            assert_eq!(bst.find_best_fit(mem, 35), Some(blocks[4]));
            assert_eq!(bst.find_best_fit(mem, 15), Some(blocks[3]));
        }
    }
}
