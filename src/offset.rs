//! A 32-bit offset relative to the heap base, with the zero offset reserved
//! as the "no block" sentinel.
//!
//! The original allocator stores every intra-heap pointer as a 4-byte offset
//! and uses the offset `0` (the heap base itself, occupied by the prologue)
//! to mean "none". Modeling that convention with `NonZeroU32` wrapped in
//! `Option` makes the sentinel part of the type instead of a value every
//! accessor has to remember to check.

use std::num::NonZeroU32;

/// The offset of a block's payload (its `bp` in the original layout),
/// relative to the heap's base address. Never zero: zero is reserved for the
/// prologue and is represented as `None` wherever a link may be absent.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct BlockOffset(NonZeroU32);

impl BlockOffset {
    /// Wraps a raw offset, returning `None` if it is zero.
    #[inline]
    pub(crate) fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    /// The raw offset value.
    #[inline]
    pub(crate) fn get(self) -> u32 {
        self.0.get()
    }
}

/// Packs an `Option<BlockOffset>` back down to the raw-offset-or-zero
/// encoding used on the wire (i.e. inside block payload fields).
#[inline]
pub(crate) fn encode(offset: Option<BlockOffset>) -> u32 {
    offset.map_or(0, BlockOffset::get)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_none() {
        assert_eq!(BlockOffset::new(0), None);
    }

    #[test]
    fn nonzero_round_trips() {
        let off = BlockOffset::new(24).unwrap();
        assert_eq!(off.get(), 24);
        assert_eq!(encode(Some(off)), 24);
        assert_eq!(encode(None), 0);
    }
}
