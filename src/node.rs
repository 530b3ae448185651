use serde::{Deserialize, Serialize};

/// Exclusive upper bound on stored values, and the sentinel meaning
/// "slot allocated but carrying no value yet".
///
/// Values live in `[0, VALUE_LIMIT)`. The constant is kept well below
/// `i64::MAX` so that the branching-base encoding `-(value + 1)` can never
/// overflow.
pub const VALUE_LIMIT: i64 = 1 << 62;

/// Number of slots per block. Blocks are the unit of array growth and of
/// empty-ring membership.
pub(crate) const BLOCK_SIZE: usize = 256;

/// One slot of the trie array.
///
/// The `value` field is overloaded:
/// - `value >= 0`: the slot terminates a key and carries `value` in place
///   (`VALUE_LIMIT` when freshly allocated and not yet assigned);
/// - `value < 0` and `check >= 0`: the slot is an internal node whose
///   branching base is `-(value + 1)`;
/// - `check < 0`: the slot is empty, and `value`/`check` hold the
///   complement-encoded previous/next links of its block's empty ring.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Node {
    pub value: i64,
    pub check: i64,
}

impl Node {
    /// The branching base of an internal slot. Only meaningful when
    /// `value < 0`; a slot with an in-place value reports a negative base,
    /// which callers use as the "no branching here" signal.
    #[inline]
    pub fn base(&self) -> i64 {
        -(self.value + 1)
    }
}

/// Child-ring bookkeeping for one slot.
///
/// `child` is the smallest label under this node (0 either when the node has
/// a label-0 child, the value slot, or no children at all; the two are told
/// apart by probing `base ^ 0`). `sibling` is the next label in the parent's
/// ring, 0 marking the end.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct NodeInfo {
    pub sibling: u8,
    pub child: u8,
}

/// Per-block bookkeeping: class-list links, free-slot count, allocator
/// admission state, and the entry point into the block's empty ring.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Block {
    pub prev: i64,
    pub next: i64,
    /// Number of empty slots in this block (0..=256).
    pub num: i64,
    /// Lower bound on label-set sizes known not to fit in this block.
    pub reject: i64,
    /// Failed allocation scans since the last slot release.
    pub trial: i64,
    /// One empty slot of this block; entry into the empty ring.
    pub ehead: i64,
}

impl Default for Block {
    fn default() -> Self {
        Block {
            prev: 0,
            next: 0,
            num: BLOCK_SIZE as i64,
            reject: BLOCK_SIZE as i64 + 1,
            trial: 0,
            ehead: 0,
        }
    }
}
