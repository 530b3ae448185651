//! Slot allocation: per-block empty rings, block class lists, and the
//! search for a branching base that fits a whole label set.
//!
//! Blocks are classified by how useful they are to the allocator: `Full`
//! blocks have no empty slot, `Closed` blocks have exactly one (or have
//! failed too many scans), `Open` blocks are general candidates. Block 0 is
//! special: it backs the root's initial base and never joins a class list.

use crate::node::{Block, Node, BLOCK_SIZE, VALUE_LIMIT};
use crate::DoubleArray;

#[derive(Clone, Copy, PartialEq, Eq)]
enum BlockClass {
    Full,
    Closed,
    Open,
}

impl DoubleArray {
    fn head(&self, class: BlockClass) -> i64 {
        match class {
            BlockClass::Full => self.head_full,
            BlockClass::Closed => self.head_closed,
            BlockClass::Open => self.head_open,
        }
    }

    fn set_head(&mut self, class: BlockClass, idx: i64) {
        match class {
            BlockClass::Full => self.head_full = idx,
            BlockClass::Closed => self.head_closed = idx,
            BlockClass::Open => self.head_open = idx,
        }
    }

    /// Links block `idx` into a class list. With `empty` the list is assumed
    /// empty and the block becomes its sole, self-linked member; otherwise
    /// the block is spliced in at the head position. The `Full` list is
    /// threaded through block 0 as a sentinel, so it is always pushed with
    /// `empty == false`.
    fn push_block(&mut self, idx: usize, class: BlockClass, empty: bool) {
        if empty {
            self.set_head(class, idx as i64);
            self.blocks[idx].prev = idx as i64;
            self.blocks[idx].next = idx as i64;
        } else {
            let head = self.head(class) as usize;
            let tail = self.blocks[head].prev as usize;
            self.blocks[idx].prev = tail as i64;
            self.blocks[idx].next = head as i64;
            self.set_head(class, idx as i64);
            self.blocks[head].prev = idx as i64;
            self.blocks[tail].next = idx as i64;
        }
    }

    /// Unlinks block `idx` from a class list. `last` marks the sole-member
    /// case, where clearing the head is all that is needed.
    fn pop_block(&mut self, idx: usize, class: BlockClass, last: bool) {
        if last {
            self.set_head(class, 0);
        } else {
            let prev = self.blocks[idx].prev as usize;
            let next = self.blocks[idx].next as usize;
            self.blocks[prev].next = next as i64;
            self.blocks[next].prev = prev as i64;
            if idx as i64 == self.head(class) {
                self.set_head(class, next as i64);
            }
        }
    }

    fn transfer_block(&mut self, idx: usize, from: BlockClass, to: BlockClass) {
        let last = idx as i64 == self.blocks[idx].next;
        self.pop_block(idx, from, last);
        let empty = self.head(to) == 0 && self.blocks[idx].num != 0;
        self.push_block(idx, to, empty);
    }

    /// Appends one block of fresh empty slots, wires its ring, and puts it
    /// at the head of the `Open` list. Returns the new block's index.
    fn add_block(&mut self) -> usize {
        if self.size == self.capacity {
            self.capacity *= 2;
            self.array.reserve(self.capacity - self.array.len());
            self.infos.reserve(self.capacity - self.infos.len());
        }
        let idx = self.size >> 8;
        self.blocks.push(Block::default());
        self.blocks[idx].ehead = self.size as i64;

        let s = self.size as i64;
        self.array.resize(self.size + BLOCK_SIZE, Node::default());
        self.infos.resize(self.size + BLOCK_SIZE, Default::default());
        self.array[self.size] = Node {
            value: -(s + 255),
            check: -(s + 1),
        };
        for i in self.size + 1..self.size + 255 {
            self.array[i] = Node {
                value: -((i - 1) as i64),
                check: -((i + 1) as i64),
            };
        }
        self.array[self.size + 255] = Node {
            value: -(s + 254),
            check: -s,
        };

        let empty = self.head_open == 0;
        self.push_block(idx, BlockClass::Open, empty);
        self.size += BLOCK_SIZE;
        idx
    }

    /// Any single empty slot, preferring nearly-full blocks so that sparse
    /// blocks stay available for larger label sets. Grows the array when
    /// every block is full.
    pub(crate) fn any_free_slot(&mut self) -> usize {
        if self.head_closed != 0 {
            return self.blocks[self.head_closed as usize].ehead as usize;
        }
        if self.head_open != 0 {
            return self.blocks[self.head_open as usize].ehead as usize;
        }
        self.add_block() << 8
    }

    /// An empty slot `e` such that, with `base = e ^ labels[0]`, every
    /// `base ^ label` is empty. Scans the `Open` list with the per-block
    /// `num`/`reject` admission test; blocks that fail `max_trial` scans are
    /// demoted to `Closed`. Grows the array when no block fits.
    ///
    /// `labels` must be non-empty; single-label requests should use
    /// [`DoubleArray::any_free_slot`] instead.
    pub(crate) fn matching_free_slot(&mut self, labels: &[u8]) -> usize {
        let mut idx = self.head_open as usize;
        if idx != 0 {
            let last = self.blocks[idx].prev as usize;
            let want = labels.len() as i64;
            loop {
                let b = self.blocks[idx];
                if b.num >= want && want < b.reject {
                    let mut e = b.ehead as usize;
                    loop {
                        let base = e as i64 ^ labels[0] as i64;
                        if labels[1..]
                            .iter()
                            .all(|&l| self.array[(base ^ l as i64) as usize].check < 0)
                        {
                            self.blocks[idx].ehead = e as i64;
                            return e;
                        }
                        e = (-self.array[e].check) as usize;
                        if e as i64 == self.blocks[idx].ehead {
                            break;
                        }
                    }
                }
                self.blocks[idx].reject = want;
                if self.blocks[idx].reject < self.reject[self.blocks[idx].num as usize] {
                    self.reject[self.blocks[idx].num as usize] = self.blocks[idx].reject;
                }
                let next = self.blocks[idx].next as usize;
                self.blocks[idx].trial += 1;
                if self.blocks[idx].trial == self.max_trial {
                    self.transfer_block(idx, BlockClass::Open, BlockClass::Closed);
                }
                if idx == last {
                    break;
                }
                idx = next;
            }
        }
        self.add_block() << 8
    }

    /// Reserves one empty slot and parents it to `from`.
    ///
    /// With `base >= 0` the slot is the fixed position `base ^ label`,
    /// which the caller has verified to be empty; with `base < 0` the slot
    /// is chosen freely and `from`'s base is rewritten to match. The slot is
    /// unlinked from its block's empty ring and initialized to an
    /// unassigned terminal (`VALUE_LIMIT`).
    pub(crate) fn take_slot(&mut self, base: i64, label: u8, from: usize) -> usize {
        let e = if base < 0 {
            self.any_free_slot()
        } else {
            (base ^ label as i64) as usize
        };
        let idx = e >> 8;
        let Node { value, check } = self.array[e];

        self.blocks[idx].num -= 1;
        if self.blocks[idx].num == 0 {
            if idx != 0 {
                self.transfer_block(idx, BlockClass::Closed, BlockClass::Full);
            }
        } else {
            self.array[(-value) as usize].check = check;
            self.array[(-check) as usize].value = value;
            if e as i64 == self.blocks[idx].ehead {
                self.blocks[idx].ehead = -check;
            }
            if idx != 0 && self.blocks[idx].num == 1 && self.blocks[idx].trial != self.max_trial {
                self.transfer_block(idx, BlockClass::Open, BlockClass::Closed);
            }
        }

        self.array[e].value = VALUE_LIMIT;
        self.array[e].check = from as i64;
        if base < 0 {
            self.array[from].value = -(e as i64 ^ label as i64) - 1;
        }
        e
    }

    /// Returns slot `e` to its block's empty ring and rebalances the
    /// block's class.
    pub(crate) fn release_slot(&mut self, e: usize) {
        let idx = e >> 8;
        self.blocks[idx].num += 1;
        if self.blocks[idx].num == 1 {
            self.blocks[idx].ehead = e as i64;
            self.array[e] = Node {
                value: -(e as i64),
                check: -(e as i64),
            };
            if idx != 0 {
                self.transfer_block(idx, BlockClass::Full, BlockClass::Closed);
            }
        } else {
            let prev = self.blocks[idx].ehead as usize;
            let next = (-self.array[prev].check) as usize;
            self.array[e] = Node {
                value: -(prev as i64),
                check: -(next as i64),
            };
            self.array[prev].check = -(e as i64);
            self.array[next].value = -(e as i64);
            if (self.blocks[idx].num == 2 || self.blocks[idx].trial == self.max_trial) && idx != 0 {
                self.transfer_block(idx, BlockClass::Closed, BlockClass::Open);
            }
            self.blocks[idx].trial = 0;
        }
        let floor = self.reject[self.blocks[idx].num as usize];
        if self.blocks[idx].reject < floor {
            self.blocks[idx].reject = floor;
        }
        self.infos[e] = Default::default();
    }
}
