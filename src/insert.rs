//! The write path: building paths byte by byte, keeping sibling rings
//! ordered, and relocating child sets when a fixed position collides.

use crate::node::VALUE_LIMIT;
use crate::{DoubleArray, TrieError};

impl DoubleArray {
    /// Inserts `key` with `value`, overwriting any previous value.
    ///
    /// Fails with [`TrieError::InvalidValue`] when `value` is negative or
    /// not below [`VALUE_LIMIT`].
    pub fn insert(&mut self, key: &[u8], value: i64) -> Result<(), TrieError> {
        if !(0..VALUE_LIMIT).contains(&value) {
            return Err(TrieError::InvalidValue);
        }
        let slot = self.terminal_slot(key);
        self.array[slot].value = value;
        Ok(())
    }

    /// Adds `delta` to the value stored under `key`, inserting the key with
    /// value `delta` when it is absent.
    ///
    /// Fails with [`TrieError::InvalidValue`], before touching any state,
    /// when the resulting value would leave `[0, VALUE_LIMIT)`.
    pub fn update(&mut self, key: &[u8], delta: i64) -> Result<(), TrieError> {
        let next = match self.get(key) {
            Ok(current) => current.checked_add(delta).ok_or(TrieError::InvalidValue)?,
            Err(_) => delta,
        };
        if !(0..VALUE_LIMIT).contains(&next) {
            return Err(TrieError::InvalidValue);
        }
        let slot = self.terminal_slot(key);
        self.array[slot].value = next;
        Ok(())
    }

    /// Removes `key` and releases every slot that served only this key.
    ///
    /// Fails with [`TrieError::NoPath`] when the key is not present. Keys
    /// that `key` is a prefix of are unaffected.
    pub fn delete(&mut self, key: &[u8]) -> Result<(), TrieError> {
        let mut to = self.jump(key, 0)?;
        while self.array[to].value < 0 {
            // internal node: the key's value, if any, lives down its chain
            // of label-0 children
            let vs = self.array[to].base() as usize;
            if vs != 0 && self.array[vs].check == to as i64 {
                to = vs;
            } else {
                return Err(TrieError::NoPath);
            }
        }
        if self.array[to].value == VALUE_LIMIT {
            return Err(TrieError::NoPath);
        }

        while to > 0 {
            let from = self.array[to].check as usize;
            let base = self.array[from].base();
            let label = (base ^ to as i64) as u8;
            // a node with siblings (or one that is not the ring head) is the
            // last slot this key owns: drop it from the ring and stop
            if self.infos[to].sibling != 0 || self.infos[from].child != label {
                self.unlink_sibling(from, base, label);
                self.release_slot(to);
                break;
            }
            self.release_slot(to);
            to = from;
            if to == 0 {
                self.infos[0].child = 0;
            }
        }
        Ok(())
    }

    /// Resolves the slot whose `value` field stores `key`'s value, creating
    /// the path as needed: the terminal node itself when it is a pure leaf,
    /// its label-0 child otherwise.
    fn terminal_slot(&mut self, key: &[u8]) -> usize {
        let mut from = 0;
        for &b in key {
            let value = self.array[from].value;
            if value >= 0 && value != VALUE_LIMIT {
                // branching through an in-place leaf: its value moves into a
                // label-0 child first
                let to = self.child_slot(from, 0);
                self.array[to].value = value;
            }
            from = self.child_slot(from, b);
        }
        let mut to = from;
        while self.array[to].value < 0 {
            to = self.child_slot(to, 0);
        }
        to
    }

    /// The slot of `from`'s child with `label`, created if missing.
    ///
    /// A node without a base gets one from the allocator; a node whose base
    /// leaves the target position empty claims it directly; a collision with
    /// a foreign subtree triggers relocation.
    fn child_slot(&mut self, from: usize, label: u8) -> usize {
        let base = self.array[from].base();
        if base < 0 {
            let e = self.take_slot(base, label, from);
            self.link_sibling(from, e as i64 ^ label as i64, label, false);
            return e;
        }
        let to = (base ^ label as i64) as usize;
        // slot 0 is the root and can never become a child, so a base that
        // maps this label onto it has to move
        if to != 0 && self.array[to].check < 0 {
            let has_child =
                self.array[(base ^ self.infos[from].child as i64) as usize].check == from as i64;
            let e = self.take_slot(base, label, from);
            self.link_sibling(from, base, label, has_child);
            return e;
        }
        if to != 0 && self.array[to].check == from as i64 {
            return to;
        }
        self.relocate(from, base, label)
    }

    /// Splices `label` into `from`'s sibling ring, keeping labels ascending.
    /// `has_child` tells whether the ring is non-empty.
    fn link_sibling(&mut self, from: usize, base: i64, label: u8, has_child: bool) {
        let head = self.infos[from].child;
        let keep_order = if self.ordered { label > head } else { head == 0 };

        // the position to rewrite: `from`'s child field, or a sibling field
        let mut at_head = true;
        let mut slot = from;
        let mut next = head;
        if has_child && keep_order {
            at_head = false;
            slot = (base ^ next as i64) as usize;
            next = self.infos[slot].sibling;
            while self.ordered && next != 0 && next < label {
                slot = (base ^ next as i64) as usize;
                next = self.infos[slot].sibling;
            }
        }
        self.infos[(base ^ label as i64) as usize].sibling = next;
        if at_head {
            self.infos[from].child = label;
        } else {
            self.infos[slot].sibling = label;
        }
    }

    /// Removes `label` from `from`'s sibling ring.
    fn unlink_sibling(&mut self, from: usize, base: i64, label: u8) {
        let mut at_head = true;
        let mut slot = from;
        let mut cur = self.infos[from].child;
        while cur != label {
            slot = (base ^ cur as i64) as usize;
            cur = self.infos[slot].sibling;
            at_head = false;
        }
        let next = self.infos[(base ^ label as i64) as usize].sibling;
        if at_head {
            self.infos[from].child = next;
        } else {
            self.infos[slot].sibling = next;
        }
    }

    /// Collects `from`'s child labels in ring order, optionally splicing in
    /// `label` at its sorted position (`add`), or using `label` as an upper
    /// bound marker with `add == false`.
    fn collect_labels(&self, from: usize, base: i64, label: u8, add: bool) -> Vec<u8> {
        let mut labels = Vec::new();
        let mut c = self.infos[from].child;
        if c == 0 {
            // label 0 is a real child only when its slot points back here
            if self.array[base as usize].check == from as i64 {
                labels.push(0);
                c = self.infos[base as usize].sibling;
            }
        }
        if self.ordered {
            while c != 0 && c < label {
                labels.push(c);
                c = self.infos[(base ^ c as i64) as usize].sibling;
            }
        }
        if add {
            labels.push(label);
        }
        while c != 0 {
            labels.push(c);
            c = self.infos[(base ^ c as i64) as usize].sibling;
        }
        labels
    }

    /// True when `from_n`'s child ring is no larger than `from_p`'s, by
    /// walking both in lockstep.
    fn fewer_children(&self, from_n: usize, base_n: i64, from_p: usize, base_p: i64) -> bool {
        let mut c_n = self.infos[from_n].child;
        let mut c_p = self.infos[from_p].child;
        loop {
            c_n = self.infos[(base_n ^ c_n as i64) as usize].sibling;
            c_p = self.infos[(base_p ^ c_p as i64) as usize].sibling;
            if c_n == 0 || c_p == 0 {
                break;
            }
        }
        c_p != 0
    }

    /// Handles a collision at `base_n ^ label_n`: migrates the child set of
    /// whichever parent owns fewer children to a freshly found base, fixing
    /// grandchild back-pointers, then completes the pending insertion.
    /// Returns the new child's slot.
    ///
    /// Slot ids of migrated subtree roots change; the key set they encode
    /// does not.
    fn relocate(&mut self, mut from_n: usize, base_n: i64, label_n: u8) -> usize {
        let to_pn = (base_n ^ label_n as i64) as usize;
        let (move_n, from_p, base_p) = if to_pn == 0 {
            // the root's slot is not a real collision partner; our own
            // children move unconditionally
            (true, 0, 0)
        } else {
            let from_p = self.array[to_pn].check as usize;
            let base_p = self.array[from_p].base();
            let move_n = self.fewer_children(from_n, base_n, from_p, base_p);
            (move_n, from_p, base_p)
        };

        let labels = if move_n {
            self.collect_labels(from_n, base_n, label_n, true)
        } else {
            self.collect_labels(from_p, base_p, 255, false)
        };
        let base = if labels.len() == 1 {
            self.any_free_slot() as i64 ^ labels[0] as i64
        } else {
            self.matching_free_slot(&labels) as i64 ^ labels[0] as i64
        };

        let (from, old_base) = if move_n {
            (from_n, base_n)
        } else {
            (from_p, base_p)
        };
        if move_n && labels[0] == label_n {
            self.infos[from].child = label_n;
        }
        self.array[from].value = -base - 1;

        for i in 0..labels.len() {
            let label = labels[i];
            let to = self.take_slot(base, label, from);
            let to_old = (old_base ^ label as i64) as usize;
            self.infos[to].sibling = if i == labels.len() - 1 {
                0
            } else {
                labels[i + 1]
            };
            if move_n && to_old == to_pn {
                continue; // the slot of the label being inserted; nothing to move
            }

            self.array[to].value = self.array[to_old].value;
            if self.array[to].value < 0 && label != 0 {
                // an internal child moved: its children must point at the
                // new slot
                let mut c = self.infos[to_old].child;
                self.infos[to].child = c;
                let b = self.array[to].base();
                loop {
                    let grandchild = (b ^ c as i64) as usize;
                    self.array[grandchild].check = to as i64;
                    c = self.infos[grandchild].sibling;
                    if c == 0 {
                        break;
                    }
                }
            }
            if !move_n && to_old == from_n {
                // the insertion parent itself migrated
                from_n = to;
            }
            if !move_n && to_old == to_pn {
                // the contested slot is vacant now; it becomes the new child
                self.link_sibling(from_n, base_n, label_n, true);
                self.infos[to_old].child = 0;
                self.array[to_old].value = VALUE_LIMIT;
                self.array[to_old].check = from_n as i64;
            } else {
                self.release_slot(to_old);
            }
        }

        if move_n {
            (base ^ label_n as i64) as usize
        } else {
            to_pn
        }
    }
}
