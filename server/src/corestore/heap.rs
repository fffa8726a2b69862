/*
 * Created on Wed Mar 12 2025
 *
 * This file is a part of Photon
 * Photon is a free and open-source in-memory key/value database with
 * Redis-style semantics written by Sayan Nandan ("the Author") with the
 * vision to provide a small, fast and predictable data layer without
 * compromising on correctness.
 *
 * Copyright (c) 2025, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! # The timer heap
//!
//! An array-backed binary min-heap of `(deadline, owner)` pairs keyed on
//! the deadline. The owner of each slot remembers its current position in
//! the heap (via [`BackRef`]), so a deadline can be updated or removed in
//! O(log n) without searching. Every movement inside the heap writes the
//! moved item's new position back to its owner; a mismatch between the two
//! sides is unrecoverable corruption and aborts the process.

use super::arena::NIL;

/// The owner side of the back-reference: position [`NIL`] means "not in
/// the heap"
pub trait BackRef {
    fn heap_pos(&self, owner: u32) -> u32;
    fn set_heap_pos(&mut self, owner: u32, pos: u32);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerItem {
    pub deadline: u64,
    pub owner: u32,
}

#[derive(Debug, Default)]
pub struct TimerHeap {
    items: Vec<TimerItem>,
}

impl TimerHeap {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn len(&self) -> usize {
        self.items.len()
    }
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
    /// The soonest-expiring item, if any
    pub fn peek(&self) -> Option<TimerItem> {
        self.items.first().copied()
    }
    /// The owner's current deadline, if it has a timer
    pub fn deadline_of<S: BackRef>(&self, s: &S, owner: u32) -> Option<u64> {
        let pos = s.heap_pos(owner);
        if pos == NIL {
            return None;
        }
        let item = self.items[pos as usize];
        assert_eq!(item.owner, owner, "timer heap back-reference mismatch");
        Some(item.deadline)
    }
    fn place<S: BackRef>(&mut self, s: &mut S, pos: usize, item: TimerItem) {
        self.items[pos] = item;
        s.set_heap_pos(item.owner, pos as u32);
    }
    fn sift_up<S: BackRef>(&mut self, s: &mut S, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if self.items[parent].deadline <= self.items[pos].deadline {
                break;
            }
            let (child_item, parent_item) = (self.items[pos], self.items[parent]);
            self.place(s, pos, parent_item);
            self.place(s, parent, child_item);
            pos = parent;
        }
    }
    fn sift_down<S: BackRef>(&mut self, s: &mut S, mut pos: usize) {
        let len = self.items.len();
        loop {
            let left = 2 * pos + 1;
            let right = 2 * pos + 2;
            let mut smallest = pos;
            if left < len && self.items[left].deadline < self.items[smallest].deadline {
                smallest = left;
            }
            if right < len && self.items[right].deadline < self.items[smallest].deadline {
                smallest = right;
            }
            if smallest == pos {
                break;
            }
            let (a, b) = (self.items[pos], self.items[smallest]);
            self.place(s, pos, b);
            self.place(s, smallest, a);
            pos = smallest;
        }
    }
    fn update<S: BackRef>(&mut self, s: &mut S, pos: usize) {
        if pos > 0 && self.items[pos].deadline < self.items[(pos - 1) / 2].deadline {
            self.sift_up(s, pos)
        } else {
            self.sift_down(s, pos)
        }
    }
    /// Install or overwrite the owner's deadline
    pub fn upsert<S: BackRef>(&mut self, s: &mut S, owner: u32, deadline: u64) {
        let pos = s.heap_pos(owner);
        if pos == NIL {
            self.items.push(TimerItem { deadline, owner });
            let pos = self.items.len() - 1;
            s.set_heap_pos(owner, pos as u32);
            self.update(s, pos);
        } else {
            let pos = pos as usize;
            assert_eq!(
                self.items[pos].owner, owner,
                "timer heap back-reference mismatch"
            );
            self.items[pos].deadline = deadline;
            self.update(s, pos);
        }
    }
    /// Drop the owner's timer, if it has one
    pub fn remove<S: BackRef>(&mut self, s: &mut S, owner: u32) {
        let pos = s.heap_pos(owner);
        if pos == NIL {
            return;
        }
        let pos = pos as usize;
        assert_eq!(
            self.items[pos].owner, owner,
            "timer heap back-reference mismatch"
        );
        s.set_heap_pos(owner, NIL);
        let last = self.items.pop().expect("timer heap underflow");
        if pos < self.items.len() {
            // the displaced tail item takes the vacated slot
            self.place(s, pos, last);
            self.update(s, pos);
        }
    }
}
