/*
 * Created on Sun Mar 16 2025
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

//! # The sorted set
//!
//! A collection of `(score, name)` members that supports O(1) lookup by
//! name and ordered traversal by `(score, name)`. Every member is a single
//! [`ZNode`] in one arena, chained into the membership hash table *and*
//! linked into the ordered index at the same time.
//!
//! Scores are IEEE-754 doubles and must be finite; the command layer
//! rejects NaN and ±Inf before they get here, which keeps the comparator a
//! total order.

use {
    super::{
        arena::{Arena, NIL},
        avl::{self, AvlStore, Links},
        fnv1a,
        map::{Hmap, MapStore},
    },
    bytes::Bytes,
    std::cmp::Ordering,
};

#[derive(Debug)]
pub struct ZNode {
    pub score: f64,
    pub name: Bytes,
    hcode: u64,
    next: u32,
    links: Links,
}

/// Is `node` strictly less than the probe `(score, name)`? Ties on the
/// score compare names bytewise, then by length
fn zless_key(node: &ZNode, score: f64, name: &[u8]) -> bool {
    if node.score != score {
        return node.score < score;
    }
    let n = node.name.len().min(name.len());
    match node.name[..n].cmp(&name[..n]) {
        Ordering::Less => true,
        Ordering::Greater => false,
        Ordering::Equal => node.name.len() < name.len(),
    }
}

impl AvlStore for Arena<ZNode> {
    fn links(&self, id: u32) -> Links {
        self.get(id).links
    }
    fn links_mut(&mut self, id: u32) -> &mut Links {
        &mut self.get_mut(id).links
    }
    fn lt(&self, a: u32, b: u32) -> bool {
        let rhs = self.get(b);
        zless_key(self.get(a), rhs.score, &rhs.name)
    }
}

impl MapStore for Arena<ZNode> {
    fn hcode(&self, id: u32) -> u64 {
        self.get(id).hcode
    }
    fn next(&self, id: u32) -> u32 {
        self.get(id).next
    }
    fn set_next(&mut self, id: u32, next: u32) {
        self.get_mut(id).next = next;
    }
}

#[derive(Debug)]
pub struct ZSet {
    nodes: Arena<ZNode>,
    index: Hmap,
    root: u32,
}

impl Default for ZSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ZSet {
    pub fn new() -> Self {
        ZSet {
            nodes: Arena::new(),
            index: Hmap::new(),
            root: NIL,
        }
    }
    /// Add a member or update an existing member's score. Returns `true`
    /// only if the member is new
    pub fn insert(&mut self, name: &[u8], score: f64) -> bool {
        debug_assert!(score.is_finite(), "non-finite score got past the parser");
        let existing = self.lookup(name);
        if existing != NIL {
            self.update_score(existing, score);
            false
        } else {
            let id = self.nodes.alloc(ZNode {
                score,
                name: Bytes::copy_from_slice(name),
                hcode: fnv1a(name),
                next: NIL,
                links: Links::detached(),
            });
            self.index.insert(&mut self.nodes, id);
            self.root = avl::insert(&mut self.nodes, self.root, id);
            true
        }
    }
    /// Re-rank a member after a score change; its hash position is
    /// untouched
    fn update_score(&mut self, id: u32, score: f64) {
        if self.nodes.get(id).score == score {
            return;
        }
        self.root = avl::remove(&mut self.nodes, id);
        let node = self.nodes.get_mut(id);
        node.links = Links::detached();
        node.score = score;
        self.root = avl::insert(&mut self.nodes, self.root, id);
    }
    /// Find a member by name, or [`NIL`]
    pub fn lookup(&mut self, name: &[u8]) -> u32 {
        self.index
            .lookup(&mut self.nodes, fnv1a(name), |s, id| {
                s.get(id).name.as_ref() == name
            })
    }
    /// Drop a member from both indexes
    pub fn remove(&mut self, id: u32) {
        let hcode = self.nodes.get(id).hcode;
        let unchained = self
            .index
            .remove(&mut self.nodes, hcode, |_, cand| cand == id);
        assert_ne!(unchained, NIL, "member missing from the membership index");
        self.root = avl::remove(&mut self.nodes, id);
        self.nodes.free(id);
    }
    pub fn node(&self, id: u32) -> &ZNode {
        self.nodes.get(id)
    }
    /// The smallest member `>= (score, name)`, or [`NIL`]
    pub fn seek_ge(&self, score: f64, name: &[u8]) -> u32 {
        let mut found = NIL;
        let mut cur = self.root;
        while cur != NIL {
            let n = self.nodes.get(cur);
            if zless_key(n, score, name) {
                cur = n.links.right;
            } else {
                found = cur;
                cur = n.links.left;
            }
        }
        found
    }
    /// Rank-walk `delta` positions from `id`
    pub fn offset(&self, id: u32, delta: i64) -> u32 {
        avl::offset(&self.nodes, id, delta)
    }
    pub fn len(&self) -> usize {
        self.index.len()
    }
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
    /// Visit every member in unspecified order
    pub fn for_each(&self, mut f: impl FnMut(&ZNode)) {
        self.index.for_each(&self.nodes, |id| {
            f(self.nodes.get(id));
            true
        });
    }
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.index.clear();
        self.root = NIL;
    }
}
