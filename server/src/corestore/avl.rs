/*
 * Created on Thu Mar 06 2025
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

//! # The ordered index
//!
//! A self-balancing (AVL) binary tree that lives *inside* a node arena:
//! nodes are identified by their arena ids and the tree only ever touches
//! their [`Links`]. Every node also maintains the size of its subtree,
//! which is what makes rank-relative walks ([`offset`]) logarithmic.
//!
//! The algorithms are bottom-up: mutations rebalance from the deepest
//! touched node to the root, so the caller always gets the (possibly new)
//! root id back.

use super::arena::NIL;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Intra-tree wiring of a node. A detached node has all edges set to
/// [`NIL`] and counts itself as a singleton subtree
pub struct Links {
    pub left: u32,
    pub right: u32,
    pub parent: u32,
    pub height: u32,
    pub count: u32,
}

impl Links {
    pub const fn detached() -> Self {
        Links {
            left: NIL,
            right: NIL,
            parent: NIL,
            height: 1,
            count: 1,
        }
    }
}

impl Default for Links {
    fn default() -> Self {
        Self::detached()
    }
}

/// Storage the tree algorithms run against. `lt` must be a strict total
/// order over the payloads of the stored nodes
pub trait AvlStore {
    fn links(&self, id: u32) -> Links;
    fn links_mut(&mut self, id: u32) -> &mut Links;
    fn lt(&self, a: u32, b: u32) -> bool;
}

fn height<S: AvlStore>(s: &S, id: u32) -> u32 {
    if id == NIL {
        0
    } else {
        s.links(id).height
    }
}

fn count<S: AvlStore>(s: &S, id: u32) -> u32 {
    if id == NIL {
        0
    } else {
        s.links(id).count
    }
}

fn update<S: AvlStore>(s: &mut S, id: u32) {
    let Links { left, right, .. } = s.links(id);
    let h = height(s, left).max(height(s, right)) + 1;
    let c = count(s, left) + count(s, right) + 1;
    let links = s.links_mut(id);
    links.height = h;
    links.count = c;
}

fn rot_left<S: AvlStore>(s: &mut S, node: u32) -> u32 {
    let parent = s.links(node).parent;
    let new_root = s.links(node).right;
    let inner = s.links(new_root).left;
    s.links_mut(node).right = inner;
    if inner != NIL {
        s.links_mut(inner).parent = node;
    }
    s.links_mut(new_root).parent = parent;
    s.links_mut(new_root).left = node;
    s.links_mut(node).parent = new_root;
    update(s, node);
    update(s, new_root);
    new_root
}

fn rot_right<S: AvlStore>(s: &mut S, node: u32) -> u32 {
    let parent = s.links(node).parent;
    let new_root = s.links(node).left;
    let inner = s.links(new_root).right;
    s.links_mut(node).left = inner;
    if inner != NIL {
        s.links_mut(inner).parent = node;
    }
    s.links_mut(new_root).parent = parent;
    s.links_mut(new_root).right = node;
    s.links_mut(node).parent = new_root;
    update(s, node);
    update(s, new_root);
    new_root
}

/// The left subtree is taller by two: LL or LR
fn fix_left<S: AvlStore>(s: &mut S, node: u32) -> u32 {
    let left = s.links(node).left;
    if height(s, s.links(left).left) < height(s, s.links(left).right) {
        let new_left = rot_left(s, left);
        s.links_mut(node).left = new_left;
    }
    rot_right(s, node)
}

/// The right subtree is taller by two: RR or RL
fn fix_right<S: AvlStore>(s: &mut S, node: u32) -> u32 {
    let right = s.links(node).right;
    if height(s, s.links(right).right) < height(s, s.links(right).left) {
        let new_right = rot_right(s, right);
        s.links_mut(node).right = new_right;
    }
    rot_left(s, node)
}

/// Re-establish heights, counts and balance from `node` up to the root.
/// Returns the root id
fn fix<S: AvlStore>(s: &mut S, mut node: u32) -> u32 {
    loop {
        update(s, node);
        let parent = s.links(node).parent;
        let from_left = parent != NIL && s.links(parent).left == node;
        let lh = height(s, s.links(node).left);
        let rh = height(s, s.links(node).right);
        let fixed = if lh == rh + 2 {
            fix_left(s, node)
        } else if lh + 2 == rh {
            fix_right(s, node)
        } else {
            node
        };
        if parent == NIL {
            return fixed;
        }
        if from_left {
            s.links_mut(parent).left = fixed;
        } else {
            s.links_mut(parent).right = fixed;
        }
        node = parent;
    }
}

/// Insert the detached node `id` into the tree rooted at `root` and return
/// the new root
pub fn insert<S: AvlStore>(s: &mut S, root: u32, id: u32) -> u32 {
    debug_assert_eq!(s.links(id), Links::detached(), "inserting a linked node");
    let mut cur = root;
    let mut parent = NIL;
    let mut went_left = false;
    while cur != NIL {
        parent = cur;
        went_left = s.lt(id, cur);
        cur = if went_left {
            s.links(cur).left
        } else {
            s.links(cur).right
        };
    }
    s.links_mut(id).parent = parent;
    if parent != NIL {
        if went_left {
            s.links_mut(parent).left = id;
        } else {
            s.links_mut(parent).right = id;
        }
    }
    fix(s, id)
}

/// Splice out a node with at most one child and return the tree root
fn remove_easy<S: AvlStore>(s: &mut S, node: u32) -> u32 {
    let Links {
        left,
        right,
        parent,
        ..
    } = s.links(node);
    debug_assert!(left == NIL || right == NIL);
    let child = if left != NIL { left } else { right };
    if child != NIL {
        s.links_mut(child).parent = parent;
    }
    if parent == NIL {
        return child;
    }
    if s.links(parent).left == node {
        s.links_mut(parent).left = child;
    } else {
        s.links_mut(parent).right = child;
    }
    fix(s, parent)
}

/// Detach `node` from the tree and return the new root. The node's links
/// are left stale; reset them before reusing the node
pub fn remove<S: AvlStore>(s: &mut S, node: u32) -> u32 {
    let Links { left, right, .. } = s.links(node);
    if left == NIL || right == NIL {
        return remove_easy(s, node);
    }
    // two children: splice out the in-order successor, then graft it into
    // this node's slot
    let mut succ = right;
    while s.links(succ).left != NIL {
        succ = s.links(succ).left;
    }
    let root = remove_easy(s, succ);
    // rebalancing above may have rewired `node`, so take its links only now
    let node_links = s.links(node);
    *s.links_mut(succ) = node_links;
    let Links {
        left,
        right,
        parent,
        ..
    } = node_links;
    if left != NIL {
        s.links_mut(left).parent = succ;
    }
    if right != NIL {
        s.links_mut(right).parent = succ;
    }
    if parent == NIL {
        succ
    } else {
        if s.links(parent).left == node {
            s.links_mut(parent).left = succ;
        } else {
            s.links_mut(parent).right = succ;
        }
        root
    }
}

/// Walk `offset` ranks from `node` (positive towards larger elements,
/// negative towards smaller ones) in O(log n) using the subtree counts.
/// Returns [`NIL`] when the walk leaves the tree
pub fn offset<S: AvlStore>(s: &S, node: u32, offset: i64) -> u32 {
    if node == NIL {
        return NIL;
    }
    let mut node = node;
    let mut pos = 0i64; // rank relative to the starting node
    while pos != offset {
        let Links {
            left,
            right,
            parent,
            ..
        } = s.links(node);
        if pos < offset && pos + count(s, right) as i64 >= offset {
            // target is inside the right subtree
            node = right;
            pos += count(s, s.links(node).left) as i64 + 1;
        } else if pos > offset && pos - (count(s, left) as i64) <= offset {
            // target is inside the left subtree
            node = left;
            pos -= count(s, s.links(node).right) as i64 + 1;
        } else {
            // walk up
            if parent == NIL {
                return NIL;
            }
            if s.links(parent).right == node {
                pos -= count(s, left) as i64 + 1;
            } else {
                pos += count(s, right) as i64 + 1;
            }
            node = parent;
        }
    }
    node
}

#[cfg(test)]
mod tests {
    use {
        super::{insert, offset, remove, AvlStore, Links, NIL},
        rand::{seq::SliceRandom, Rng},
    };

    struct TestStore {
        nodes: Vec<(Links, u64)>,
    }

    impl TestStore {
        fn new() -> Self {
            TestStore { nodes: Vec::new() }
        }
        fn push(&mut self, key: u64) -> u32 {
            self.nodes.push((Links::detached(), key));
            (self.nodes.len() - 1) as u32
        }
        fn key(&self, id: u32) -> u64 {
            self.nodes[id as usize].1
        }
    }

    impl AvlStore for TestStore {
        fn links(&self, id: u32) -> Links {
            self.nodes[id as usize].0
        }
        fn links_mut(&mut self, id: u32) -> &mut Links {
            &mut self.nodes[id as usize].0
        }
        fn lt(&self, a: u32, b: u32) -> bool {
            self.key(a) < self.key(b)
        }
    }

    /// Recursively check balance, counts, parents and ordering; returns
    /// (height, count)
    fn validate(s: &TestStore, id: u32, parent: u32) -> (u32, u32) {
        if id == NIL {
            return (0, 0);
        }
        let links = s.links(id);
        assert_eq!(links.parent, parent, "parent link broken");
        let (lh, lc) = validate(s, links.left, id);
        let (rh, rc) = validate(s, links.right, id);
        assert!(lh.abs_diff(rh) <= 1, "imbalanced at {}", id);
        assert_eq!(links.height, lh.max(rh) + 1, "stale height at {}", id);
        assert_eq!(links.count, lc + rc + 1, "stale count at {}", id);
        if links.left != NIL {
            assert!(s.key(links.left) < s.key(id));
        }
        if links.right != NIL {
            assert!(s.key(id) < s.key(links.right));
        }
        (links.height, links.count)
    }

    fn in_order(s: &TestStore, root: u32) -> Vec<u64> {
        let mut out = Vec::new();
        let mut stack = Vec::new();
        let mut cur = root;
        while cur != NIL || !stack.is_empty() {
            while cur != NIL {
                stack.push(cur);
                cur = s.links(cur).left;
            }
            let id = stack.pop().unwrap();
            out.push(s.key(id));
            cur = s.links(id).right;
        }
        out
    }

    #[test]
    fn insert_keeps_balance_and_order() {
        let mut rng = rand::thread_rng();
        let mut keys: Vec<u64> = (0..512).collect();
        keys.shuffle(&mut rng);
        let mut s = TestStore::new();
        let mut root = NIL;
        for &k in &keys {
            let id = s.push(k);
            root = insert(&mut s, root, id);
            validate(&s, root, NIL);
        }
        let expected: Vec<u64> = (0..512).collect();
        assert_eq!(in_order(&s, root), expected);
    }

    #[test]
    fn remove_keeps_balance_and_order() {
        let mut rng = rand::thread_rng();
        let mut keys: Vec<u64> = (0..256).collect();
        keys.shuffle(&mut rng);
        let mut s = TestStore::new();
        let mut root = NIL;
        let mut ids = Vec::new();
        for &k in &keys {
            let id = s.push(k);
            ids.push(id);
            root = insert(&mut s, root, id);
        }
        ids.shuffle(&mut rng);
        let mut remaining: Vec<u64> = keys.clone();
        for id in ids {
            root = remove(&mut s, id);
            remaining.retain(|&k| k != s.key(id));
            if root != NIL {
                validate(&s, root, NIL);
            }
            let mut expected = remaining.clone();
            expected.sort_unstable();
            assert_eq!(in_order(&s, root), expected);
        }
        assert_eq!(root, NIL);
    }

    #[test]
    fn offset_matches_linear_rank() {
        let mut rng = rand::thread_rng();
        let mut s = TestStore::new();
        let mut root = NIL;
        let n = 200u64;
        let mut keys: Vec<u64> = (0..n).collect();
        keys.shuffle(&mut rng);
        let mut id_of = vec![0u32; n as usize];
        for &k in &keys {
            let id = s.push(k);
            id_of[k as usize] = id;
            root = insert(&mut s, root, id);
        }
        for _ in 0..1000 {
            let start = rng.gen_range(0..n);
            let delta = rng.gen_range(-(n as i64) - 5..(n as i64) + 5);
            let got = offset(&s, id_of[start as usize], delta);
            let target = start as i64 + delta;
            if target < 0 || target >= n as i64 {
                assert_eq!(got, NIL);
            } else {
                assert_eq!(s.key(got), target as u64);
            }
        }
    }
}
