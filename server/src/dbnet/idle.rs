/*
 * Created on Sat May 03 2025
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

//! # The idle list
//!
//! Connections are threaded onto a circular, sentinel-headed doubly-linked
//! list ordered by their last activity: touching a connection moves its
//! node to the tail, so the head is always the longest-idle connection and
//! the sweeper only ever needs to look at one node to know when to wake up
//! next. Nodes live in a slab and are addressed by `u32` ids, never by
//! pointer.

use {
    crate::corestore::arena::NIL,
    parking_lot::Mutex,
    std::sync::Arc,
    tokio::sync::Notify,
};

#[derive(Debug)]
struct IdleNode {
    prev: u32,
    next: u32,
    last_active: u64,
    /// Kicked or freshly registered handlers are woken through this
    kick: Option<Arc<Notify>>,
}

/// Slot 0 is the sentinel: `sentinel.next` is the head (longest idle),
/// `sentinel.prev` the tail (most recently active)
pub(super) struct IdleList {
    nodes: Vec<IdleNode>,
    free: Vec<u32>,
}

const SENTINEL: u32 = 0;

impl IdleList {
    fn new() -> Self {
        IdleList {
            nodes: vec![IdleNode {
                prev: SENTINEL,
                next: SENTINEL,
                last_active: 0,
                kick: None,
            }],
            free: Vec::new(),
        }
    }
    fn attach_tail(&mut self, id: u32) {
        let tail = self.nodes[SENTINEL as usize].prev;
        self.nodes[id as usize].prev = tail;
        self.nodes[id as usize].next = SENTINEL;
        self.nodes[tail as usize].next = id;
        self.nodes[SENTINEL as usize].prev = id;
    }
    fn detach(&mut self, id: u32) {
        let IdleNode { prev, next, .. } = self.nodes[id as usize];
        self.nodes[prev as usize].next = next;
        self.nodes[next as usize].prev = prev;
        self.nodes[id as usize].prev = NIL;
        self.nodes[id as usize].next = NIL;
    }
    fn is_attached(&self, id: u32) -> bool {
        self.nodes[id as usize].prev != NIL
    }
    fn register(&mut self, now: u64, kick: Arc<Notify>) -> u32 {
        let node = IdleNode {
            prev: NIL,
            next: NIL,
            last_active: now,
            kick: Some(kick),
        };
        let id = match self.free.pop() {
            Some(id) => {
                self.nodes[id as usize] = node;
                id
            }
            None => {
                self.nodes.push(node);
                (self.nodes.len() - 1) as u32
            }
        };
        self.attach_tail(id);
        id
    }
    fn touch(&mut self, id: u32, now: u64) {
        if self.is_attached(id) {
            self.detach(id);
        }
        self.nodes[id as usize].last_active = now;
        self.attach_tail(id);
    }
    fn remove(&mut self, id: u32) {
        if self.is_attached(id) {
            self.detach(id);
        }
        self.nodes[id as usize].kick = None;
        self.free.push(id);
    }
    fn head(&self) -> Option<u32> {
        let head = self.nodes[SENTINEL as usize].next;
        (head != SENTINEL).then_some(head)
    }
    #[cfg(test)]
    fn activity_order(&self) -> Vec<u64> {
        let mut out = Vec::new();
        let mut cur = self.nodes[SENTINEL as usize].next;
        while cur != SENTINEL {
            out.push(self.nodes[cur as usize].last_active);
            cur = self.nodes[cur as usize].next;
        }
        out
    }
}

/// The shared tracker: the idle list behind a mutex plus the sweeper's
/// wake-up bell
pub struct IdleTracker {
    list: Mutex<IdleList>,
    timeout_ms: u64,
    pub wakeup: Notify,
}

impl IdleTracker {
    pub fn new(timeout_ms: u64) -> Self {
        IdleTracker {
            list: Mutex::new(IdleList::new()),
            timeout_ms,
            wakeup: Notify::new(),
        }
    }
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }
    /// Enlist a new connection at the tail and wake the sweeper (the list
    /// may have just gone non-empty)
    pub fn register(&self, now: u64, kick: Arc<Notify>) -> u32 {
        let id = self.list.lock().register(now, kick);
        self.wakeup.notify_one();
        id
    }
    /// Record activity: move the node to the tail
    pub fn touch(&self, id: u32, now: u64) {
        self.list.lock().touch(id, now);
    }
    /// Forget a connection entirely
    pub fn remove(&self, id: u32) {
        self.list.lock().remove(id);
    }
    /// When the longest-idle connection is due to be closed, if any
    pub fn oldest_deadline(&self) -> Option<u64> {
        let list = self.list.lock();
        list.head()
            .map(|id| list.nodes[id as usize].last_active + self.timeout_ms)
    }
    /// Kick every connection that has been idle past the timeout. Kicked
    /// nodes are detached so the sweeper doesn't spin on them; the handler
    /// frees the slot when it exits
    pub fn kick_due(&self, now: u64) -> usize {
        let mut list = self.list.lock();
        let mut kicked = 0;
        while let Some(head) = list.head() {
            let node = &list.nodes[head as usize];
            if node.last_active + self.timeout_ms > now {
                break;
            }
            if let Some(kick) = &node.kick {
                kick.notify_one();
            }
            list.detach(head);
            kicked += 1;
        }
        kicked
    }
}

#[cfg(test)]
mod tests {
    use {super::IdleTracker, std::sync::Arc, tokio::sync::Notify};

    fn bell() -> Arc<Notify> {
        Arc::new(Notify::new())
    }

    #[test]
    fn head_to_tail_activity_is_non_decreasing() {
        let tracker = IdleTracker::new(1000);
        let ids: Vec<u32> = (0..10u64).map(|t| tracker.register(t, bell())).collect();
        // touch a few out of order
        tracker.touch(ids[3], 20);
        tracker.touch(ids[0], 25);
        tracker.touch(ids[7], 25);
        let order = tracker.list.lock().activity_order();
        assert!(order.windows(2).all(|w| w[0] <= w[1]), "order: {:?}", order);
        assert_eq!(order.len(), 10);
    }

    #[test]
    fn oldest_deadline_tracks_the_head() {
        let tracker = IdleTracker::new(100);
        assert_eq!(tracker.oldest_deadline(), None);
        let a = tracker.register(10, bell());
        let _b = tracker.register(20, bell());
        assert_eq!(tracker.oldest_deadline(), Some(110));
        tracker.touch(a, 50);
        assert_eq!(tracker.oldest_deadline(), Some(120));
        tracker.remove(a);
        assert_eq!(tracker.oldest_deadline(), Some(120));
    }

    #[test]
    fn kick_due_detaches_expired_heads_only() {
        let tracker = IdleTracker::new(100);
        let a = tracker.register(0, bell());
        let _b = tracker.register(50, bell());
        let _c = tracker.register(500, bell());
        assert_eq!(tracker.kick_due(200), 2);
        // the kicked nodes are gone from the list but their slots survive
        // until the handlers exit
        assert_eq!(tracker.oldest_deadline(), Some(600));
        tracker.remove(a);
        assert_eq!(tracker.kick_due(200), 0);
    }

    #[test]
    fn slots_are_recycled() {
        let tracker = IdleTracker::new(100);
        let a = tracker.register(0, bell());
        tracker.remove(a);
        let b = tracker.register(1, bell());
        assert_eq!(a, b);
    }
}
