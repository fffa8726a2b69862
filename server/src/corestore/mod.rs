/*
 * Created on Fri Mar 28 2025
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

//! # The in-memory engine
//!
//! The [`Keyspace`] is the top level of the engine: a progressive hash
//! table of [`Entry`] records (strings and sorted sets) plus the timer
//! heap that tracks per-key expiry deadlines. All of it lives behind one
//! mutex inside [`Corestore`], which is the cheaply-cloneable handle the
//! rest of the server passes around. Every keyspace access, from command
//! handlers to the expiry sweep, is serialized through that single lock.

pub mod arena;
pub mod avl;
pub mod bgdrop;
pub mod heap;
pub mod map;
pub mod zset;

use {
    self::{
        arena::{Arena, NIL},
        bgdrop::DropPool,
        heap::{BackRef, TimerHeap},
        map::{Hmap, MapStore},
        zset::ZSet,
    },
    crate::{diskstore, util::error::PhotonResult},
    bytes::Bytes,
    parking_lot::{Mutex, MutexGuard},
    std::{
        path::{Path, PathBuf},
        sync::Arc,
    },
    tokio::sync::Notify,
};

/// 64-bit FNV-1a over raw key/member bytes
pub(crate) fn fnv1a(data: &[u8]) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    let mut h = FNV_OFFSET;
    for &byte in data {
        h ^= byte as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

/// Sorted sets larger than this are destroyed on the bgdrop pool instead
/// of inline
pub const LARGE_SET_THRESHOLD: usize = 1000;
/// Upper bound on keys expired in a single sweep
pub const EXPIRE_BUDGET: usize = 2000;

#[derive(Debug)]
pub enum Payload {
    Str(Bytes),
    Zset(ZSet),
}

#[derive(Debug)]
/// A top-level keyspace record. The `next` link chains it into the
/// keyspace table; `heap_pos` is its slot in the timer heap ([`NIL`] when
/// the key has no TTL)
pub struct Entry {
    key: Bytes,
    hcode: u64,
    next: u32,
    heap_pos: u32,
    payload: Payload,
}

impl Entry {
    pub fn key(&self) -> &Bytes {
        &self.key
    }
    pub fn payload(&self) -> &Payload {
        &self.payload
    }
}

impl MapStore for Arena<Entry> {
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

impl BackRef for Arena<Entry> {
    fn heap_pos(&self, owner: u32) -> u32 {
        self.get(owner).heap_pos
    }
    fn set_heap_pos(&mut self, owner: u32, pos: u32) {
        self.get_mut(owner).heap_pos = pos;
    }
}

#[derive(Debug, PartialEq, Eq)]
/// The key exists with an incompatible type
pub struct WrongType;

#[derive(Debug, PartialEq, Eq)]
pub enum Ttl {
    NoKey,
    NoExpiry,
    Remaining(u64),
}

/// Dispose of a detached entry, shipping oversized sorted sets to the
/// destructor pool
fn dispose_entry(entry: Entry, pool: &DropPool) {
    match entry.payload {
        Payload::Zset(zset) if zset.len() > LARGE_SET_THRESHOLD => {
            pool.submit(move || drop(zset))
        }
        _ => {}
    }
}

#[derive(Debug, Default)]
pub struct Keyspace {
    entries: Arena<Entry>,
    table: Hmap,
    timers: TimerHeap,
}

impl Keyspace {
    pub fn new() -> Self {
        Self::default()
    }
    fn find(&mut self, key: &[u8]) -> u32 {
        self.table
            .lookup(&mut self.entries, fnv1a(key), |s, id| {
                s.get(id).key.as_ref() == key
            })
    }
    fn create(&mut self, key: &[u8], payload: Payload) -> u32 {
        let id = self.entries.alloc(Entry {
            key: Bytes::copy_from_slice(key),
            hcode: fnv1a(key),
            next: NIL,
            heap_pos: NIL,
            payload,
        });
        self.table.insert(&mut self.entries, id);
        id
    }
    pub fn len(&self) -> usize {
        self.table.len()
    }
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    // string ops

    pub fn get(&mut self, key: &[u8]) -> Result<Option<Bytes>, WrongType> {
        let id = self.find(key);
        if id == NIL {
            return Ok(None);
        }
        match &self.entries.get(id).payload {
            Payload::Str(value) => Ok(Some(value.clone())),
            Payload::Zset(_) => Err(WrongType),
        }
    }
    pub fn set(&mut self, key: &[u8], value: Bytes) -> Result<(), WrongType> {
        let id = self.find(key);
        if id == NIL {
            self.create(key, Payload::Str(value));
            return Ok(());
        }
        match &mut self.entries.get_mut(id).payload {
            Payload::Str(slot) => {
                *slot = value;
                Ok(())
            }
            Payload::Zset(_) => Err(WrongType),
        }
    }
    /// Delete a key of any type. Returns whether it existed
    pub fn del(&mut self, key: &[u8], pool: &DropPool) -> bool {
        let id = self
            .table
            .remove(&mut self.entries, fnv1a(key), |s, cand| {
                s.get(cand).key.as_ref() == key
            });
        if id == NIL {
            return false;
        }
        self.dispose(id, pool);
        true
    }
    fn dispose(&mut self, id: u32, pool: &DropPool) {
        self.timers.remove(&mut self.entries, id);
        let entry = self.entries.free(id);
        dispose_entry(entry, pool);
    }
    pub fn keys(&self) -> Vec<Bytes> {
        let mut out = Vec::with_capacity(self.len());
        self.table.for_each(&self.entries, |id| {
            out.push(self.entries.get(id).key.clone());
            true
        });
        out
    }

    // expiry ops

    /// Set (`ttl_ms >= 0`) or remove (`ttl_ms < 0`) a key's TTL. Returns
    /// whether the key existed
    pub fn set_ttl(&mut self, key: &[u8], ttl_ms: i64, now: u64) -> bool {
        let id = self.find(key);
        if id == NIL {
            return false;
        }
        if ttl_ms < 0 {
            self.timers.remove(&mut self.entries, id);
        } else {
            self.timers
                .upsert(&mut self.entries, id, now + ttl_ms as u64);
        }
        true
    }
    pub fn ttl(&mut self, key: &[u8], now: u64) -> Ttl {
        let id = self.find(key);
        if id == NIL {
            return Ttl::NoKey;
        }
        match self.timers.deadline_of(&self.entries, id) {
            None => Ttl::NoExpiry,
            Some(deadline) => Ttl::Remaining(deadline.saturating_sub(now)),
        }
    }
    /// The soonest deadline across all keys
    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.peek().map(|item| item.deadline)
    }
    /// Delete keys whose deadline has passed, up to [`EXPIRE_BUDGET`] per
    /// call. Returns the number of keys deleted
    pub fn expire_due(&mut self, now: u64, pool: &DropPool) -> usize {
        let mut nworks = 0;
        while nworks < EXPIRE_BUDGET {
            let due = match self.timers.peek() {
                Some(item) if item.deadline < now => item,
                _ => break,
            };
            let hcode = self.entries.get(due.owner).hcode;
            let removed = self
                .table
                .remove(&mut self.entries, hcode, |_, cand| cand == due.owner);
            assert_eq!(
                removed, due.owner,
                "expired key missing from the keyspace table"
            );
            self.dispose(due.owner, pool);
            nworks += 1;
        }
        nworks
    }

    // sorted set ops

    fn zset_mut(&mut self, key: &[u8]) -> Result<Option<&mut ZSet>, WrongType> {
        let id = self.find(key);
        if id == NIL {
            return Ok(None);
        }
        match &mut self.entries.get_mut(id).payload {
            Payload::Zset(zset) => Ok(Some(zset)),
            Payload::Str(_) => Err(WrongType),
        }
    }
    /// Add a member (or update its score), creating the set if the key is
    /// new. Returns whether the member is new
    pub fn zadd(&mut self, key: &[u8], score: f64, name: &[u8]) -> Result<bool, WrongType> {
        let mut id = self.find(key);
        if id == NIL {
            id = self.create(key, Payload::Zset(ZSet::new()));
        }
        match &mut self.entries.get_mut(id).payload {
            Payload::Zset(zset) => Ok(zset.insert(name, score)),
            Payload::Str(_) => Err(WrongType),
        }
    }
    pub fn zrem(&mut self, key: &[u8], name: &[u8]) -> Result<bool, WrongType> {
        match self.zset_mut(key)? {
            // an absent key is an empty set
            None => Ok(false),
            Some(zset) => {
                let id = zset.lookup(name);
                if id == NIL {
                    Ok(false)
                } else {
                    zset.remove(id);
                    Ok(true)
                }
            }
        }
    }
    pub fn zscore(&mut self, key: &[u8], name: &[u8]) -> Result<Option<f64>, WrongType> {
        match self.zset_mut(key)? {
            None => Ok(None),
            Some(zset) => {
                let id = zset.lookup(name);
                if id == NIL {
                    Ok(None)
                } else {
                    Ok(Some(zset.node(id).score))
                }
            }
        }
    }
    /// Members `>= (score, name)` shifted by `offset` ranks, at most
    /// `limit` of them
    pub fn zquery(
        &mut self,
        key: &[u8],
        score: f64,
        name: &[u8],
        offset: i64,
        limit: i64,
    ) -> Result<Vec<(Bytes, f64)>, WrongType> {
        if limit <= 0 {
            // still surface the type error for mistyped keys
            return self.zset_mut(key).map(|_| Vec::new());
        }
        let zset = match self.zset_mut(key)? {
            None => return Ok(Vec::new()),
            Some(zset) => zset,
        };
        let mut cur = zset.seek_ge(score, name);
        cur = zset.offset(cur, offset);
        let mut out = Vec::new();
        while cur != NIL && (out.len() as i64) < limit {
            let node = zset.node(cur);
            out.push((node.name.clone(), node.score));
            cur = zset.offset(cur, 1);
        }
        Ok(out)
    }

    // whole-keyspace ops

    /// Visit every entry in unspecified order
    pub fn scan(&self, mut f: impl FnMut(&Entry)) {
        self.table.for_each(&self.entries, |id| {
            f(self.entries.get(id));
            true
        });
    }
    /// Drop everything (oversized sets on the pool) and reset all indexes
    pub fn clear(&mut self, pool: &DropPool) {
        self.table.clear();
        self.timers = TimerHeap::new();
        let drained: Vec<Entry> = self.entries.drain().collect();
        for entry in drained {
            dispose_entry(entry, pool);
        }
    }
}

/// Shared server state behind the [`Corestore`] handle
pub struct Shared {
    table: Mutex<Keyspace>,
    bgdrop: DropPool,
    ttl_wakeup: Notify,
    snap_path: PathBuf,
}

#[derive(Clone)]
/// A thread-safe handle to the engine: cloning just bumps an `Arc`
pub struct Corestore {
    shared: Arc<Shared>,
}

impl Corestore {
    pub fn new(snap_path: PathBuf) -> Self {
        Corestore {
            shared: Arc::new(Shared {
                table: Mutex::new(Keyspace::new()),
                bgdrop: DropPool::new(bgdrop::POOL_SIZE),
                ttl_wakeup: Notify::new(),
                snap_path,
            }),
        }
    }
    /// Lock and return the keyspace. Handlers hold this only for the
    /// duration of one command
    pub fn keyspace(&self) -> MutexGuard<'_, Keyspace> {
        self.shared.table.lock()
    }
    pub fn pool(&self) -> &DropPool {
        &self.shared.bgdrop
    }
    /// Wakes the TTL sweeper; called whenever a nearer deadline may have
    /// been installed
    pub fn notify_ttl(&self) {
        self.shared.ttl_wakeup.notify_one()
    }
    pub fn ttl_wakeup(&self) -> &Notify {
        &self.shared.ttl_wakeup
    }
    pub fn snap_path(&self) -> &Path {
        &self.shared.snap_path
    }
    /// Write a snapshot of the current keyspace to the snapshot file.
    /// The image is encoded under the keyspace lock and flushed after it
    /// is released
    pub fn save_to_disk(&self) -> PhotonResult<()> {
        let image = {
            let keyspace = self.keyspace();
            diskstore::encode(&keyspace)
        };
        diskstore::flush_to(self.snap_path(), &image)
    }
    /// Replace the keyspace with the contents of the snapshot file.
    /// Returns `false` if there is no snapshot. The file is fully decoded
    /// before the keyspace is touched
    pub fn load_from_disk(&self) -> PhotonResult<bool> {
        let raw = match diskstore::read_from(self.snap_path())? {
            None => return Ok(false),
            Some(raw) => raw,
        };
        let decoded = diskstore::decode(&raw)?;
        let mut keyspace = self.keyspace();
        keyspace.clear(self.pool());
        for (key, payload) in decoded {
            match payload {
                diskstore::DecodedPayload::Str(value) => {
                    let _ = keyspace.set(&key, value);
                }
                diskstore::DecodedPayload::Zset(members) => {
                    for (score, name) in members {
                        let _ = keyspace.zadd(&key, score, &name);
                    }
                }
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::{bgdrop::DropPool, Keyspace, Payload, Ttl, WrongType},
        bytes::Bytes,
    };

    fn pool() -> DropPool {
        DropPool::new(1)
    }

    #[test]
    fn string_lifecycle() {
        let pool = pool();
        let mut ks = Keyspace::new();
        assert_eq!(ks.get(b"foo"), Ok(None));
        ks.set(b"foo", Bytes::from_static(b"bar")).unwrap();
        assert_eq!(ks.get(b"foo"), Ok(Some(Bytes::from_static(b"bar"))));
        ks.set(b"foo", Bytes::from_static(b"baz")).unwrap();
        assert_eq!(ks.get(b"foo"), Ok(Some(Bytes::from_static(b"baz"))));
        assert!(ks.del(b"foo", &pool));
        assert!(!ks.del(b"foo", &pool));
        assert_eq!(ks.get(b"foo"), Ok(None));
    }

    #[test]
    fn type_conflicts_are_rejected_without_destruction() {
        let pool = pool();
        let mut ks = Keyspace::new();
        ks.zadd(b"scores", 1.0, b"a").unwrap();
        assert_eq!(ks.set(b"scores", Bytes::from_static(b"x")), Err(WrongType));
        assert_eq!(ks.get(b"scores"), Err(WrongType));
        // the sorted set survived the failed overwrite
        assert_eq!(ks.zscore(b"scores", b"a"), Ok(Some(1.0)));
        ks.set(b"plain", Bytes::from_static(b"v")).unwrap();
        assert_eq!(ks.zadd(b"plain", 1.0, b"a"), Err(WrongType));
        assert_eq!(ks.zrem(b"plain", b"a"), Err(WrongType));
        drop(pool);
    }

    #[test]
    fn absent_keys_behave_as_empty_sets() {
        let mut ks = Keyspace::new();
        assert_eq!(ks.zrem(b"nope", b"a"), Ok(false));
        assert_eq!(ks.zscore(b"nope", b"a"), Ok(None));
        assert_eq!(ks.zquery(b"nope", 0.0, b"", 0, 10), Ok(Vec::new()));
    }

    #[test]
    fn zquery_offsets_and_limits() {
        let mut ks = Keyspace::new();
        for (name, score) in [("a", 1.0), ("b", 2.0), ("c", 2.0), ("d", 3.0)] {
            ks.zadd(b"s", score, name.as_bytes()).unwrap();
        }
        let all = ks.zquery(b"s", f64::MIN, b"", 0, 100).unwrap();
        let names: Vec<&[u8]> = all.iter().map(|(n, _)| n.as_ref()).collect();
        assert_eq!(names, vec![&b"a"[..], b"b", b"c", b"d"]);
        // limit bounds the number of pairs
        assert_eq!(ks.zquery(b"s", f64::MIN, b"", 0, 2).unwrap().len(), 2);
        assert_eq!(ks.zquery(b"s", f64::MIN, b"", 0, 0), Ok(Vec::new()));
        // negative offset walks back from the seek position
        let tail = ks.zquery(b"s", 3.0, b"", -2, 10).unwrap();
        let names: Vec<&[u8]> = tail.iter().map(|(n, _)| n.as_ref()).collect();
        assert_eq!(names, vec![&b"b"[..], b"c", b"d"]);
        // seeking past the end yields nothing
        assert_eq!(ks.zquery(b"s", 9.0, b"", 0, 10), Ok(Vec::new()));
    }

    #[test]
    fn ttl_lifecycle_and_expiry_budget() {
        let pool = pool();
        let mut ks = Keyspace::new();
        assert_eq!(ks.ttl(b"k", 0), Ttl::NoKey);
        assert!(!ks.set_ttl(b"k", 100, 0));
        ks.set(b"k", Bytes::from_static(b"v")).unwrap();
        assert_eq!(ks.ttl(b"k", 0), Ttl::NoExpiry);
        assert!(ks.set_ttl(b"k", 100, 0));
        assert_eq!(ks.ttl(b"k", 40), Ttl::Remaining(60));
        // a deadline in the past clamps to zero
        assert_eq!(ks.ttl(b"k", 1000), Ttl::Remaining(0));
        // removing the ttl makes the key persistent again
        assert!(ks.set_ttl(b"k", -1, 0));
        assert_eq!(ks.ttl(b"k", 0), Ttl::NoExpiry);
        // re-arm and expire
        ks.set_ttl(b"k", 10, 0);
        assert_eq!(ks.expire_due(5, &pool), 0);
        assert_eq!(ks.expire_due(11, &pool), 1);
        assert_eq!(ks.get(b"k"), Ok(None));
        assert_eq!(ks.next_deadline(), None);
    }

    #[test]
    fn expired_sets_leave_no_timers_behind() {
        let pool = pool();
        let mut ks = Keyspace::new();
        for i in 0..10 {
            let key = format!("k{}", i);
            ks.zadd(key.as_bytes(), i as f64, b"m").unwrap();
            ks.set_ttl(key.as_bytes(), i, 0);
        }
        assert_eq!(ks.next_deadline(), Some(0));
        let n = ks.expire_due(100, &pool);
        assert_eq!(n, 10);
        assert!(ks.is_empty());
        assert_eq!(ks.next_deadline(), None);
    }

    #[test]
    fn scan_sees_every_entry() {
        let mut ks = Keyspace::new();
        for i in 0..50 {
            ks.set(format!("k{}", i).as_bytes(), Bytes::from_static(b"v"))
                .unwrap();
        }
        ks.zadd(b"z", 1.0, b"m").unwrap();
        let mut strings = 0;
        let mut sets = 0;
        ks.scan(|entry| match entry.payload() {
            Payload::Str(_) => strings += 1,
            Payload::Zset(_) => sets += 1,
        });
        assert_eq!((strings, sets), (50, 1));
    }
}
