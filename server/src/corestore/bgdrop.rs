/*
 * Created on Tue Mar 25 2025
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

//! # The destructor pool
//!
//! Freeing a sorted set with tens of thousands of members is the one place
//! where a single command could hold up the whole server, so large
//! containers are detached from the keyspace and handed to this small
//! fixed pool of worker threads to be dropped off-thread.
//!
//! Tasks run exactly once, in submission order. The submitted values are
//! fully owned by the task: nothing submitted here is reachable from the
//! keyspace anymore.

use {
    parking_lot::{Condvar, Mutex},
    std::{collections::VecDeque, sync::Arc, thread},
};

/// Worker count. Destruction is pure memory work, a handful is plenty
pub const POOL_SIZE: usize = 4;

type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct PoolState {
    queue: VecDeque<Task>,
    shutdown: bool,
}

struct Inner {
    state: Mutex<PoolState>,
    not_empty: Condvar,
}

pub struct DropPool {
    inner: Arc<Inner>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl DropPool {
    pub fn new(nthreads: usize) -> Self {
        let inner = Arc::new(Inner {
            state: Mutex::new(PoolState::default()),
            not_empty: Condvar::new(),
        });
        let workers = (0..nthreads)
            .map(|i| {
                let inner = inner.clone();
                thread::Builder::new()
                    .name(format!("bgdrop-{i}"))
                    .spawn(move || worker(inner))
                    .expect("failed to spawn a bgdrop worker")
            })
            .collect();
        DropPool { inner, workers }
    }
    /// Queue a task and wake one worker
    pub fn submit(&self, task: impl FnOnce() + Send + 'static) {
        let mut state = self.inner.state.lock();
        state.queue.push_back(Box::new(task));
        drop(state);
        self.inner.not_empty.notify_one();
    }
    #[cfg(test)]
    fn pending(&self) -> usize {
        self.inner.state.lock().queue.len()
    }
}

fn worker(inner: Arc<Inner>) {
    loop {
        let task = {
            let mut state = inner.state.lock();
            loop {
                if let Some(task) = state.queue.pop_front() {
                    break task;
                }
                if state.shutdown {
                    return;
                }
                inner.not_empty.wait(&mut state);
            }
        };
        task();
    }
}

impl Drop for DropPool {
    fn drop(&mut self) {
        // let the workers drain whatever is still queued, then leave
        self.inner.state.lock().shutdown = true;
        self.inner.not_empty.notify_all();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}
