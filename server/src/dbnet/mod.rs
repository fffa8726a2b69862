/*
 * Created on Sat May 10 2025
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

//! # Database networking
//!
//! This module ties the whole server together: it binds the listener,
//! spawns the background services (TTL sweep, idle sweep, BGSAVE) and runs
//! the accept loop until a termination signal arrives, after which it
//! waits for every connection handler to drain before handing the engine
//! back to `main` for the final save.

use {
    crate::{
        config::ConfigurationSet,
        corestore::Corestore,
        diskstore, services,
        util::error::PhotonResult,
        IoResult,
    },
    core::future::Future,
    std::{
        sync::{atomic::{AtomicU8, Ordering}, Arc},
        time::Duration,
    },
    tokio::{
        io::{AsyncRead, AsyncWrite},
        sync::broadcast,
        time,
    },
};

pub use self::{idle::IdleTracker, listener::connect};

pub mod connection;
pub mod idle;
mod listener;
pub mod prelude;
mod tcp;

pub const MAXIMUM_CONNECTION_LIMIT: usize = 50000;
const LISTEN_BACKLOG: u32 = 4096;

/// This is a "marker trait" that ensures that no silly types are
/// passed into the [`connection::Connection`] type
pub trait BufferedSocketStream: AsyncRead + AsyncWrite + Unpin {}

/// A receiver for the server-wide shutdown broadcast
pub struct Terminator {
    terminate: bool,
    signal: broadcast::Receiver<()>,
}

impl Terminator {
    pub fn new(signal: broadcast::Receiver<()>) -> Self {
        Terminator {
            terminate: false,
            signal,
        }
    }
    /// Returns whether a signal was already received
    pub fn is_termination_signal(&self) -> bool {
        self.terminate
    }
    /// Wait for the shutdown broadcast
    pub async fn receive_signal(&mut self) {
        let _ = self.signal.recv().await;
        self.terminate = true;
    }
}

/// A backoff implementation that is meant to be used in connection loops
pub(self) struct NetBackoff {
    c: AtomicU8,
}

impl NetBackoff {
    /// The maximum backoff duration
    const MAX_BACKOFF: u8 = 64;
    /// Create a new [`NetBackoff`] instance
    pub const fn new() -> Self {
        Self { c: AtomicU8::new(1) }
    }
    /// Wait for the current backoff duration
    pub async fn spin(&self) {
        let c = self.c.load(Ordering::Relaxed);
        time::sleep(Duration::from_secs(c as _)).await;
        self.c.store(c << 1, Ordering::Relaxed);
    }
    /// Should we disconnect the stream?
    pub fn should_disconnect(&self) -> bool {
        self.c.load(Ordering::Relaxed) > Self::MAX_BACKOFF
    }
}

/// Start the server: restore any saved data, spawn the background
/// services, then accept connections until `termsig` resolves. Returns
/// the engine handle so the caller can run the final save
pub async fn run(
    cfg: ConfigurationSet,
    termsig: impl Future<Output = IoResult<()>>,
) -> PhotonResult<Corestore> {
    // initialize the broadcast channel
    let (signal, _) = broadcast::channel(1);
    let db = Corestore::new(diskstore::PERSIST_FILE.clone());
    match db.load_from_disk()? {
        true => log::info!("Restored data from the snapshot"),
        false => log::info!("No saved data found; starting with an empty keyspace"),
    }
    let tracker = Arc::new(IdleTracker::new(cfg.idle_timeout_ms));

    // initialize the background services
    let bgsave_handle = tokio::spawn(services::bgsave::bgsave_scheduler(
        db.clone(),
        cfg.bgsave,
        Terminator::new(signal.subscribe()),
    ));
    let ttl_handle = tokio::spawn(services::expiry::ttl_scheduler(
        db.clone(),
        Terminator::new(signal.subscribe()),
    ));
    let sweeper_handle = tokio::spawn(services::sweeper::idle_sweeper(
        tracker.clone(),
        Terminator::new(signal.subscribe()),
    ));

    // start the server
    let mut server = connect(
        cfg.host,
        cfg.port,
        cfg.maxcon,
        db.clone(),
        tracker,
        signal.clone(),
    )
    .await?;

    tokio::select! {
        _ = server.run() => {}
        _ = termsig => {}
    }

    log::info!("Signalling all workers to shut down");
    // drop the signal and let others exit
    drop(signal);
    server.base.release_self().await;

    // wait for the background services to terminate
    let _ = bgsave_handle.await;
    let _ = ttl_handle.await;
    let _ = sweeper_handle.await;
    Ok(db)
}
