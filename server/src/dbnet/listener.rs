/*
 * Created on Thu May 08 2025
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

use {
    super::{idle::IdleTracker, tcp::Listener, LISTEN_BACKLOG},
    crate::{
        corestore::Corestore,
        util::error::{Error, PhotonResult},
    },
    std::{
        net::{IpAddr, SocketAddr},
        sync::Arc,
    },
    tokio::{
        net::{TcpListener, TcpSocket},
        sync::{broadcast, mpsc, Semaphore},
    },
};

/// The base TCP listener: everything a connection handler needs, plus the
/// shutdown plumbing
pub struct BaseListener {
    /// An atomic reference to the coretable
    pub db: Corestore,
    /// The incoming connection listener (binding)
    pub listener: TcpListener,
    /// The maximum number of connections
    pub climit: Arc<Semaphore>,
    /// The shared idle list
    pub tracker: Arc<IdleTracker>,
    /// The shutdown broadcaster
    pub signal: broadcast::Sender<()>,
    // When all `Sender`s are dropped - the `Receiver` gets a `None` value.
    // We send a clone of `terminate_tx` to each handler
    pub terminate_tx: mpsc::Sender<()>,
    pub terminate_rx: mpsc::Receiver<()>,
}

impl BaseListener {
    pub async fn init(
        db: &Corestore,
        host: IpAddr,
        port: u16,
        climit: Arc<Semaphore>,
        tracker: Arc<IdleTracker>,
        signal: broadcast::Sender<()>,
    ) -> PhotonResult<Self> {
        let (terminate_tx, terminate_rx) = mpsc::channel(1);
        let addr = SocketAddr::new(host, port);
        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .map_err(|e| Error::ioerror_extra(e, "creating the listener socket"))?;
        socket
            .set_reuseaddr(true)
            .map_err(|e| Error::ioerror_extra(e, "setting SO_REUSEADDR"))?;
        socket
            .bind(addr)
            .map_err(|e| Error::ioerror_extra(e, format!("binding to port {port}")))?;
        let listener = socket
            .listen(LISTEN_BACKLOG)
            .map_err(|e| Error::ioerror_extra(e, format!("listening on port {port}")))?;
        Ok(Self {
            db: db.clone(),
            listener,
            climit,
            tracker,
            signal,
            terminate_tx,
            terminate_rx,
        })
    }
    /// Wait for every running connection handler to finish up
    pub async fn release_self(self) {
        let Self {
            mut terminate_rx,
            terminate_tx,
            signal,
            ..
        } = self;
        drop(signal);
        drop(terminate_tx);
        let _ = terminate_rx.recv().await;
    }
}

/// Initialize the database networking
pub async fn connect(
    host: IpAddr,
    port: u16,
    maxcon: usize,
    db: Corestore,
    tracker: Arc<IdleTracker>,
    signal: broadcast::Sender<()>,
) -> PhotonResult<Listener> {
    let climit = Arc::new(Semaphore::new(maxcon));
    let base = BaseListener::init(&db, host, port, climit, tracker, signal).await?;
    let bound = base
        .listener
        .local_addr()
        .map_err(|e| Error::ioerror_extra(e, "reading the bound address"))?;
    log::info!("Server started on photon://{}", bound);
    Ok(Listener::new(base))
}
