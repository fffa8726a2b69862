/*
 * Created on Tue May 06 2025
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

//! # Connections and their handlers
//!
//! A [`Connection`] owns the socket, the buffered writer around it and the
//! read buffer that requests are framed out of. The [`ConnectionHandler`]
//! drives it: read a whole request, execute it, write the reply, repeat.
//! That loop is what gives a pipelining client strictly ordered responses
//! on each connection.

use {
    super::{idle::IdleTracker, BufferedSocketStream, Terminator},
    crate::{
        actions::ActionError,
        corestore::Corestore,
        protocol::{self, ParseError, Query},
        queryengine,
        resp::{self, Value},
        util::monotonic_ms,
        IoResult,
    },
    bytes::{Buf, BytesMut},
    std::sync::Arc,
    tokio::{
        io::{AsyncReadExt, AsyncWriteExt, BufWriter},
        sync::{mpsc, Notify, Semaphore},
    },
};

/// Result of [`Connection::read_query`]
pub enum QueryResult {
    /// A whole request, framed and parsed
    Q(Query),
    /// Clean EOF from the client
    Disconnected,
    /// The client sent something that can never parse; drop it
    Malformed,
}

pub struct Connection<T> {
    stream: BufWriter<T>,
    buffer: BytesMut,
    scratch: BytesMut,
}

impl<T> Connection<T>
where
    T: BufferedSocketStream,
{
    pub fn new(stream: T) -> Self {
        Connection {
            stream: BufWriter::new(stream),
            buffer: BytesMut::with_capacity(libphoton::BUF_CAP),
            scratch: BytesMut::new(),
        }
    }
    /// Return the next whole request, reading from the socket only when
    /// the buffer doesn't already hold one (so pipelined requests are
    /// served strictly in arrival order)
    pub async fn read_query(&mut self) -> IoResult<QueryResult> {
        loop {
            match protocol::try_parse(&self.buffer) {
                Ok((query, advance)) => {
                    self.buffer.advance(advance);
                    return Ok(QueryResult::Q(query));
                }
                Err(ParseError::NotEnough) => {}
                Err(ParseError::TooBig) | Err(ParseError::BadPacket) => {
                    log::debug!("dropping client: unparseable frame");
                    return Ok(QueryResult::Malformed);
                }
            }
            if self.stream.read_buf(&mut self.buffer).await? == 0 {
                if !self.buffer.is_empty() {
                    log::debug!("client went away mid-frame");
                }
                return Ok(QueryResult::Disconnected);
            }
        }
    }
    /// Encode and queue one response frame
    pub async fn write_response(&mut self, value: &Value) -> IoResult<()> {
        self.scratch.clear();
        resp::encode_response(&mut self.scratch, value);
        self.stream.write_all(&self.scratch).await
    }
    pub async fn flush(&mut self) -> IoResult<()> {
        self.stream.flush().await
    }
}

/// Drives one client connection to completion
pub struct ConnectionHandler<C> {
    /// an atomic reference to the shared in-memory engine
    db: Corestore,
    /// the connection
    con: Connection<C>,
    /// the semaphore used to impose limits on number of connections
    climit: Arc<Semaphore>,
    /// check for termination signals
    terminator: Terminator,
    /// the sender we drop when we're done with the connection (used for
    /// graceful exit)
    _term_sig_tx: mpsc::Sender<()>,
    /// the shared idle list
    tracker: Arc<IdleTracker>,
    /// this connection's node in the idle list
    idle_id: u32,
    /// rung by the sweeper when we've idled too long
    kick: Arc<Notify>,
    last_active: u64,
}

impl<C> ConnectionHandler<C>
where
    C: BufferedSocketStream,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Corestore,
        con: Connection<C>,
        climit: Arc<Semaphore>,
        terminator: Terminator,
        _term_sig_tx: mpsc::Sender<()>,
        tracker: Arc<IdleTracker>,
        idle_id: u32,
        kick: Arc<Notify>,
        last_active: u64,
    ) -> Self {
        Self {
            db,
            con,
            climit,
            terminator,
            _term_sig_tx,
            tracker,
            idle_id,
            kick,
            last_active,
        }
    }
    pub async fn run(&mut self) -> IoResult<()> {
        log::debug!("ConnectionHandler initialized to handle a remote client");
        while !self.terminator.is_termination_signal() {
            let packet = tokio::select! {
                pkt = self.con.read_query() => pkt?,
                _ = self.terminator.receive_signal() => {
                    return Ok(());
                }
                _ = self.kick.notified() => {
                    let now = monotonic_ms();
                    if now.saturating_sub(self.last_active) >= self.tracker.timeout_ms() {
                        log::info!("removing idle connection");
                        return Ok(());
                    }
                    // the sweep raced a fresh request, and handling that
                    // request already re-enlisted us; ignore the stale kick
                    continue;
                }
            };
            match packet {
                QueryResult::Q(query) => {
                    self.last_active = monotonic_ms();
                    self.tracker.touch(self.idle_id, self.last_active);
                    match queryengine::execute_simple(&self.db, &mut self.con, query).await {
                        Ok(()) => {}
                        Err(ActionError::ActionError(e)) => {
                            self.con.write_response(&e).await?;
                            self.con.flush().await?;
                        }
                        Err(ActionError::IoError(e)) => return Err(e),
                    }
                }
                QueryResult::Malformed => return Ok(()),
                QueryResult::Disconnected => return Ok(()),
            }
        }
        Ok(())
    }
}

impl<C> Drop for ConnectionHandler<C> {
    fn drop(&mut self) {
        // return the permit and leave the idle list even if run() panicked
        self.climit.add_permits(1);
        self.tracker.remove(self.idle_id);
    }
}
