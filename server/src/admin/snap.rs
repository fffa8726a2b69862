/*
 * Created on Sun Jun 01 2025
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

//! # `SAVE` and `LOAD` queries
//!
//! On-demand snapshotting. Both commands are serialized against every
//! mutating command by the keyspace lock itself: the snapshot image is
//! captured (or applied) in one critical section, and only the raw file
//! I/O happens off the lock, on the blocking pool.

use crate::dbnet::prelude::*;

/// Run a `SAVE` query: write the snapshot file right now
pub async fn save<C: BufferedSocketStream>(
    handle: &Corestore,
    con: &mut Connection<C>,
    act: &[Bytes],
) -> ActionResult<()> {
    ensure_length(act.len(), |len| len == 0)?;
    let db = handle.clone();
    let saved = tokio::task::spawn_blocking(move || db.save_to_disk())
        .await
        .expect("the snapshot task panicked");
    let resp = match saved {
        Ok(()) => Value::Ok,
        Err(e) => {
            log::error!("SAVE failed with error: {}", e);
            Value::Err(codes::UNKNOWN, "save failed")
        }
    };
    con.write_response(&resp).await?;
    Ok(())
}

/// Run a `LOAD` query: replace the keyspace with the snapshot file
pub async fn load<C: BufferedSocketStream>(
    handle: &Corestore,
    con: &mut Connection<C>,
    act: &[Bytes],
) -> ActionResult<()> {
    ensure_length(act.len(), |len| len == 0)?;
    let db = handle.clone();
    let loaded = tokio::task::spawn_blocking(move || db.load_from_disk())
        .await
        .expect("the snapshot task panicked");
    let resp = match loaded {
        Ok(true) => Value::Ok,
        Ok(false) => Value::Err(codes::UNKNOWN, "load failed"),
        Err(e) => {
            log::error!("LOAD failed with error: {}", e);
            Value::Err(codes::UNKNOWN, "load failed")
        }
    };
    con.write_response(&resp).await?;
    Ok(())
}
