/*
 * Created on Fri May 30 2025
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

//! # `PEXPIRE` queries
//! This module provides functions to work with `PEXPIRE` queries

use crate::dbnet::prelude::*;

/// Run a `PEXPIRE` query: `PEXPIRE key ttl_ms`. A negative TTL removes
/// the deadline. Replies 1 if the key exists
pub async fn pexpire<C: BufferedSocketStream>(
    handle: &Corestore,
    con: &mut Connection<C>,
    act: &[Bytes],
) -> ActionResult<()> {
    ensure_length(act.len(), |len| len == 2)?;
    let ttl_ms = parse_int(&act[1])?;
    let exists = handle.keyspace().set_ttl(&act[0], ttl_ms, monotonic_ms());
    if exists && ttl_ms >= 0 {
        // the new deadline may be the nearest one; wake the sweeper
        handle.notify_ttl();
    }
    con.write_response(&Value::Int(exists as i64)).await?;
    Ok(())
}
