/*
 * Created on Wed May 28 2025
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

//! # `ZREM` queries
//! This module provides functions to work with `ZREM` queries

use crate::dbnet::prelude::*;

/// Run a `ZREM` query: `ZREM key name`. An absent key is an empty set
pub async fn zrem<C: BufferedSocketStream>(
    handle: &Corestore,
    con: &mut Connection<C>,
    act: &[Bytes],
) -> ActionResult<()> {
    ensure_length(act.len(), |len| len == 2)?;
    let resp = match handle.keyspace().zrem(&act[0], &act[1]) {
        Ok(removed) => Value::Int(removed as i64),
        Err(_) => Value::Err(codes::BAD_TYPE, "expect zset"),
    };
    con.write_response(&resp).await?;
    Ok(())
}
