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

//! # `ZQUERY` queries
//! This module provides functions to work with `ZQUERY` queries

use crate::dbnet::prelude::*;

/// Run a `ZQUERY` query: `ZQUERY key score name offset limit`. Walks the
/// members `>= (score, name)`, skips `offset` ranks (which may be
/// negative) and replies with up to `limit` alternating name/score pairs
pub async fn zquery<C: BufferedSocketStream>(
    handle: &Corestore,
    con: &mut Connection<C>,
    act: &[Bytes],
) -> ActionResult<()> {
    ensure_length(act.len(), |len| len == 5)?;
    let score = parse_score(&act[1])?;
    let offset = parse_int(&act[3])?;
    let limit = parse_int(&act[4])?;
    let resp = match handle.keyspace().zquery(&act[0], score, &act[2], offset, limit) {
        Ok(members) => {
            let mut items = Vec::with_capacity(members.len() * 2);
            for (name, score) in members {
                items.push(Value::Str(name));
                items.push(Value::Dbl(score));
            }
            Value::Arr(items)
        }
        Err(_) => Value::Err(codes::BAD_TYPE, "expect zset"),
    };
    con.write_response(&resp).await?;
    Ok(())
}
