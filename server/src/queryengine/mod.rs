/*
 * Created on Tue Jun 03 2025
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

//! # The Query Engine
//!
//! Takes a framed query, uppercases the action name and routes it to its
//! implementation. Each action enforces its own arity; an empty query or
//! one that doesn't match any tag gets an error reply, never a
//! disconnect.

use {
    crate::{
        actions::{self, ActionResult},
        admin,
        corestore::Corestore,
        dbnet::{connection::Connection, BufferedSocketStream},
        protocol::Query,
        resp::{codes, Value},
    },
    crate::gen_match,
};

/// Execute a simple query
pub async fn execute_simple<C: BufferedSocketStream>(
    db: &Corestore,
    con: &mut Connection<C>,
    query: Query,
) -> ActionResult<()> {
    let args = query.into_args();
    let name = match args.first() {
        Some(name) => String::from_utf8_lossy(name).to_uppercase(),
        None => {
            con.write_response(&Value::Err(codes::UNKNOWN, "empty command"))
                .await?;
            con.flush().await?;
            return Ok(());
        }
    };
    let act = &args[1..];
    gen_match!(
        name.as_str(),
        db,
        con,
        act,
        "ZAP" => actions::zap::zap,
        "GET" => actions::get::get,
        "SET" => actions::set::set,
        "DEL" => actions::del::del,
        "KEYS" => actions::keys::keys,
        "ZADD" => actions::zadd::zadd,
        "ZREM" => actions::zrem::zrem,
        "ZSCORE" => actions::zscore::zscore,
        "ZQUERY" => actions::zquery::zquery,
        "PEXPIRE" => actions::pexpire::pexpire,
        "PTTL" => actions::pttl::pttl,
        "SAVE" => admin::snap::save,
        "LOAD" => admin::snap::load
    );
    con.flush().await?;
    Ok(())
}

#[macro_export]
/// A match generator macro built specifically for the
/// `queryengine::execute_simple` function
macro_rules! gen_match {
    ($pre:expr, $db:ident, $con:ident, $act:ident, $($x:pat => $y:path),*) => {
        match $pre {
            // repeat over all the $x => $y patterns, passing in the
            // variables and adding the `.await?` calls
            $(
                $x => $y($db, $con, $act).await?,
            )*
            // and the final case where no action matched
            _ => {
                $con.write_response(&Value::Err(codes::UNKNOWN, "unknown command"))
                    .await?;
            }
        }
    };
}
