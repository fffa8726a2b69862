/*
 * Created on Mon May 26 2025
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

//! # Actions
//!
//! Actions are like shell commands, you provide arguments -- they return
//! output. This module contains a collection of the actions supported by
//! Photon

pub mod del;
pub mod get;
pub mod keys;
pub mod pexpire;
pub mod pttl;
pub mod set;
pub mod zadd;
pub mod zquery;
pub mod zrem;
pub mod zscore;

use {
    crate::{
        resp::{codes, Value},
        util,
    },
    std::io::Error as IoError,
};

/// A generic result for actions
pub type ActionResult<T> = Result<T, ActionError>;

/// Errors that can occur while running actions
#[derive(Debug)]
pub enum ActionError {
    /// A reply to hand to the client; the connection lives on
    ActionError(Value),
    /// The connection itself failed
    IoError(IoError),
}

impl From<Value> for ActionError {
    fn from(e: Value) -> Self {
        Self::ActionError(e)
    }
}

impl From<IoError> for ActionError {
    fn from(e: IoError) -> Self {
        Self::IoError(e)
    }
}

pub fn ensure_length(len: usize, is_valid: fn(usize) -> bool) -> ActionResult<()> {
    if util::compiler::likely(is_valid(len)) {
        Ok(())
    } else {
        util::err(Value::Err(codes::BAD_ARG, "wrong number of arguments"))
    }
}

/// Parse a decimal signed 64-bit integer argument
pub fn parse_int(raw: &[u8]) -> ActionResult<i64> {
    match std::str::from_utf8(raw).ok().and_then(|s| s.parse().ok()) {
        Some(int) => Ok(int),
        None => util::err(Value::Err(codes::BAD_ARG, "expected int")),
    }
}

/// Parse a score argument. NaN and the infinities are rejected so that
/// the sorted-set comparator stays a total order
pub fn parse_score(raw: &[u8]) -> ActionResult<f64> {
    match std::str::from_utf8(raw).ok().and_then(|s| s.parse::<f64>().ok()) {
        Some(score) if score.is_finite() => Ok(score),
        _ => util::err(Value::Err(codes::BAD_ARG, "expected float")),
    }
}

pub mod zap {
    //! Respond to `ZAP` health probes
    use crate::dbnet::prelude::*;

    /// Returns a `ZING` to prove we're alive
    pub async fn zap<C: BufferedSocketStream>(
        _handle: &Corestore,
        con: &mut Connection<C>,
        act: &[Bytes],
    ) -> ActionResult<()> {
        ensure_length(act.len(), |len| len == 0)?;
        con.write_response(&Value::str(&b"ZING"[..])).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_int, parse_score, ActionError};
    use crate::resp::{codes, Value};

    fn code_of<T: std::fmt::Debug>(r: super::ActionResult<T>) -> u32 {
        match r.unwrap_err() {
            ActionError::ActionError(Value::Err(code, _)) => code,
            other => panic!("expected a client error, got {:?}", other),
        }
    }

    #[test]
    fn integer_arguments() {
        assert_eq!(parse_int(b"42").unwrap(), 42);
        assert_eq!(parse_int(b"-7").unwrap(), -7);
        assert_eq!(code_of(parse_int(b"4.2")), codes::BAD_ARG);
        assert_eq!(code_of(parse_int(b"")), codes::BAD_ARG);
        assert_eq!(code_of(parse_int(b"x")), codes::BAD_ARG);
    }

    #[test]
    fn score_arguments() {
        assert_eq!(parse_score(b"1.5").unwrap(), 1.5);
        assert_eq!(parse_score(b"-0").unwrap(), 0.0);
        assert_eq!(code_of(parse_score(b"nan")), codes::BAD_ARG);
        assert_eq!(code_of(parse_score(b"inf")), codes::BAD_ARG);
        assert_eq!(code_of(parse_score(b"-inf")), codes::BAD_ARG);
        assert_eq!(code_of(parse_score(b"zzz")), codes::BAD_ARG);
    }
}
