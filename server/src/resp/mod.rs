/*
 * Created on Thu Apr 10 2025
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

//! # The wire protocol (response side)
//!
//! Responses are tagged values, wrapped in the same `u32` length prefix as
//! requests. The encoder reserves the four length bytes up front and
//! back-patches them once the body is known; a body that breaches the
//! frame cap is thrown away and replaced by `ERR(TOO_BIG)` so the client
//! always gets *some* well-formed reply.

use {
    crate::protocol::MAX_FRAME,
    bytes::{BufMut, Bytes, BytesMut},
};

pub const TAG_NIL: u8 = 0;
pub const TAG_ERR: u8 = 1;
pub const TAG_STR: u8 = 2;
pub const TAG_INT: u8 = 3;
pub const TAG_DBL: u8 = 4;
pub const TAG_ARR: u8 = 5;
pub const TAG_OK: u8 = 6;

/// Error codes surfaced to clients
pub mod codes {
    /// Unknown command or shape
    pub const UNKNOWN: u32 = 1;
    /// The encoded response exceeded the frame cap
    pub const TOO_BIG: u32 = 2;
    /// The key exists with an incompatible type
    pub const BAD_TYPE: u32 = 3;
    /// Arity or value-format error
    pub const BAD_ARG: u32 = 4;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Ok,
    Str(Bytes),
    Int(i64),
    Dbl(f64),
    Err(u32, &'static str),
    Arr(Vec<Value>),
}

impl Value {
    pub fn str(data: impl Into<Bytes>) -> Self {
        Value::Str(data.into())
    }
}

fn write_value(out: &mut BytesMut, value: &Value) {
    match value {
        Value::Nil => out.put_u8(TAG_NIL),
        Value::Ok => out.put_u8(TAG_OK),
        Value::Str(data) => {
            out.put_u8(TAG_STR);
            out.put_u32_le(data.len() as u32);
            out.put_slice(data);
        }
        Value::Int(int) => {
            out.put_u8(TAG_INT);
            out.put_i64_le(*int);
        }
        Value::Dbl(dbl) => {
            out.put_u8(TAG_DBL);
            out.put_f64_le(*dbl);
        }
        Value::Err(code, msg) => {
            out.put_u8(TAG_ERR);
            out.put_u32_le(*code);
            out.put_u32_le(msg.len() as u32);
            out.put_slice(msg.as_bytes());
        }
        Value::Arr(items) => {
            out.put_u8(TAG_ARR);
            out.put_u32_le(items.len() as u32);
            for item in items {
                write_value(out, item);
            }
        }
    }
}

/// Append one length-framed response to `out`
pub fn encode_response(out: &mut BytesMut, value: &Value) {
    let header = out.len();
    out.put_u32_le(0); // patched below
    write_value(out, value);
    let mut body_len = out.len() - header - 4;
    if body_len > MAX_FRAME {
        out.truncate(header + 4);
        write_value(out, &Value::Err(codes::TOO_BIG, "response is too big"));
        body_len = out.len() - header - 4;
    }
    out[header..header + 4].copy_from_slice(&(body_len as u32).to_le_bytes());
}


#[cfg(test)]
mod tests {
    use super::{codes, de::decode_response, encode_response, Value};
    use bytes::{Bytes, BytesMut};

    fn roundtrip(value: Value) -> Value {
        let mut out = BytesMut::new();
        encode_response(&mut out, &value);
        let (decoded, consumed) = decode_response(&out);
        assert_eq!(consumed, out.len());
        decoded
    }

    #[test]
    fn scalar_frames() {
        assert_eq!(roundtrip(Value::Nil), Value::Nil);
        assert_eq!(roundtrip(Value::Ok), Value::Ok);
        assert_eq!(roundtrip(Value::Int(-42)), Value::Int(-42));
        assert_eq!(roundtrip(Value::Dbl(2.5)), Value::Dbl(2.5));
        assert_eq!(
            roundtrip(Value::str(&b"ZING"[..])),
            Value::Str(Bytes::from_static(b"ZING"))
        );
    }

    #[test]
    fn nested_array_frame() {
        let arr = Value::Arr(vec![
            Value::str(&b"a"[..]),
            Value::Dbl(1.0),
            Value::Arr(vec![Value::Nil]),
        ]);
        assert_eq!(roundtrip(arr.clone()), arr);
    }

    #[test]
    fn oversized_body_becomes_too_big_error() {
        let huge = Value::Str(Bytes::from(vec![b'x'; crate::protocol::MAX_FRAME + 1]));
        match roundtrip(huge) {
            Value::Err(code, _) => assert_eq!(code, codes::TOO_BIG),
            other => panic!("expected TOO_BIG, got {:?}", other),
        }
    }

    #[test]
    fn responses_concatenate_cleanly() {
        let mut out = BytesMut::new();
        encode_response(&mut out, &Value::Ok);
        encode_response(&mut out, &Value::Int(7));
        let (first, used) = decode_response(&out);
        assert_eq!(first, Value::Ok);
        let (second, _) = decode_response(&out[used..]);
        assert_eq!(second, Value::Int(7));
    }
}
