/*
 * Created on Mon Apr 21 2025
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

//! # Snapshot persistence
//!
//! A snapshot is the whole keyspace, little-endian and length-prefixed
//! throughout:
//!
//! ```text
//! | u32 n_entries |
//!   per entry: | u32 klen | key | u32 type |
//!     type 1 (string):     | u32 vlen | value |
//!     type 2 (sorted set): | u32 nmembers | f64 score | u32 nlen | name | ... |
//! ```
//!
//! TTLs are deliberately not persisted: restored keys come back without
//! expiry. Writes always go through a temp file in the same directory and
//! are renamed into place, so a crash mid-save leaves the previous
//! snapshot intact. The decoder trusts nothing: any truncation or
//! nonsense value is a storage error, reported before a single key is
//! touched.

use {
    crate::{
        corestore::{Keyspace, Payload},
        util::error::{Error, PhotonResult},
    },
    bytes::Bytes,
    std::{
        fs,
        io::{ErrorKind, Write},
        path::{Path, PathBuf},
    },
};

lazy_static::lazy_static! {
    /// The default snapshot location, relative to the working directory
    pub static ref PERSIST_FILE: PathBuf = PathBuf::from("./photon.rdb");
}

const TYPE_STR: u32 = 1;
const TYPE_ZSET: u32 = 2;

#[derive(Debug, PartialEq)]
pub enum DecodedPayload {
    Str(Bytes),
    Zset(Vec<(f64, Bytes)>),
}

/// Serialize the keyspace into one contiguous image
pub fn encode(keyspace: &Keyspace) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(keyspace.len() as u32).to_le_bytes());
    keyspace.scan(|entry| {
        out.extend_from_slice(&(entry.key().len() as u32).to_le_bytes());
        out.extend_from_slice(entry.key());
        match entry.payload() {
            Payload::Str(value) => {
                out.extend_from_slice(&TYPE_STR.to_le_bytes());
                out.extend_from_slice(&(value.len() as u32).to_le_bytes());
                out.extend_from_slice(value);
            }
            Payload::Zset(zset) => {
                out.extend_from_slice(&TYPE_ZSET.to_le_bytes());
                out.extend_from_slice(&(zset.len() as u32).to_le_bytes());
                zset.for_each(|node| {
                    out.extend_from_slice(&node.score.to_le_bytes());
                    out.extend_from_slice(&(node.name.len() as u32).to_le_bytes());
                    out.extend_from_slice(&node.name);
                });
            }
        }
    });
    out
}

struct Reader<'a> {
    buf: &'a [u8],
    cursor: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, cursor: 0 }
    }
    fn take(&mut self, n: usize) -> PhotonResult<&'a [u8]> {
        let raw = self
            .buf
            .get(self.cursor..self.cursor.checked_add(n).ok_or_else(truncated)?)
            .ok_or_else(truncated)?;
        self.cursor += n;
        Ok(raw)
    }
    fn u32(&mut self) -> PhotonResult<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }
    fn f64(&mut self) -> PhotonResult<f64> {
        Ok(f64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }
    fn bytes(&mut self) -> PhotonResult<Bytes> {
        let len = self.u32()? as usize;
        Ok(Bytes::copy_from_slice(self.take(len)?))
    }
    fn finished(&self) -> bool {
        self.cursor == self.buf.len()
    }
}

fn truncated() -> Error {
    Error::storage("snapshot is truncated")
}

/// Parse a snapshot image into keys and payloads, validating everything
pub fn decode(buf: &[u8]) -> PhotonResult<Vec<(Bytes, DecodedPayload)>> {
    let mut reader = Reader::new(buf);
    let n_entries = reader.u32()?;
    let mut out = Vec::new();
    for _ in 0..n_entries {
        let key = reader.bytes()?;
        let payload = match reader.u32()? {
            TYPE_STR => DecodedPayload::Str(reader.bytes()?),
            TYPE_ZSET => {
                let nmembers = reader.u32()?;
                let mut members = Vec::new();
                for _ in 0..nmembers {
                    let score = reader.f64()?;
                    if !score.is_finite() {
                        return Err(Error::storage("non-finite score in snapshot"));
                    }
                    let name = reader.bytes()?;
                    members.push((score, name));
                }
                DecodedPayload::Zset(members)
            }
            other => {
                return Err(Error::storage(format!(
                    "unknown entry type {} in snapshot",
                    other
                )))
            }
        };
        out.push((key, payload));
    }
    if !reader.finished() {
        return Err(Error::storage("trailing bytes in snapshot"));
    }
    Ok(out)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Write the image next to `path`, then rename it into place
pub fn flush_to(path: &Path, image: &[u8]) -> PhotonResult<()> {
    let tmp = tmp_path(path);
    let mut file = fs::File::create(&tmp)
        .map_err(|e| Error::ioerror_extra(e, format!("creating {}", tmp.display())))?;
    file.write_all(image)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp, path)
        .map_err(|e| Error::ioerror_extra(e, format!("renaming into {}", path.display())))?;
    Ok(())
}

/// Read the raw snapshot image, or `None` if there is no snapshot yet
pub fn read_from(path: &Path) -> PhotonResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::ioerror_extra(e, format!("reading {}", path.display()))),
    }
}

#[cfg(test)]
mod tests {
    use {
        super::{decode, encode, flush_to, read_from, DecodedPayload},
        crate::corestore::Keyspace,
        bytes::Bytes,
    };

    fn sample_keyspace() -> Keyspace {
        let mut ks = Keyspace::new();
        ks.set(b"alpha", Bytes::from_static(b"one")).unwrap();
        ks.set(b"beta", Bytes::from_static(b"two")).unwrap();
        ks.zadd(b"ranks", 1.5, b"low").unwrap();
        ks.zadd(b"ranks", 2.5, b"high").unwrap();
        ks
    }

    #[test]
    fn snapshot_roundtrip() {
        let ks = sample_keyspace();
        let image = encode(&ks);
        let mut decoded = decode(&image).unwrap();
        decoded.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0].0.as_ref(), b"alpha");
        assert_eq!(decoded[0].1, DecodedPayload::Str(Bytes::from_static(b"one")));
        assert_eq!(decoded[1].0.as_ref(), b"beta");
        match &decoded[2].1 {
            DecodedPayload::Zset(members) => {
                let mut members = members.clone();
                members.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
                assert_eq!(members[0], (1.5, Bytes::from_static(b"low")));
                assert_eq!(members[1], (2.5, Bytes::from_static(b"high")));
            }
            other => panic!("expected a sorted set, got {:?}", other),
        }
    }

    #[test]
    fn truncation_anywhere_is_an_error() {
        let image = encode(&sample_keyspace());
        for cut in 1..image.len() {
            assert!(
                decode(&image[..cut]).is_err(),
                "truncation at {} went unnoticed",
                cut
            );
        }
    }

    #[test]
    fn trailing_garbage_is_an_error() {
        let mut image = encode(&sample_keyspace());
        image.push(0xff);
        assert!(decode(&image).is_err());
    }

    #[test]
    fn unknown_type_is_an_error() {
        let mut image = Vec::new();
        image.extend_from_slice(&1u32.to_le_bytes());
        image.extend_from_slice(&1u32.to_le_bytes());
        image.push(b'k');
        image.extend_from_slice(&9u32.to_le_bytes()); // bogus type
        assert!(decode(&image).is_err());
    }

    #[test]
    fn flush_and_read_back() {
        let path = std::env::temp_dir().join(format!("photon-snap-{}.rdb", std::process::id()));
        let image = encode(&sample_keyspace());
        flush_to(&path, &image).unwrap();
        let raw = read_from(&path).unwrap().unwrap();
        assert_eq!(raw, image);
        std::fs::remove_file(&path).unwrap();
        assert!(read_from(&path).unwrap().is_none());
    }
}
