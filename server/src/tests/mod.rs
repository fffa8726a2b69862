/*
 * Created on Sat Jun 21 2025
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

//! This module contains automated tests for queries: each test boots a
//! real listener on an ephemeral loopback port and drives it over the
//! binary protocol, exactly like a client would

use {
    crate::{
        corestore::Corestore,
        dbnet::{self, IdleTracker, Terminator},
        protocol::encode_query,
        resp::{codes, de::decode_response, Value},
        services,
    },
    std::{
        net::{IpAddr, Ipv4Addr},
        path::PathBuf,
        sync::Arc,
    },
    tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpStream,
        sync::broadcast,
        task::JoinHandle,
        time::{sleep, Duration},
    },
};

fn scratch_snapshot_path() -> PathBuf {
    std::env::temp_dir().join(format!(
        "photon-test-{}-{}.rdb",
        std::process::id(),
        rand::random::<u32>()
    ))
}

struct TestServer {
    port: u16,
    snap_path: PathBuf,
    _signal: broadcast::Sender<()>,
    server: JoinHandle<()>,
}

impl TestServer {
    async fn start(idle_timeout_ms: u64) -> Self {
        let snap_path = scratch_snapshot_path();
        let (signal, _) = broadcast::channel(1);
        let db = Corestore::new(snap_path.clone());
        let tracker = Arc::new(IdleTracker::new(idle_timeout_ms));
        tokio::spawn(services::expiry::ttl_scheduler(
            db.clone(),
            Terminator::new(signal.subscribe()),
        ));
        tokio::spawn(services::sweeper::idle_sweeper(
            tracker.clone(),
            Terminator::new(signal.subscribe()),
        ));
        let mut listener = dbnet::connect(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            0,
            64,
            db.clone(),
            tracker,
            signal.clone(),
        )
        .await
        .unwrap();
        let port = listener.base.listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let _ = listener.run().await;
        });
        TestServer {
            port,
            snap_path,
            _signal: signal,
            server,
        }
    }
    async fn client(&self) -> TestClient {
        TestClient {
            stream: TcpStream::connect(("127.0.0.1", self.port)).await.unwrap(),
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.abort();
        let _ = std::fs::remove_file(&self.snap_path);
    }
}

struct TestClient {
    stream: TcpStream,
}

impl TestClient {
    async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }
    async fn read_response(&mut self) -> Value {
        let mut header = [0u8; 4];
        self.stream.read_exact(&mut header).await.unwrap();
        let len = u32::from_le_bytes(header) as usize;
        let mut frame = header.to_vec();
        frame.resize(4 + len, 0);
        self.stream.read_exact(&mut frame[4..]).await.unwrap();
        let (value, consumed) = decode_response(&frame);
        assert_eq!(consumed, frame.len());
        value
    }
    async fn query(&mut self, args: &[&[u8]]) -> Value {
        self.send_raw(&encode_query(args)).await;
        self.read_response().await
    }
    /// True once the server has closed its end
    async fn at_eof(&mut self) -> bool {
        let mut buf = [0u8; 1];
        matches!(self.stream.read(&mut buf).await, Ok(0))
    }
}

fn errcode(value: &Value) -> u32 {
    match value {
        Value::Err(code, _) => *code,
        other => panic!("expected an error reply, got {:?}", other),
    }
}

fn str_of(raw: &'static [u8]) -> Value {
    Value::str(raw)
}

#[tokio::test]
async fn get_set_and_missing_keys() {
    let server = TestServer::start(20_000).await;
    let mut con = server.client().await;
    assert_eq!(con.query(&[b"SET", b"foo", b"bar"]).await, Value::Ok);
    assert_eq!(con.query(&[b"GET", b"foo"]).await, str_of(b"bar"));
    assert_eq!(con.query(&[b"GET", b"missing"]).await, Value::Nil);
    // overwrite takes the latest value
    assert_eq!(con.query(&[b"SET", b"foo", b"baz"]).await, Value::Ok);
    assert_eq!(con.query(&[b"GET", b"foo"]).await, str_of(b"baz"));
    // and deletion makes it a miss again
    assert_eq!(con.query(&[b"DEL", b"foo"]).await, Value::Int(1));
    assert_eq!(con.query(&[b"DEL", b"foo"]).await, Value::Int(0));
    assert_eq!(con.query(&[b"GET", b"foo"]).await, Value::Nil);
}

#[tokio::test]
async fn zap_health_probe() {
    let server = TestServer::start(20_000).await;
    let mut con = server.client().await;
    assert_eq!(con.query(&[b"ZAP"]).await, str_of(b"ZING"));
}

#[tokio::test]
async fn sorted_set_insert_update_and_range() {
    let server = TestServer::start(20_000).await;
    let mut con = server.client().await;
    assert_eq!(con.query(&[b"ZADD", b"s", b"1", b"a"]).await, Value::Int(1));
    assert_eq!(con.query(&[b"ZADD", b"s", b"2", b"b"]).await, Value::Int(1));
    assert_eq!(con.query(&[b"ZADD", b"s", b"2", b"c"]).await, Value::Int(1));
    // score change on an existing member replies 0
    assert_eq!(con.query(&[b"ZADD", b"s", b"2", b"a"]).await, Value::Int(0));
    let got = con
        .query(&[b"ZQUERY", b"s", b"2", b"", b"0", b"10"])
        .await;
    assert_eq!(
        got,
        Value::Arr(vec![
            str_of(b"a"),
            Value::Dbl(2.0),
            str_of(b"b"),
            Value::Dbl(2.0),
            str_of(b"c"),
            Value::Dbl(2.0),
        ])
    );
    // rank offsets, limits and an absent key
    let got = con
        .query(&[b"ZQUERY", b"s", b"2", b"", b"1", b"1"])
        .await;
    assert_eq!(got, Value::Arr(vec![str_of(b"b"), Value::Dbl(2.0)]));
    assert_eq!(
        con.query(&[b"ZQUERY", b"s", b"2", b"", b"0", b"0"]).await,
        Value::Arr(vec![])
    );
    assert_eq!(
        con.query(&[b"ZQUERY", b"none", b"0", b"", b"0", b"10"])
            .await,
        Value::Arr(vec![])
    );
}

#[tokio::test]
async fn zscore_and_zrem() {
    let server = TestServer::start(20_000).await;
    let mut con = server.client().await;
    assert_eq!(con.query(&[b"ZADD", b"s", b"1", b"a"]).await, Value::Int(1));
    assert_eq!(con.query(&[b"ZSCORE", b"s", b"a"]).await, Value::Dbl(1.0));
    assert_eq!(con.query(&[b"ZREM", b"s", b"a"]).await, Value::Int(1));
    assert_eq!(con.query(&[b"ZSCORE", b"s", b"a"]).await, Value::Nil);
    assert_eq!(con.query(&[b"ZREM", b"s", b"a"]).await, Value::Int(0));
    // a score update is visible through ZSCORE
    con.query(&[b"ZADD", b"s", b"1", b"x"]).await;
    con.query(&[b"ZADD", b"s", b"9", b"x"]).await;
    assert_eq!(con.query(&[b"ZSCORE", b"s", b"x"]).await, Value::Dbl(9.0));
}

#[tokio::test]
async fn keys_lists_everything() {
    let server = TestServer::start(20_000).await;
    let mut con = server.client().await;
    con.query(&[b"SET", b"k1", b"v"]).await;
    con.query(&[b"SET", b"k2", b"v"]).await;
    con.query(&[b"ZADD", b"z1", b"1", b"m"]).await;
    match con.query(&[b"KEYS"]).await {
        Value::Arr(items) => {
            let mut names: Vec<Vec<u8>> = items
                .into_iter()
                .map(|item| match item {
                    Value::Str(name) => name.to_vec(),
                    other => panic!("non-string key {:?}", other),
                })
                .collect();
            names.sort();
            assert_eq!(names, vec![b"k1".to_vec(), b"k2".to_vec(), b"z1".to_vec()]);
        }
        other => panic!("expected an array, got {:?}", other),
    }
}

#[tokio::test]
async fn ttl_expiry_end_to_end() {
    let server = TestServer::start(20_000).await;
    let mut con = server.client().await;
    con.query(&[b"SET", b"k", b"v"]).await;
    assert_eq!(con.query(&[b"PEXPIRE", b"k", b"50"]).await, Value::Int(1));
    match con.query(&[b"PTTL", b"k"]).await {
        Value::Int(ms) => assert!((0..=50).contains(&ms), "remaining {}", ms),
        other => panic!("expected an integer, got {:?}", other),
    }
    sleep(Duration::from_millis(150)).await;
    assert_eq!(con.query(&[b"GET", b"k"]).await, Value::Nil);
    assert_eq!(con.query(&[b"PTTL", b"k"]).await, Value::Int(-2));
}

#[tokio::test]
async fn ttl_can_be_removed_again() {
    let server = TestServer::start(20_000).await;
    let mut con = server.client().await;
    con.query(&[b"SET", b"k", b"v"]).await;
    assert_eq!(con.query(&[b"PTTL", b"k"]).await, Value::Int(-1));
    con.query(&[b"PEXPIRE", b"k", b"5000"]).await;
    // a negative ttl removes the deadline
    assert_eq!(con.query(&[b"PEXPIRE", b"k", b"-1"]).await, Value::Int(1));
    assert_eq!(con.query(&[b"PTTL", b"k"]).await, Value::Int(-1));
    assert_eq!(
        con.query(&[b"PEXPIRE", b"missing", b"100"]).await,
        Value::Int(0)
    );
}

#[tokio::test]
async fn pipelined_requests_get_ordered_replies() {
    let server = TestServer::start(20_000).await;
    let mut con = server.client().await;
    let mut batch = Vec::new();
    batch.extend_from_slice(&encode_query(&[b"SET", b"a", b"1"]));
    batch.extend_from_slice(&encode_query(&[b"GET", b"a"]));
    batch.extend_from_slice(&encode_query(&[b"ZAP"]));
    con.send_raw(&batch).await;
    assert_eq!(con.read_response().await, Value::Ok);
    assert_eq!(con.read_response().await, str_of(b"1"));
    assert_eq!(con.read_response().await, str_of(b"ZING"));
}

#[tokio::test]
async fn wrong_types_and_bad_args_are_client_errors() {
    let server = TestServer::start(20_000).await;
    let mut con = server.client().await;
    con.query(&[b"ZADD", b"z", b"1", b"m"]).await;
    assert_eq!(errcode(&con.query(&[b"GET", b"z"]).await), codes::BAD_TYPE);
    assert_eq!(
        errcode(&con.query(&[b"SET", b"z", b"v"]).await),
        codes::BAD_TYPE
    );
    con.query(&[b"SET", b"plain", b"v"]).await;
    assert_eq!(
        errcode(&con.query(&[b"ZADD", b"plain", b"1", b"m"]).await),
        codes::BAD_TYPE
    );
    // arity and value-format errors
    assert_eq!(errcode(&con.query(&[b"SET", b"x"]).await), codes::BAD_ARG);
    assert_eq!(
        errcode(&con.query(&[b"ZADD", b"z", b"nan", b"m"]).await),
        codes::BAD_ARG
    );
    assert_eq!(
        errcode(&con.query(&[b"ZADD", b"z", b"inf", b"m"]).await),
        codes::BAD_ARG
    );
    assert_eq!(
        errcode(&con.query(&[b"PEXPIRE", b"z", b"soon"]).await),
        codes::BAD_ARG
    );
    assert_eq!(errcode(&con.query(&[b"BOGUS"]).await), codes::UNKNOWN);
    // the connection survived all of that
    assert_eq!(con.query(&[b"ZAP"]).await, str_of(b"ZING"));
}

#[tokio::test]
async fn oversized_frames_close_the_connection() {
    let server = TestServer::start(20_000).await;
    let mut con = server.client().await;
    let len = (33u32) << 20; // past the 32 MiB cap
    con.send_raw(&len.to_le_bytes()).await;
    assert!(con.at_eof().await);
}

#[tokio::test]
async fn empty_commands_get_an_error_reply() {
    let server = TestServer::start(20_000).await;
    let mut con = server.client().await;
    // a frame with zero arguments is well-formed, just meaningless
    con.send_raw(&encode_query(&[])).await;
    assert_eq!(errcode(&con.read_response().await), codes::UNKNOWN);
    // the connection survived it
    assert_eq!(con.query(&[b"ZAP"]).await, str_of(b"ZING"));
}

#[tokio::test]
async fn malformed_frames_close_the_connection() {
    let server = TestServer::start(20_000).await;
    let mut con = server.client().await;
    // one argument declared, but its bytes overrun the frame
    let mut raw = Vec::new();
    let body = [1u32.to_le_bytes(), 100u32.to_le_bytes()].concat();
    raw.extend_from_slice(&(body.len() as u32).to_le_bytes());
    raw.extend_from_slice(&body);
    con.send_raw(&raw).await;
    assert!(con.at_eof().await);
}

#[tokio::test]
async fn idle_connections_are_dropped() {
    let server = TestServer::start(300).await;
    let mut lazy = server.client().await;
    // handshake once so the server definitely has the connection
    assert_eq!(lazy.query(&[b"ZAP"]).await, str_of(b"ZING"));
    sleep(Duration::from_millis(900)).await;
    assert!(lazy.at_eof().await, "idle connection was not closed");
}

#[tokio::test]
async fn activity_resets_the_idle_clock() {
    let server = TestServer::start(300).await;
    let mut busy = server.client().await;
    for _ in 0..4 {
        sleep(Duration::from_millis(150)).await;
        assert_eq!(busy.query(&[b"ZAP"]).await, str_of(b"ZING"));
    }
    // 600ms of wall time has passed, but never 300ms of silence
    assert_eq!(busy.query(&[b"GET", b"nothing"]).await, Value::Nil);
}

#[tokio::test]
async fn save_and_load_roundtrip() {
    let server = TestServer::start(20_000).await;
    let mut con = server.client().await;
    con.query(&[b"SET", b"name", b"photon"]).await;
    con.query(&[b"ZADD", b"ranks", b"1.5", b"low"]).await;
    con.query(&[b"ZADD", b"ranks", b"2.5", b"high"]).await;
    assert_eq!(con.query(&[b"SAVE"]).await, Value::Ok);
    // wreck the state, then restore
    con.query(&[b"DEL", b"name"]).await;
    con.query(&[b"ZADD", b"ranks", b"9", b"junk"]).await;
    con.query(&[b"SET", b"stray", b"x"]).await;
    assert_eq!(con.query(&[b"LOAD"]).await, Value::Ok);
    assert_eq!(con.query(&[b"GET", b"name"]).await, str_of(b"photon"));
    assert_eq!(
        con.query(&[b"ZSCORE", b"ranks", b"low"]).await,
        Value::Dbl(1.5)
    );
    assert_eq!(con.query(&[b"ZSCORE", b"ranks", b"junk"]).await, Value::Nil);
    assert_eq!(con.query(&[b"GET", b"stray"]).await, Value::Nil);
    // restored keys come back without a TTL
    assert_eq!(con.query(&[b"PTTL", b"name"]).await, Value::Int(-1));
}

#[tokio::test]
async fn load_without_a_snapshot_fails_cleanly() {
    let server = TestServer::start(20_000).await;
    let mut con = server.client().await;
    assert_eq!(errcode(&con.query(&[b"LOAD"]).await), codes::UNKNOWN);
    // and the server keeps serving
    assert_eq!(con.query(&[b"ZAP"]).await, str_of(b"ZING"));
}
