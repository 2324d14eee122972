// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Mock TARS server for integration tests.
//!
//! Behaviour is keyed on the function name:
//!
//! | func | reply |
//! |------|-------|
//! | `echo` | payload back, ret 0 |
//! | `fail` | ret 42, result_desc `"bad input"` |
//! | `sleep` | waits the big-endian u32 ms in the payload, then echoes |
//! | `push` | a push carrying the payload, then an empty reply |
//! | `reconnect` | a `_reconnect_` push, then an empty reply |
//! | `silent` | nothing |
//! | oneway calls | nothing, recorded only |

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tars_rpc::protocol::{PackageStatus, Protocol, RECONNECT_DIRECTIVE};
use tars_rpc::{Endpoint, RequestPacket, ResponsePacket, TarsProtocol};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

pub struct MockServer {
    pub endpoint: Endpoint,
    pub accepts: Arc<AtomicUsize>,
    pub requests: Arc<AtomicUsize>,
    seen: parking_lot::Mutex<mpsc::UnboundedReceiver<RequestPacket>>,
}

impl MockServer {
    pub async fn start() -> Self {
        Self::start_on(0).await
    }

    /// Listen on a fixed local port (0 picks one).
    pub async fn start_on(port: u16) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accepts = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(AtomicUsize::new(0));
        let (seen_tx, seen_rx) = mpsc::unbounded_channel();

        let (a, r) = (accepts.clone(), requests.clone());
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                a.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(stream, r.clone(), seen_tx.clone()));
            }
        });

        Self {
            endpoint: Endpoint::tcp("127.0.0.1", port),
            accepts,
            requests,
            seen: parking_lot::Mutex::new(seen_rx),
        }
    }

    /// `Name@tcp -h 127.0.0.1 -p PORT`
    pub fn direct(&self, obj: &str) -> String {
        format!("{}@{}", obj, self.endpoint)
    }

    /// Requests received so far, in arrival order.
    pub fn drain_seen(&self) -> Vec<RequestPacket> {
        let mut rx = self.seen.lock();
        let mut out = Vec::new();
        while let Ok(req) = rx.try_recv() {
            out.push(req);
        }
        out
    }
}

async fn serve(
    stream: tokio::net::TcpStream,
    requests: Arc<AtomicUsize>,
    seen: mpsc::UnboundedSender<RequestPacket>,
) {
    let protocol = TarsProtocol::default();
    let (mut reader, writer) = stream.into_split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Vec<u8>>();

    let mut writer = writer;
    tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if writer.write_all(&frame).await.is_err() {
                break;
            }
        }
    });

    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);
        loop {
            match protocol.parse_package(&buf) {
                PackageStatus::Incomplete => break,
                PackageStatus::Error(_) => return,
                PackageStatus::Complete(len) => {
                    let frame: Vec<u8> = buf.drain(..len).collect();
                    let Ok(req) = protocol.request_unpack(&frame) else {
                        continue;
                    };
                    requests.fetch_add(1, Ordering::SeqCst);
                    let _ = seen.send(req.clone());
                    tokio::spawn(respond(req, out_tx.clone()));
                }
            }
        }
    }
}

async fn respond(req: RequestPacket, out: mpsc::UnboundedSender<Vec<u8>>) {
    let protocol = TarsProtocol::default();
    if req.is_oneway() {
        return;
    }
    let reply = match req.func_name.as_str() {
        "echo" => ResponsePacket::reply_to(&req, 0, req.buffer.clone()),
        "fail" => ResponsePacket {
            result_desc: "bad input".into(),
            ..ResponsePacket::reply_to(&req, 42, Vec::new())
        },
        "sleep" => {
            let ms = req
                .buffer
                .get(..4)
                .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
                .unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(u64::from(ms))).await;
            ResponsePacket::reply_to(&req, 0, req.buffer.clone())
        }
        "push" => {
            let push = ResponsePacket {
                request_id: 0,
                buffer: req.buffer.clone(),
                ..ResponsePacket::default()
            };
            let _ = out.send(protocol.response_pack(&push));
            ResponsePacket::reply_to(&req, 0, Vec::new())
        }
        "reconnect" => {
            let push = ResponsePacket {
                request_id: 0,
                result_desc: RECONNECT_DIRECTIVE.into(),
                ..ResponsePacket::default()
            };
            let _ = out.send(protocol.response_pack(&push));
            ResponsePacket::reply_to(&req, 0, Vec::new())
        }
        _ => return,
    };
    let _ = out.send(protocol.response_pack(&reply));
}

/// Payload for the `sleep` function.
pub fn sleep_ms(ms: u32) -> Vec<u8> {
    ms.to_be_bytes().to_vec()
}

/// A local port with nothing listening on it.
pub async fn dead_endpoint() -> Endpoint {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    Endpoint::tcp("127.0.0.1", port)
}
