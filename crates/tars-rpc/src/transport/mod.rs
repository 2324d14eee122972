// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-endpoint connection transport.
//!
//! A [`Connection`] owns at most one live socket to one remote address and
//! treats packets as opaque framed bytes:
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                         Connection                            |
//! |                                                               |
//! |  send() --> [ bounded queue ] --> send loop --> socket        |
//! |                                                               |
//! |  socket --> recv loop --> accumulate --> parse_package()      |
//! |                                   |                           |
//! |                                   v                           |
//! |                     ClientProtocol::recv(frame)               |
//! +--------------------------------------------------------------+
//! ```
//!
//! Dialing is lazy: the first `send` after construction (or after the socket
//! was torn down) dials under a lock, so concurrent senders trigger at most
//! one connect. Each live socket runs one send loop and one receive loop as
//! tokio tasks. `ssl` endpoints run the same loops over a rustls stream
//! when the `tls` feature is enabled.

mod connection;
mod tls;


pub use connection::Connection;
pub use tls::TlsOptions;

use crate::codec::DecodeError;
use crate::protocol::frame::DEFAULT_MAX_PACKAGE_LENGTH;
use crate::protocol::PackageStatus;
use serde::{Deserialize, Serialize};
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Transport tuning shared by every connection of a communicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Outbound queue capacity per connection.
    pub queue_len: usize,

    /// Close the socket after this long without traffic and no call in flight (ms).
    pub idle_timeout_ms: u64,

    /// Upper bound on waiting for room in a full outbound queue, and on a
    /// single socket write (ms).
    pub write_timeout_ms: u64,

    /// Connect timeout (ms).
    pub dial_timeout_ms: u64,

    /// Largest accepted frame, header included.
    pub max_package_length: usize,

    /// Poll period of `grace_close` while calls are in flight (ms).
    pub grace_poll_interval_ms: u64,

    /// Disable Nagle's algorithm on TCP sockets.
    pub tcp_nodelay: bool,

    /// TCP keepalive probe time in seconds, 0 leaves the OS default.
    pub tcp_keepalive_secs: u64,

    /// Settings for `ssl` endpoints.
    pub tls: TlsOptions,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            queue_len: 10_000,
            idle_timeout_ms: 600_000,
            write_timeout_ms: 3_000,
            dial_timeout_ms: 3_000,
            max_package_length: DEFAULT_MAX_PACKAGE_LENGTH,
            grace_poll_interval_ms: 500,
            tcp_nodelay: true,
            tcp_keepalive_secs: 60,
            tls: TlsOptions::default(),
        }
    }
}

impl TransportConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn grace_poll_interval(&self) -> Duration {
        Duration::from_millis(self.grace_poll_interval_ms)
    }
}

/// Transport-level failures.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("dial {addr} failed: {source}")]
    Dial {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("dial {0} timed out")]
    DialTimeout(String),

    #[error("write failed: {0}")]
    Write(#[from] io::Error),

    #[error("send queue to {0} is full")]
    QueueFull(String),

    #[error("connection closed")]
    Closed,

    #[error("transport {0} is not supported")]
    Unsupported(&'static str),

    #[error("tls setup failed: {0}")]
    Tls(String),

    #[error("invalid declared package length {0}")]
    Framing(u32),
}

/// Receiving side of a connection, implemented by its owner.
///
/// `recv` returns an error for a frame that could not be decoded; the
/// receive loop logs it and keeps reading.
pub trait ClientProtocol: Send + Sync + 'static {
    /// Frame boundary detection over the accumulation buffer.
    fn parse_package(&self, buf: &[u8]) -> PackageStatus;

    /// Handle one complete frame, header included.
    fn recv(&self, frame: &[u8]) -> Result<(), DecodeError>;
}
