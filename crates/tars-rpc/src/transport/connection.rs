// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Lazily dialed, self-healing connection to one endpoint.
//!
//! # Socket lifecycle
//!
//! ```text
//!      +--------------+
//!      | Disconnected |<-----------------------------+
//!      +------+-------+                              |
//!             | send() / connect()                   |
//!             v                                      |
//!      +--------------+  write error, EOF,           |
//!      |    Live(g)   |--framing error, idle-------->+
//!      +------+-------+
//!             | grace_close() / drop
//!             v
//!      +--------------+
//!      |    Closed    |  (terminal, send fails)
//!      +--------------+
//! ```
//!
//! Every live socket gets a generation number `g`. Loops only tear down the
//! generation they were spawned for, so a late error from an old socket
//! cannot close its replacement.

use super::{ClientProtocol, TransportConfig, TransportError};
use crate::endpoint::{Endpoint, TransportKind};
use crate::protocol::PackageStatus;
use parking_lot::Mutex;
use socket2::{SockRef, TcpKeepalive};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::{mpsc, watch};
#[cfg(feature = "tls")]
use tokio_rustls::client::TlsStream;

/// Receive chunk size (also the largest UDP datagram accepted).
const READ_CHUNK: usize = 64 * 1024;

/// Upper bound on the idle-check period of the send loop.
const IDLE_CHECK_PERIOD: Duration = Duration::from_secs(1);

// ============================================================================
// Socket halves
// ============================================================================

enum Writer {
    Tcp(OwnedWriteHalf),
    Udp(Arc<UdpSocket>),
    #[cfg(feature = "tls")]
    Tls(tokio::io::WriteHalf<TlsStream<TcpStream>>),
}

impl Writer {
    async fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        match self {
            Writer::Tcp(w) => w.write_all(frame).await,
            Writer::Udp(s) => s.send(frame).await.map(|_| ()),
            #[cfg(feature = "tls")]
            Writer::Tls(w) => {
                w.write_all(frame).await?;
                w.flush().await
            }
        }
    }

    /// Write one frame, failing with `TimedOut` once `limit` elapses.
    async fn write_within(&mut self, frame: &[u8], limit: Duration) -> io::Result<()> {
        match tokio::time::timeout(limit, self.write_frame(frame)).await {
            Ok(res) => res,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("write stalled for {:?}", limit),
            )),
        }
    }
}

enum Reader {
    Tcp(OwnedReadHalf),
    Udp(Arc<UdpSocket>),
    #[cfg(feature = "tls")]
    Tls(tokio::io::ReadHalf<TlsStream<TcpStream>>),
}

impl Reader {
    async fn read(&mut self, chunk: &mut [u8]) -> io::Result<usize> {
        match self {
            Reader::Tcp(r) => r.read(chunk).await,
            Reader::Udp(s) => s.recv(chunk).await,
            #[cfg(feature = "tls")]
            Reader::Tls(r) => r.read(chunk).await,
        }
    }

    /// Datagrams never carry a frame across reads.
    fn is_datagram(&self) -> bool {
        matches!(self, Reader::Udp(_))
    }
}

// ============================================================================
// Shared state
// ============================================================================

struct LiveSocket {
    generation: u64,
    shutdown: watch::Sender<bool>,
}

struct Inner {
    addr: String,
    #[cfg_attr(not(feature = "tls"), allow(dead_code))]
    host: String,
    transport: TransportKind,
    config: TransportConfig,
    handler: Arc<dyn ClientProtocol>,
    /// Built on the first `ssl` dial.
    #[cfg(feature = "tls")]
    tls: Mutex<Option<tokio_rustls::TlsConnector>>,

    queue_tx: mpsc::Sender<Vec<u8>>,
    /// Held by the send loop of the current socket for its whole life.
    queue_rx: tokio::sync::Mutex<mpsc::Receiver<Vec<u8>>>,
    /// Frame whose write failed; retried first on the next socket.
    send_fail: Mutex<Option<Vec<u8>>>,

    dial_lock: tokio::sync::Mutex<()>,
    live: Mutex<Option<LiveSocket>>,
    next_generation: AtomicU64,
    closed: AtomicBool,

    invoke_num: AtomicI64,
    created: Instant,
    /// Milliseconds since `created` of the last read or write.
    last_active_ms: AtomicU64,
}

impl Inner {
    fn touch(&self) {
        let now = self.created.elapsed().as_millis() as u64;
        self.last_active_ms.store(now, Ordering::Relaxed);
    }

    fn idle_for(&self) -> Duration {
        let now = self.created.elapsed().as_millis() as u64;
        Duration::from_millis(now.saturating_sub(self.last_active_ms.load(Ordering::Relaxed)))
    }

    fn is_connected(&self) -> bool {
        self.live.lock().is_some()
    }

    /// Tear down socket `generation` if it is still the live one.
    fn close(&self, generation: u64) {
        let mut live = self.live.lock();
        if live.as_ref().map(|l| l.generation) == Some(generation) {
            if let Some(socket) = live.take() {
                let _ = socket.shutdown.send(true);
                log::debug!("[transport] {} closed socket gen={}", self.addr, generation);
            }
        }
    }

    fn close_current(&self) {
        if let Some(socket) = self.live.lock().take() {
            let _ = socket.shutdown.send(true);
            log::debug!("[transport] {} closed socket gen={}", self.addr, socket.generation);
        }
    }

    async fn resolve(&self) -> Result<SocketAddr, TransportError> {
        let mut addrs = tokio::net::lookup_host(self.addr.as_str())
            .await
            .map_err(|source| TransportError::Dial {
                addr: self.addr.clone(),
                source,
            })?;
        addrs.next().ok_or_else(|| TransportError::Dial {
            addr: self.addr.clone(),
            source: io::Error::new(io::ErrorKind::NotFound, "no address resolved"),
        })
    }

    async fn dial(&self) -> Result<(Reader, Writer), TransportError> {
        match self.transport {
            TransportKind::Tls => self.dial_tls().await,
            TransportKind::Tcp => {
                let (r, w) = self.dial_tcp().await?.into_split();
                Ok((Reader::Tcp(r), Writer::Tcp(w)))
            }
            TransportKind::Udp => {
                let dial_err = |source: io::Error| TransportError::Dial {
                    addr: self.addr.clone(),
                    source,
                };
                let target = self.resolve().await?;
                let bind: SocketAddr = if target.is_ipv6() {
                    (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
                } else {
                    (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
                };
                let socket = UdpSocket::bind(bind).await.map_err(dial_err)?;
                socket.connect(target).await.map_err(dial_err)?;
                let socket = Arc::new(socket);
                Ok((Reader::Udp(socket.clone()), Writer::Udp(socket)))
            }
        }
    }

    async fn dial_tcp(&self) -> Result<TcpStream, TransportError> {
        let target = self.resolve().await?;
        let stream = tokio::time::timeout(self.config.dial_timeout(), TcpStream::connect(target))
            .await
            .map_err(|_| TransportError::DialTimeout(self.addr.clone()))?
            .map_err(|source| TransportError::Dial {
                addr: self.addr.clone(),
                source,
            })?;
        self.tune(&stream);
        Ok(stream)
    }

    #[cfg(feature = "tls")]
    async fn dial_tls(&self) -> Result<(Reader, Writer), TransportError> {
        let connector = self.tls_connector()?;
        let name = super::tls::server_name(&self.config.tls, &self.host)?;
        let stream = self.dial_tcp().await?;
        // the handshake shares the connect budget
        let stream = tokio::time::timeout(self.config.dial_timeout(), connector.connect(name, stream))
            .await
            .map_err(|_| TransportError::DialTimeout(self.addr.clone()))?
            .map_err(|source| TransportError::Dial {
                addr: self.addr.clone(),
                source,
            })?;
        let (r, w) = tokio::io::split(stream);
        Ok((Reader::Tls(r), Writer::Tls(w)))
    }

    #[cfg(not(feature = "tls"))]
    async fn dial_tls(&self) -> Result<(Reader, Writer), TransportError> {
        Err(TransportError::Unsupported(TransportKind::Tls.as_str()))
    }

    #[cfg(feature = "tls")]
    fn tls_connector(&self) -> Result<tokio_rustls::TlsConnector, TransportError> {
        let mut cached = self.tls.lock();
        if let Some(connector) = cached.as_ref() {
            return Ok(connector.clone());
        }
        let connector = super::tls::connector(&self.config.tls)?;
        *cached = Some(connector.clone());
        Ok(connector)
    }

    fn tune(&self, stream: &TcpStream) {
        let sock = SockRef::from(stream);
        if let Err(e) = sock.set_nodelay(self.config.tcp_nodelay) {
            log::debug!("[transport] {} set_nodelay failed: {}", self.addr, e);
        }
        if self.config.tcp_keepalive_secs > 0 {
            let keepalive =
                TcpKeepalive::new().with_time(Duration::from_secs(self.config.tcp_keepalive_secs));
            if let Err(e) = sock.set_tcp_keepalive(&keepalive) {
                log::debug!("[transport] {} set_tcp_keepalive failed: {}", self.addr, e);
            }
        }
    }

    /// Dial unless a socket is live. Concurrent callers share one dial.
    async fn ensure_connected(self: &Arc<Self>) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        if self.is_connected() {
            return Ok(());
        }
        let _guard = self.dial_lock.lock().await;
        if self.is_connected() {
            return Ok(());
        }
        self.open().await
    }

    /// Dial a fresh socket and start its loops. Caller holds `dial_lock`.
    async fn open(self: &Arc<Self>) -> Result<(), TransportError> {
        let (reader, writer) = self.dial().await?;
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        {
            let mut live = self.live.lock();
            if let Some(old) = live.take() {
                let _ = old.shutdown.send(true);
            }
            *live = Some(LiveSocket {
                generation,
                shutdown: shutdown_tx,
            });
        }
        self.touch();
        log::info!(
            "[transport] connected to {} ({}) gen={}",
            self.addr,
            self.transport.as_str(),
            generation
        );

        tokio::spawn(send_loop(self.clone(), writer, generation, shutdown_rx.clone()));
        tokio::spawn(recv_loop(self.clone(), reader, generation, shutdown_rx));
        Ok(())
    }
}

// ============================================================================
// Loops
// ============================================================================

async fn send_loop(
    inner: Arc<Inner>,
    mut writer: Writer,
    generation: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    // The previous socket's loop may still hold the queue; wait for it to let go.
    let mut rx = tokio::select! {
        rx = inner.queue_rx.lock() => rx,
        _ = shutdown.changed() => return,
    };

    // a peer that stops reading fills the socket buffer; bound every write
    let write_limit = inner.config.write_timeout();
    let retry = inner.send_fail.lock().take();
    if let Some(frame) = retry {
        if let Err(e) = writer.write_within(&frame, write_limit).await {
            log::warn!("[transport] {} resend failed: {}", inner.addr, e);
            *inner.send_fail.lock() = Some(frame);
            inner.close(generation);
            return;
        }
        inner.touch();
    }

    let idle_timeout = inner.config.idle_timeout();
    let period = IDLE_CHECK_PERIOD
        .min(idle_timeout / 2)
        .max(Duration::from_millis(10));
    let mut tick = tokio::time::interval(period);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            msg = rx.recv() => {
                let Some(frame) = msg else { break };
                if let Err(e) = writer.write_within(&frame, write_limit).await {
                    log::warn!("[transport] {} write failed: {}", inner.addr, e);
                    *inner.send_fail.lock() = Some(frame);
                    break;
                }
                inner.touch();
            }
            _ = tick.tick() => {
                if inner.invoke_num.load(Ordering::Acquire) <= 0 && inner.idle_for() >= idle_timeout {
                    log::info!(
                        "[transport] {} idle for {:?}, closing gen={}",
                        inner.addr,
                        inner.idle_for(),
                        generation
                    );
                    break;
                }
            }
        }
    }
    inner.close(generation);
}

async fn recv_loop(
    inner: Arc<Inner>,
    mut reader: Reader,
    generation: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        let n = tokio::select! {
            _ = shutdown.changed() => break,
            res = reader.read(&mut chunk) => match res {
                Ok(0) => {
                    log::debug!("[transport] {} closed by peer", inner.addr);
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    log::debug!("[transport] {} read failed: {}", inner.addr, e);
                    break;
                }
            },
        };
        inner.touch();
        buf.extend_from_slice(&chunk[..n]);

        let mut start = 0;
        loop {
            match inner.handler.parse_package(&buf[start..]) {
                PackageStatus::Incomplete => break,
                PackageStatus::Complete(len) => {
                    if let Err(e) = inner.handler.recv(&buf[start..start + len]) {
                        log::warn!("[transport] {} dropped undecodable frame: {}", inner.addr, e);
                    }
                    start += len;
                }
                PackageStatus::Error(declared) => {
                    log::error!(
                        "[transport] {}: {}",
                        inner.addr,
                        TransportError::Framing(declared)
                    );
                    inner.close(generation);
                    return;
                }
            }
        }
        if reader.is_datagram() {
            buf.clear();
        } else {
            buf.drain(..start);
        }
    }
    inner.close(generation);
}

// ============================================================================
// Public handle
// ============================================================================

/// Connection to one endpoint. Dropping it closes the socket.
pub struct Connection {
    inner: Arc<Inner>,
}

/// One counted invocation; gives the count back on drop unless kept.
struct InvokeTicket<'a> {
    conn: &'a Connection,
    kept: bool,
}

impl<'a> InvokeTicket<'a> {
    fn issue(conn: &'a Connection) -> Self {
        conn.inner.invoke_num.fetch_add(1, Ordering::AcqRel);
        Self { conn, kept: false }
    }

    fn keep(&mut self) {
        self.kept = true;
    }
}

impl Drop for InvokeTicket<'_> {
    fn drop(&mut self) {
        if !self.kept {
            self.conn.finish_invoke();
        }
    }
}

impl Connection {
    pub fn new(endpoint: &Endpoint, config: TransportConfig, handler: Arc<dyn ClientProtocol>) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_len.max(1));
        Self {
            inner: Arc::new(Inner {
                addr: endpoint.address(),
                host: endpoint.host.clone(),
                transport: endpoint.transport,
                config,
                handler,
                #[cfg(feature = "tls")]
                tls: Mutex::new(None),
                queue_tx,
                queue_rx: tokio::sync::Mutex::new(queue_rx),
                send_fail: Mutex::new(None),
                dial_lock: tokio::sync::Mutex::new(()),
                live: Mutex::new(None),
                next_generation: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                invoke_num: AtomicI64::new(0),
                created: Instant::now(),
                last_active_ms: AtomicU64::new(0),
            }),
        }
    }

    /// `host:port` this connection dials.
    pub fn addr(&self) -> &str {
        &self.inner.addr
    }

    /// Dial now if no socket is live.
    pub async fn connect(&self) -> Result<(), TransportError> {
        self.inner.ensure_connected().await
    }

    /// Drop the live socket (if any) and dial a fresh one.
    pub async fn reconnect(&self) -> Result<(), TransportError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let _guard = self.inner.dial_lock.lock().await;
        self.inner.close_current();
        self.inner.open().await
    }

    /// Enqueue one framed packet.
    ///
    /// Dials lazily. Waits at most `write_timeout` for queue room, then fails
    /// with [`TransportError::QueueFull`]. `expects_reply` counts the frame as
    /// an outstanding invocation until [`Connection::finish_invoke`].
    pub async fn send(&self, frame: Vec<u8>, expects_reply: bool) -> Result<(), TransportError> {
        self.inner.ensure_connected().await?;
        // rolled back on error, and when this future is dropped mid-enqueue
        let mut ticket = expects_reply.then(|| InvokeTicket::issue(self));
        match tokio::time::timeout(self.inner.config.write_timeout(), self.inner.queue_tx.send(frame)).await {
            Ok(Ok(())) => {
                if let Some(ticket) = ticket.as_mut() {
                    ticket.keep();
                }
                Ok(())
            }
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => Err(TransportError::QueueFull(self.inner.addr.clone())),
        }
    }

    /// One outstanding invocation completed (answered or abandoned).
    pub fn finish_invoke(&self) {
        let _ = self
            .inner
            .invoke_num
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some((n - 1).max(0)));
    }

    pub fn invoke_num(&self) -> i64 {
        self.inner.invoke_num.load(Ordering::Acquire)
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Time since the last byte was read or written.
    pub fn idle_for(&self) -> Duration {
        self.inner.idle_for()
    }

    /// Close the current socket; the next send dials again.
    pub fn close(&self) {
        self.inner.close_current();
    }

    /// Wait for outstanding invocations to drain (or `grace` to elapse), then
    /// close for good.
    pub async fn grace_close(&self, grace: Duration) {
        let deadline = tokio::time::Instant::now() + grace;
        let poll = self.inner.config.grace_poll_interval();
        while self.invoke_num() > 0 && tokio::time::Instant::now() < deadline {
            let left = deadline.saturating_duration_since(tokio::time::Instant::now());
            tokio::time::sleep(poll.min(left)).await;
        }
        if self.invoke_num() > 0 {
            log::debug!(
                "[transport] {} grace period over with {} calls in flight",
                self.inner.addr,
                self.invoke_num()
            );
        }
        self.shutdown();
    }

    /// Close immediately and refuse further sends.
    pub fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.close_current();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("addr", &self.inner.addr)
            .field("transport", &self.inner.transport)
            .field("connected", &self.is_connected())
            .field("invoke_num", &self.invoke_num())
            .finish()
    }
}
