// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client-side proxy for one server endpoint.
//!
//! An [`AdapterProxy`] owns the [`Connection`] to its endpoint, the health
//! counters used by routing, and the table of in-flight calls. Responses are
//! decoded on the connection's receive task and handed to their waiter by
//! request id; request id 0 is a server push.

mod health;
mod pending;

pub use health::{HealthCheck, HealthConfig, HealthStats, HealthTracker};
pub use pending::{PendingCalls, ResponseCallback, Waiter};

use crate::codec::DecodeError;
use crate::endpoint::Endpoint;
use crate::error::{RpcError, RpcResult};
use crate::message::RequestIdGenerator;
use crate::protocol::{
    Context, PackageStatus, Protocol, RequestPacket, ResponsePacket, PACKET_ONEWAY, PING_FUNC,
    RECONNECT_DIRECTIVE, TARS_VERSION,
};
use crate::transport::{ClientProtocol, Connection, TransportConfig};
use arc_swap::ArcSwap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Receives the payload of server pushes.
pub type PushCallback = Arc<dyn Fn(Vec<u8>) + Send + Sync>;

/// Result of one health tick, after any reconnect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthEvent {
    None,
    BecameUnhealthy,
    Recovered,
}

/// Settings an adapter is built with.
#[derive(Clone)]
pub struct AdapterOptions {
    pub obj_name: String,
    pub transport: TransportConfig,
    pub health: HealthConfig,
    pub protocol: Arc<dyn Protocol>,
    pub ids: Arc<RequestIdGenerator>,
    /// How long a replaced connection may drain after a reconnect directive.
    pub reconnect_grace: Duration,
}

/// Frame sink installed on the connection; holds the adapter weakly.
struct AdapterHandler {
    protocol: Arc<dyn Protocol>,
    adapter: Weak<AdapterProxy>,
}

impl ClientProtocol for AdapterHandler {
    fn parse_package(&self, buf: &[u8]) -> PackageStatus {
        self.protocol.parse_package(buf)
    }

    fn recv(&self, frame: &[u8]) -> Result<(), DecodeError> {
        let rsp = self.protocol.response_unpack(frame)?;
        if let Some(adapter) = self.adapter.upgrade() {
            adapter.on_response(rsp);
        }
        Ok(())
    }
}

/// Proxy for one endpoint: connection, health and call correlation.
pub struct AdapterProxy {
    endpoint: Endpoint,
    options: AdapterOptions,
    conn: ArcSwap<Connection>,
    health: HealthTracker,
    pending: PendingCalls,
    push_callback: RwLock<Option<PushCallback>>,
    closed: AtomicBool,
    this: Weak<AdapterProxy>,
}

impl AdapterProxy {
    pub fn new(endpoint: Endpoint, options: AdapterOptions) -> Arc<Self> {
        Arc::new_cyclic(|this| {
            let conn = Self::make_connection(&endpoint, &options, this.clone());
            Self {
                health: HealthTracker::new(options.health.clone(), Instant::now()),
                endpoint,
                conn: ArcSwap::from_pointee(conn),
                pending: PendingCalls::new(),
                push_callback: RwLock::new(None),
                closed: AtomicBool::new(false),
                this: this.clone(),
                options,
            }
        })
    }

    fn make_connection(endpoint: &Endpoint, options: &AdapterOptions, this: Weak<Self>) -> Connection {
        let handler = Arc::new(AdapterHandler {
            protocol: options.protocol.clone(),
            adapter: this,
        });
        Connection::new(endpoint, options.transport.clone(), handler)
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn health(&self) -> &HealthTracker {
        &self.health
    }

    pub fn is_healthy(&self) -> bool {
        self.health.is_healthy()
    }

    pub fn pending(&self) -> &PendingCalls {
        &self.pending
    }

    /// Current connection.
    pub fn connection(&self) -> Arc<Connection> {
        self.conn.load_full()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn set_push_callback(&self, callback: PushCallback) {
        *self.push_callback.write() = Some(callback);
    }

    pub fn has_push_callback(&self) -> bool {
        self.push_callback.read().is_some()
    }

    /// Encode and enqueue `req`. Counts the send, and a failure on error.
    ///
    /// Returns the connection the frame went out on; pass it back to
    /// [`finish_call`](Self::finish_call) once the call completes.
    pub async fn send(&self, req: &RequestPacket) -> RpcResult<Arc<Connection>> {
        if self.is_closed() {
            return Err(RpcError::Connection(format!(
                "adapter {} is closed",
                self.endpoint.hash_key()
            )));
        }
        log::trace!(
            "[adapter] send {}::{} id={} to {}",
            req.servant_name,
            req.func_name,
            req.request_id,
            self.endpoint.hash_key()
        );
        self.health.on_send();
        let frame = self.options.protocol.request_pack(req);
        let conn = self.connection();
        match conn.send(frame, !req.is_oneway()).await {
            Ok(()) => Ok(conn),
            Err(e) => {
                self.health.on_failure();
                Err(RpcError::from(e))
            }
        }
    }

    /// Account the end of one call that expected a reply.
    pub fn finish_call(&self, conn: &Connection, success: bool) {
        conn.finish_invoke();
        self.record(success);
    }

    /// Health accounting only (oneway calls).
    pub fn record(&self, success: bool) {
        if success {
            self.health.on_success(Instant::now());
        } else {
            self.health.on_failure();
        }
    }

    fn on_response(&self, rsp: ResponsePacket) {
        if rsp.is_push() {
            self.on_push(rsp);
            return;
        }
        if rsp.packet_type == PACKET_ONEWAY {
            return;
        }
        let id = rsp.request_id;
        if !self.pending.deliver(rsp) {
            log::warn!(
                "[adapter] {} response id={} has no waiter, dropped",
                self.endpoint.hash_key(),
                id
            );
        }
    }

    fn on_push(&self, rsp: ResponsePacket) {
        if rsp.result_desc == RECONNECT_DIRECTIVE {
            log::info!(
                "[adapter] {} asked to reconnect, swapping connection",
                self.endpoint.hash_key()
            );
            self.replace_connection();
            return;
        }
        let callback = self.push_callback.read().clone();
        match callback {
            Some(callback) => callback(rsp.buffer),
            None => log::debug!(
                "[adapter] {} push of {} bytes without callback",
                self.endpoint.hash_key(),
                rsp.buffer.len()
            ),
        }
    }

    /// Swap in a fresh connection and let the old one drain in the background.
    fn replace_connection(&self) {
        if self.is_closed() {
            return;
        }
        let fresh = Self::make_connection(&self.endpoint, &self.options, self.this.clone());
        let old = self.conn.swap(Arc::new(fresh));
        let grace = self.options.reconnect_grace;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { old.grace_close(grace).await });
            }
            Err(_) => old.shutdown(),
        }
    }

    /// Oneway `tars_ping` when the connection has been quiet for `interval`.
    pub async fn keep_alive(&self, interval: Duration) {
        if self.is_closed() || self.connection().idle_for() < interval {
            return;
        }
        let req = RequestPacket {
            version: TARS_VERSION,
            packet_type: PACKET_ONEWAY,
            request_id: self.options.ids.next_id(),
            servant_name: self.options.obj_name.clone(),
            func_name: PING_FUNC.to_string(),
            timeout: self.options.transport.write_timeout_ms as i32,
            context: Context::new(),
            status: Context::new(),
            ..Default::default()
        };
        if let Err(e) = self.send(&req).await {
            log::debug!("[adapter] {} keepalive failed: {}", self.endpoint.hash_key(), e);
        }
    }

    /// Run one health tick; retries the connection when due.
    pub async fn check_health(&self, now: Instant) -> HealthEvent {
        match self.health.check(now) {
            HealthCheck::Unchanged => HealthEvent::None,
            HealthCheck::Tripped => {
                let stats = self.health.stats();
                log::warn!(
                    "[adapter] {} unhealthy: send={} fail={} consecutive={}",
                    self.endpoint.hash_key(),
                    stats.send_count,
                    stats.fail_count,
                    stats.last_fail_count
                );
                HealthEvent::BecameUnhealthy
            }
            HealthCheck::Retry => match self.connection().reconnect().await {
                Ok(()) => {
                    self.health.reset(Instant::now());
                    log::info!("[adapter] {} recovered", self.endpoint.hash_key());
                    HealthEvent::Recovered
                }
                Err(e) => {
                    log::debug!("[adapter] {} retry failed: {}", self.endpoint.hash_key(), e);
                    HealthEvent::None
                }
            },
        }
    }

    /// Let in-flight calls drain for up to `grace`, then close for good.
    pub async fn grace_close(&self, grace: Duration) {
        self.closed.store(true, Ordering::Release);
        self.connection().grace_close(grace).await;
        self.pending.fail_all(|| RpcError::Shutdown);
    }

    /// Close immediately. Callback-style calls still pending fail with `Shutdown`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.connection().shutdown();
        self.pending.fail_all(|| RpcError::Shutdown);
    }
}

impl std::fmt::Debug for AdapterProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterProxy")
            .field("endpoint", &self.endpoint.hash_key())
            .field("health", &self.health.stats())
            .field("pending", &self.pending.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
