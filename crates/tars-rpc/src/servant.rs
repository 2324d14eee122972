// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-object invocation facade.
//!
//! # Call path
//!
//! ```text
//! invoke ──> overload guard ──> filter chain ──> select adapter
//!                                                    │
//!                         register slot <────────────┘
//!                              │
//!                         adapter.send ──> wait(slot | timer)
//!                                               │
//!                     response ──> ret != 0 ? Application : Ok
//!                     timer    ──> cancel slot ──> Timeout (counted as failure)
//! ```
//!
//! Oneway calls stop after the send. Callback calls return once the request
//! is queued; the callback runs on whichever task completes the slot.

use crate::adapter::{AdapterProxy, PushCallback, ResponseCallback, Waiter};
use crate::endpoint_manager::EndpointManager;
use crate::error::{RpcError, RpcResult};
use crate::filter::{FilterChain, Invoke};
use crate::message::{Message, RequestIdGenerator};
use crate::protocol::{
    message_type, ret, Context, RequestPacket, ResponsePacket, PACKET_NORMAL, PACKET_ONEWAY,
    TARS_VERSION,
};
use crate::selector::HashKey;
use crate::transport::Connection;
use crate::BoxFuture;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// Status key carrying the caller's set division.
pub const STATUS_SET_NAME: &str = "SETNAME";

/// Per-call knobs.
#[derive(Debug, Clone, Default)]
pub struct InvokeOptions {
    /// Overrides the proxy's default timeout.
    pub timeout: Option<Duration>,
    pub context: Context,
    pub status: Context,
    pub hash: Option<HashKey>,
}

impl InvokeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_status(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.status.insert(key.into(), value.into());
        self
    }

    pub fn with_hash(mut self, hash: HashKey) -> Self {
        self.hash = Some(hash);
        self
    }
}

fn timeout_ms(timeout: Duration) -> i32 {
    i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX)
}

/// Counts one in-flight invocation until dropped.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn acquire(counter: &Arc<AtomicUsize>, max: usize, obj: &str) -> RpcResult<Self> {
        let prev = counter.fetch_add(1, Ordering::AcqRel);
        if prev >= max {
            counter.fetch_sub(1, Ordering::AcqRel);
            return Err(RpcError::Overloaded {
                obj: obj.to_string(),
                in_flight: prev,
            });
        }
        Ok(Self(counter.clone()))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Undoes a registered call when its future is dropped before it settles.
///
/// Removes the slot, and once the frame is queued, hands the invocation count
/// back and records the outcome. A response that already won the slot counts
/// as a success.
struct CallGuard<'a> {
    adapter: &'a AdapterProxy,
    id: i32,
    conn: Option<Arc<Connection>>,
    armed: bool,
}

impl<'a> CallGuard<'a> {
    fn new(adapter: &'a AdapterProxy, id: i32) -> Self {
        Self {
            adapter,
            id,
            conn: None,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let answered = self.adapter.pending().cancel(self.id).is_none();
        if let Some(conn) = &self.conn {
            log::debug!(
                "[servant] call id={} to {} abandoned by its caller",
                self.id,
                self.adapter.endpoint().hash_key()
            );
            self.adapter.finish_call(conn, answered);
        }
    }
}

/// Settings a proxy is built with.
#[derive(Debug, Clone)]
pub struct ServantOptions {
    pub request_timeout: Duration,
    pub async_timeout: Duration,
    pub obj_queue_max: usize,
}

struct ServantInner {
    name: String,
    manager: Arc<EndpointManager>,
    filters: FilterChain,
    ids: Arc<RequestIdGenerator>,
    request_timeout_ms: AtomicU64,
    async_timeout_ms: AtomicU64,
    obj_queue_max: usize,
    in_flight: Arc<AtomicUsize>,
    push_callback: RwLock<Option<PushCallback>>,
}

impl ServantInner {
    fn build(&self, func: &str, payload: Vec<u8>, packet_type: i8, opts: InvokeOptions, timeout: Duration) -> Message {
        let mut req = RequestPacket {
            version: TARS_VERSION,
            packet_type,
            message_type: message_type::NULL,
            request_id: self.ids.next_id(),
            servant_name: self.name.clone(),
            func_name: func.to_string(),
            buffer: payload,
            timeout: timeout_ms(timeout),
            context: opts.context,
            status: opts.status,
        };
        if opts.hash.is_some() {
            req.message_type |= message_type::HASH;
        }
        if let Some(set) = self.manager.set() {
            req.message_type |= message_type::SET_NAME;
            req.status.insert(STATUS_SET_NAME.to_string(), set.to_string());
        }
        Message::new(req).with_hash(opts.hash)
    }

    fn select(&self, msg: &mut Message) -> RpcResult<(Arc<AdapterProxy>, bool)> {
        let (adapter, need_check) = self.manager.select(msg.hash)?;
        msg.endpoint = Some(adapter.endpoint().clone());
        if let Some(callback) = self.push_callback.read().clone() {
            if !adapter.has_push_callback() {
                adapter.set_push_callback(callback);
            }
        }
        Ok((adapter, need_check))
    }

    /// A degraded pick answered: the endpoint is usable again.
    fn revive(&self, adapter: &AdapterProxy, need_check: bool) {
        if need_check {
            adapter.health().reset(Instant::now());
            self.manager.add_alive(adapter.endpoint());
        }
    }

    async fn dispatch(&self, msg: &mut Message, timeout: Duration) -> RpcResult<()> {
        // filters may have changed the budget; the server sees what we wait for
        msg.request.timeout = timeout_ms(timeout);
        let (adapter, need_check) = self.select(msg)?;

        if msg.is_oneway() {
            let sent = adapter.send(&msg.request).await;
            msg.finish();
            if let Err(e) = sent {
                msg.status = e.code();
                return Err(e);
            }
            adapter.record(true);
            return Ok(());
        }

        let id = msg.request_id();
        let mut rx = adapter.pending().register(id);
        let mut guard = CallGuard::new(&adapter, id);
        let conn = match adapter.send(&msg.request).await {
            Ok(conn) => conn,
            Err(e) => {
                // guard drop removes the slot
                drop(guard);
                msg.finish();
                msg.status = e.code();
                return Err(e);
            }
        };
        guard.conn = Some(conn.clone());

        let outcome = tokio::select! {
            res = &mut rx => res.map_err(|_| RpcError::Shutdown),
            _ = tokio::time::sleep(timeout) => {
                if adapter.pending().cancel(id).is_some() {
                    Err(RpcError::Timeout {
                        request_id: id,
                        elapsed: msg.cost(),
                    })
                } else {
                    // the response won the slot just before the timer
                    rx.await.map_err(|_| RpcError::Shutdown)
                }
            }
        };
        guard.disarm();
        msg.finish();

        match outcome {
            Ok(rsp) => {
                adapter.finish_call(&conn, true);
                self.revive(&adapter, need_check);
                msg.status = rsp.ret;
                let app_error = (rsp.ret != ret::SUCCESS).then(|| RpcError::Application {
                    code: rsp.ret,
                    message: rsp.result_desc.clone(),
                });
                msg.response = Some(rsp);
                app_error.map_or(Ok(()), Err)
            }
            Err(e) => {
                adapter.finish_call(&conn, false);
                msg.status = e.code();
                if let RpcError::Timeout { request_id, elapsed } = &e {
                    log::warn!(
                        "[servant] {}::{} id={} to {} timed out after {:?}",
                        self.name,
                        msg.request.func_name,
                        request_id,
                        adapter.endpoint().hash_key(),
                        elapsed
                    );
                }
                Err(e)
            }
        }
    }

    async fn dispatch_callback(
        &self,
        msg: &mut Message,
        timeout: Duration,
        callback: ResponseCallback,
        guard: InFlight,
    ) -> RpcResult<()> {
        msg.request.timeout = timeout_ms(timeout);
        let (adapter, need_check) = self.select(msg)?;
        let id = msg.request_id();

        let manager = self.manager.clone();
        let target = adapter.clone();
        let sent_on: Arc<OnceLock<Arc<Connection>>> = Arc::new(OnceLock::new());
        let conn_slot = sent_on.clone();
        let wrapped: ResponseCallback = Box::new(move |res| {
            let res = res.and_then(|rsp| {
                // the reply can beat the send bookkeeping by a hair
                match conn_slot.get() {
                    Some(conn) => target.finish_call(conn, true),
                    None => target.finish_call(&target.connection(), true),
                }
                if need_check {
                    target.health().reset(Instant::now());
                    manager.add_alive(target.endpoint());
                }
                if rsp.ret == ret::SUCCESS {
                    Ok(rsp)
                } else {
                    Err(RpcError::Application {
                        code: rsp.ret,
                        message: rsp.result_desc,
                    })
                }
            });
            drop(guard);
            callback(res);
        });
        adapter.pending().register_callback(id, wrapped);

        // never queued (error or caller gone): the slot goes, the callback never runs
        let mut queued = CallGuard::new(&adapter, id);
        let conn = match adapter.send(&msg.request).await {
            Ok(conn) => conn,
            Err(e) => {
                drop(queued);
                msg.finish();
                msg.status = e.code();
                return Err(e);
            }
        };
        queued.disarm();
        drop(queued);
        let _ = sent_on.set(conn.clone());

        let begin = Instant::now();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(callback) = adapter.pending().cancel(id).and_then(Waiter::into_callback) {
                adapter.finish_call(&conn, false);
                callback(Err(RpcError::Timeout {
                    request_id: id,
                    elapsed: begin.elapsed(),
                }));
            }
        });
        Ok(())
    }
}

/// Terminal step for blocking and oneway calls.
struct Dispatch<'s>(&'s ServantInner);

impl Invoke for Dispatch<'_> {
    fn invoke<'a>(&'a self, msg: &'a mut Message, timeout: Duration) -> BoxFuture<'a, RpcResult<()>> {
        Box::pin(self.0.dispatch(msg, timeout))
    }
}

/// Terminal step for callback calls; the callback is taken on first use.
struct CallbackDispatch<'s> {
    inner: &'s ServantInner,
    pending: Mutex<Option<(ResponseCallback, InFlight)>>,
}

impl Invoke for CallbackDispatch<'_> {
    fn invoke<'a>(&'a self, msg: &'a mut Message, timeout: Duration) -> BoxFuture<'a, RpcResult<()>> {
        Box::pin(async move {
            let (callback, guard) = self
                .pending
                .lock()
                .take()
                .ok_or_else(|| RpcError::Filter("callback call dispatched twice".into()))?;
            self.inner.dispatch_callback(msg, timeout, callback, guard).await
        })
    }
}

/// Client proxy of one remote object. Cheap to clone.
#[derive(Clone)]
pub struct ServantProxy {
    inner: Arc<ServantInner>,
}

impl ServantProxy {
    pub(crate) fn new(
        manager: Arc<EndpointManager>,
        filters: FilterChain,
        ids: Arc<RequestIdGenerator>,
        options: ServantOptions,
    ) -> Self {
        Self {
            inner: Arc::new(ServantInner {
                name: manager.obj_name().to_string(),
                manager,
                filters,
                ids,
                request_timeout_ms: AtomicU64::new(options.request_timeout.as_millis() as u64),
                async_timeout_ms: AtomicU64::new(options.async_timeout.as_millis() as u64),
                obj_queue_max: options.obj_queue_max,
                in_flight: Arc::new(AtomicUsize::new(0)),
                push_callback: RwLock::new(None),
            }),
        }
    }

    /// Remote object name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn manager(&self) -> &Arc<EndpointManager> {
        &self.inner.manager
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.inner.request_timeout_ms.load(Ordering::Relaxed))
    }

    /// Default timeout of blocking calls made through any clone of this proxy.
    pub fn set_timeout(&self, timeout: Duration) {
        self.inner
            .request_timeout_ms
            .store(timeout.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn async_timeout(&self) -> Duration {
        Duration::from_millis(self.inner.async_timeout_ms.load(Ordering::Relaxed))
    }

    pub fn set_async_timeout(&self, timeout: Duration) {
        self.inner
            .async_timeout_ms
            .store(timeout.as_millis() as u64, Ordering::Relaxed);
    }

    /// Calls currently in flight through this proxy.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Receive server pushes from every endpoint this proxy talks to.
    pub fn set_push_callback(&self, callback: PushCallback) {
        *self.inner.push_callback.write() = Some(callback);
    }

    fn guard(&self) -> RpcResult<InFlight> {
        InFlight::acquire(
            &self.inner.in_flight,
            self.inner.obj_queue_max,
            &self.inner.name,
        )
    }

    /// Blocking call: waits for the response or the timeout.
    ///
    /// A non-zero return code surfaces as [`RpcError::Application`].
    pub async fn invoke(
        &self,
        func: &str,
        payload: Vec<u8>,
        opts: InvokeOptions,
    ) -> RpcResult<ResponsePacket> {
        let timeout = opts.timeout.unwrap_or_else(|| self.timeout());
        let _guard = self.guard()?;
        let mut msg = self.inner.build(func, payload, PACKET_NORMAL, opts, timeout);
        self.inner
            .filters
            .run(&Dispatch(&self.inner), &mut msg, timeout)
            .await?;
        msg.response
            .take()
            .ok_or_else(|| RpcError::Filter(format!("{} returned without a response", func)))
    }

    /// Fire and forget. Returns once the request is queued.
    pub async fn invoke_oneway(&self, func: &str, payload: Vec<u8>, opts: InvokeOptions) -> RpcResult<()> {
        let timeout = opts.timeout.unwrap_or_else(|| self.timeout());
        let _guard = self.guard()?;
        let mut msg = self.inner.build(func, payload, PACKET_ONEWAY, opts, timeout);
        self.inner
            .filters
            .run(&Dispatch(&self.inner), &mut msg, timeout)
            .await
    }

    /// Callback call. Returns once the request is queued; `callback` then runs
    /// exactly once with the response, an application error or a timeout.
    ///
    /// When this returns an error the callback is dropped without running.
    pub async fn invoke_async<F>(
        &self,
        func: &str,
        payload: Vec<u8>,
        opts: InvokeOptions,
        callback: F,
    ) -> RpcResult<()>
    where
        F: FnOnce(RpcResult<ResponsePacket>) + Send + 'static,
    {
        let timeout = opts.timeout.unwrap_or_else(|| self.async_timeout());
        let guard = self.guard()?;
        let mut msg = self.inner.build(func, payload, PACKET_NORMAL, opts, timeout);
        msg.request.message_type |= message_type::ASYNC;
        let callback: ResponseCallback = Box::new(callback);
        let terminal = CallbackDispatch {
            inner: &self.inner,
            pending: Mutex::new(Some((callback, guard))),
        };
        self.inner.filters.run(&terminal, &mut msg, timeout).await
    }
}

impl std::fmt::Debug for ServantProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServantProxy")
            .field("name", &self.inner.name)
            .field("timeout", &self.timeout())
            .field("in_flight", &self.in_flight())
            .field("filters", &self.inner.filters)
            .finish()
    }
}
