// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-flight call table.
//!
//! Each slot is removed exactly once: by the receive path delivering the
//! response, or by the timeout path cancelling it. Whoever wins the
//! `DashMap::remove` owns the slot; the loser sees `None` and does nothing.

use crate::error::RpcResult;
use crate::protocol::ResponsePacket;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Completion hook of a callback-style call.
pub type ResponseCallback = Box<dyn FnOnce(RpcResult<ResponsePacket>) + Send + 'static>;

/// Rendezvous for one in-flight request.
pub enum Waiter {
    /// A suspended caller.
    Sync(oneshot::Sender<ResponsePacket>),
    /// A registered callback, run on the task that completes the call.
    /// Boxed `FnOnce` is not `Sync`; the mutex keeps the table shareable.
    Callback(Mutex<ResponseCallback>),
}

impl Waiter {
    /// The callback of a callback-style waiter.
    pub fn into_callback(self) -> Option<ResponseCallback> {
        match self {
            Waiter::Sync(_) => None,
            Waiter::Callback(callback) => Some(callback.into_inner()),
        }
    }
}

impl std::fmt::Debug for Waiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Waiter::Sync(_) => f.write_str("Waiter::Sync"),
            Waiter::Callback(_) => f.write_str("Waiter::Callback"),
        }
    }
}

/// Request id to waiter map with single-removal semantics.
#[derive(Debug, Default)]
pub struct PendingCalls {
    slots: DashMap<i32, Waiter>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a suspended caller; the receiver resolves on delivery.
    pub fn register(&self, request_id: i32) -> oneshot::Receiver<ResponsePacket> {
        let (tx, rx) = oneshot::channel();
        self.slots.insert(request_id, Waiter::Sync(tx));
        rx
    }

    pub fn register_callback(&self, request_id: i32, callback: ResponseCallback) {
        self.slots.insert(request_id, Waiter::Callback(Mutex::new(callback)));
    }

    /// Hand `rsp` to its waiter. Returns `false` when no slot remains
    /// (the call already timed out or was never registered).
    pub fn deliver(&self, rsp: ResponsePacket) -> bool {
        match self.slots.remove(&rsp.request_id) {
            Some((_, Waiter::Sync(tx))) => {
                // a dropped receiver means the caller went away mid-flight
                let _ = tx.send(rsp);
                true
            }
            Some((_, Waiter::Callback(callback))) => {
                (callback.into_inner())(Ok(rsp));
                true
            }
            None => false,
        }
    }

    /// Remove the slot without delivering. `None` when delivery already won.
    pub fn cancel(&self, request_id: i32) -> Option<Waiter> {
        self.slots.remove(&request_id).map(|(_, waiter)| waiter)
    }

    pub fn contains(&self, request_id: i32) -> bool {
        self.slots.contains_key(&request_id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drain every slot, failing callbacks with `err()`.
    pub fn fail_all(&self, err: impl Fn() -> crate::error::RpcError) {
        let ids: Vec<i32> = self.slots.iter().map(|e| *e.key()).collect();
        for id in ids {
            if let Some(callback) = self.cancel(id).and_then(Waiter::into_callback) {
                callback(Err(err()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};

    fn response(id: i32) -> ResponsePacket {
        ResponsePacket {
            request_id: id,
            ..Default::default()
        }
    }

    #[test]
    fn test_deliver_sync() {
        let pending = PendingCalls::new();
        let mut rx = pending.register(7);
        assert!(pending.deliver(response(7)));
        assert_eq!(rx.try_recv().unwrap().request_id, 7);
        assert!(pending.is_empty());
        // second delivery finds nothing
        assert!(!pending.deliver(response(7)));
    }

    #[test]
    fn test_deliver_callback() {
        let pending = PendingCalls::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        pending.register_callback(
            3,
            Box::new(move |res| {
                assert_eq!(res.unwrap().request_id, 3);
                h.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert!(pending.deliver(response(3)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_id_dropped() {
        let pending = PendingCalls::new();
        let _rx = pending.register(1);
        assert!(!pending.deliver(response(2)));
        assert!(pending.contains(1));
    }

    #[test]
    fn test_cancel_then_deliver() {
        let pending = PendingCalls::new();
        let mut rx = pending.register(9);
        assert!(pending.cancel(9).is_some());
        assert!(!pending.deliver(response(9)));
        assert!(rx.try_recv().is_err());
        assert!(pending.cancel(9).is_none());
    }

    #[test]
    fn test_deliver_and_cancel_race_exactly_once() {
        let pending = Arc::new(PendingCalls::new());
        for id in 1..=500 {
            let mut rx = pending.register(id);
            let barrier = Arc::new(Barrier::new(2));
            let (p1, b1) = (pending.clone(), barrier.clone());
            let deliverer = std::thread::spawn(move || {
                b1.wait();
                p1.deliver(response(id))
            });
            let (p2, b2) = (pending.clone(), barrier);
            let canceller = std::thread::spawn(move || {
                b2.wait();
                p2.cancel(id).is_some()
            });
            let delivered = deliverer.join().unwrap();
            let cancelled = canceller.join().unwrap();

            assert!(delivered ^ cancelled, "id {id}: both or neither won");
            assert_eq!(rx.try_recv().is_ok(), delivered);
            assert!(!pending.contains(id));
        }
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_table_shareable_across_tasks() {
        assert_send_sync::<Waiter>();
        assert_send_sync::<PendingCalls>();
        assert_send_sync::<crate::adapter::AdapterProxy>();
        assert_send_sync::<crate::servant::ServantProxy>();
    }

    #[test]
    fn test_non_sync_callback_accepted() {
        let pending = PendingCalls::new();
        // Cell is Send but not Sync
        let seen = std::cell::Cell::new(0);
        let (tx, rx) = std::sync::mpsc::channel();
        pending.register_callback(
            5,
            Box::new(move |res| {
                seen.set(res.unwrap().request_id);
                tx.send(seen.get()).unwrap();
            }),
        );
        assert!(pending.deliver(response(5)));
        assert_eq!(rx.recv().unwrap(), 5);
    }

    #[test]
    fn test_fail_all_runs_callbacks() {
        let pending = PendingCalls::new();
        let failed = Arc::new(AtomicUsize::new(0));
        for id in 1..=3 {
            let f = failed.clone();
            pending.register_callback(
                id,
                Box::new(move |res| {
                    assert!(matches!(res, Err(RpcError::Shutdown)));
                    f.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }
        let _rx = pending.register(4);
        pending.fail_all(|| RpcError::Shutdown);
        assert_eq!(failed.load(Ordering::SeqCst), 3);
        assert!(pending.is_empty());
    }
}
