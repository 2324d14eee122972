// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-invocation state and request id allocation.

use crate::endpoint::Endpoint;
use crate::protocol::{RequestPacket, ResponsePacket};
use crate::selector::HashKey;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::{Duration, Instant};

/// One invocation as seen by the filter chain.
///
/// Filters may rewrite `request.context`, `request.status` or the hash key
/// before the call is dispatched, and inspect `response` afterwards.
#[derive(Debug, Clone)]
pub struct Message {
    pub request: RequestPacket,
    /// Set once a response was received.
    pub response: Option<ResponsePacket>,
    /// Hash routing, if the caller asked for it.
    pub hash: Option<HashKey>,
    /// Endpoint the call was dispatched to.
    pub endpoint: Option<Endpoint>,
    /// Protocol return code of the outcome.
    pub status: i32,
    begin: Instant,
    end: Option<Instant>,
}

impl Message {
    pub fn new(request: RequestPacket) -> Self {
        Self {
            request,
            response: None,
            hash: None,
            endpoint: None,
            status: crate::protocol::ret::SUCCESS,
            begin: Instant::now(),
            end: None,
        }
    }

    pub fn with_hash(mut self, hash: Option<HashKey>) -> Self {
        self.hash = hash;
        self
    }

    pub fn request_id(&self) -> i32 {
        self.request.request_id
    }

    pub fn is_oneway(&self) -> bool {
        self.request.is_oneway()
    }

    /// Stamp the end time (first call wins).
    pub fn finish(&mut self) {
        self.end.get_or_insert_with(Instant::now);
    }

    /// Time from creation to `finish`, or to now while still running.
    pub fn cost(&self) -> Duration {
        self.end.unwrap_or_else(Instant::now).duration_since(self.begin)
    }
}

/// Request id source shared by every proxy of a communicator.
///
/// Ids increase by one, wrap from `i32::MAX` back to 1 and never yield 0,
/// which is reserved for server pushes.
#[derive(Debug, Default)]
pub struct RequestIdGenerator {
    last: AtomicI32,
}

fn advance(current: i32) -> i32 {
    if current <= 0 || current == i32::MAX {
        1
    } else {
        current + 1
    }
}

impl RequestIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start after `last` (used to exercise the wrap).
    pub fn starting_after(last: i32) -> Self {
        Self {
            last: AtomicI32::new(last),
        }
    }

    pub fn next_id(&self) -> i32 {
        let prev = self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| Some(advance(cur)))
            .unwrap_or_else(|cur| cur);
        advance(prev)
    }
}
