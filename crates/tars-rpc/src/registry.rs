// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Endpoint discovery collaborator.
//!
//! The runtime only needs one question answered: which endpoints serve an
//! object (optionally within a set) right now. [`StaticRegistry`] answers it
//! from an in-memory table, for direct deployments and tests.

use crate::endpoint::Endpoint;
use crate::error::{RpcError, RpcResult};
use crate::BoxFuture;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Active and inactive endpoints of one object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointLists {
    pub active: Vec<Endpoint>,
    pub inactive: Vec<Endpoint>,
}

impl EndpointLists {
    pub fn new(active: Vec<Endpoint>, inactive: Vec<Endpoint>) -> Self {
        Self { active, inactive }
    }
}

/// Endpoint lookup.
pub trait Registry: Send + Sync {
    /// Current endpoint lists for `obj`, scoped to `set` when given.
    fn find_active_and_inactive<'a>(
        &'a self,
        obj: &'a str,
        set: Option<&'a str>,
    ) -> BoxFuture<'a, RpcResult<EndpointLists>>;
}

fn table_key(obj: &str, set: Option<&str>) -> String {
    match set {
        Some(set) if !set.is_empty() => format!("{}#{}", obj, set),
        _ => obj.to_string(),
    }
}

/// In-memory registry.
///
/// Set-scoped lookups fall back to the unscoped entry when no entry was
/// registered for that set.
#[derive(Debug, Default)]
pub struct StaticRegistry {
    table: RwLock<HashMap<String, EndpointLists>>,
    queries: AtomicUsize,
    unavailable: AtomicBool,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the lists of `obj`.
    pub fn set(&self, obj: &str, active: Vec<Endpoint>, inactive: Vec<Endpoint>) {
        self.table
            .write()
            .insert(table_key(obj, None), EndpointLists::new(active, inactive));
    }

    /// Register the lists of `obj` inside `set`.
    pub fn set_in(&self, obj: &str, set: &str, active: Vec<Endpoint>, inactive: Vec<Endpoint>) {
        self.table
            .write()
            .insert(table_key(obj, Some(set)), EndpointLists::new(active, inactive));
    }

    pub fn remove(&self, obj: &str) {
        self.table.write().remove(&table_key(obj, None));
    }

    /// Make every lookup fail, simulating an unreachable registry.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Release);
    }

    /// Number of lookups served so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }

    fn lookup(&self, obj: &str, set: Option<&str>) -> RpcResult<EndpointLists> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        if self.unavailable.load(Ordering::Acquire) {
            return Err(RpcError::Registry("registry unavailable".into()));
        }
        let table = self.table.read();
        table
            .get(&table_key(obj, set))
            .or_else(|| table.get(&table_key(obj, None)))
            .cloned()
            .ok_or_else(|| RpcError::Registry(format!("no endpoints registered for {}", obj)))
    }
}

impl Registry for StaticRegistry {
    fn find_active_and_inactive<'a>(
        &'a self,
        obj: &'a str,
        set: Option<&'a str>,
    ) -> BoxFuture<'a, RpcResult<EndpointLists>> {
        Box::pin(async move { self.lookup(obj, set) })
    }
}
