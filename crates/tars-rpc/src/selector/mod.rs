// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Load-balancing selectors.
//!
//! Every selector owns its endpoint set behind a lock and answers
//! `select(hash_code)` without touching the network:
//!
//! | Selector | Uses hash code | Stable across topology changes |
//! |----------|----------------|--------------------------------|
//! | [`RoundRobin`] | no | n/a |
//! | [`Random`] | no | n/a |
//! | [`ModHash`] | yes | no |
//! | [`ConsistentHash`] | yes | yes, per endpoint |
//!
//! Mod-hash and the static weight list remap most keys whenever the endpoint
//! set changes. Use [`ConsistentHash`] when key affinity must survive
//! endpoint churn.

mod consistent_hash;
mod mod_hash;
mod random;
mod round_robin;
mod smooth;

pub use consistent_hash::{ConsistentHash, HashAlgorithm, DEFAULT_VIRTUAL_NODES};
pub use mod_hash::ModHash;
pub use random::Random;
pub use round_robin::RoundRobin;
pub use smooth::SmoothWeighted;

use crate::endpoint::Endpoint;
use std::collections::{HashMap, HashSet};

/// Lower bound of the normalized weight ratio.
pub const MIN_STATIC_WEIGHT_LIMIT: i64 = 10;
/// Upper bound of the normalized weight ratio.
pub const MAX_STATIC_WEIGHT_LIMIT: i64 = 100;

/// Selector failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("{0}: no endpoint to select")]
    Empty(&'static str),

    #[error("{selector}: endpoint {key} already exists")]
    AlreadyExists { selector: &'static str, key: String },

    #[error("{selector}: endpoint {key} already removed")]
    NotFound { selector: &'static str, key: String },
}

/// Common selector contract.
pub trait Selector: Send + Sync {
    /// Pick one endpoint. Hash-based selectors route on `hash_code`; others ignore it.
    fn select(&self, hash_code: u32) -> Result<Endpoint, SelectorError>;

    /// Replace the whole endpoint set.
    fn refresh(&self, endpoints: &[Endpoint]);

    fn add(&self, endpoint: Endpoint) -> Result<(), SelectorError>;

    fn remove(&self, endpoint: &Endpoint) -> Result<(), SelectorError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Which hash-based selector an invocation routes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashType {
    ModHash,
    ConsistentHash,
}

/// Hash routing request carried by an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashKey {
    pub code: u32,
    pub kind: HashType,
}

impl HashKey {
    pub fn mod_hash(code: u32) -> Self {
        Self {
            code,
            kind: HashType::ModHash,
        }
    }

    pub fn consistent(code: u32) -> Self {
        Self {
            code,
            kind: HashType::ConsistentHash,
        }
    }

    /// Mod-hash key derived from a string with [`crate::hash::hash_string`].
    pub fn mod_hash_str(key: &str) -> Self {
        Self::mod_hash(crate::hash::hash_string(key))
    }

    /// Consistent-hash key derived from a string with [`crate::hash::magic_string_hash`].
    pub fn consistent_str(key: &str) -> Self {
        Self::consistent(crate::hash::magic_string_hash(key))
    }
}

/// Build the pre-expanded static weight index list.
///
/// Returns `None` unless every endpoint uses static weights. Weights are
/// normalized into a ratio range of 10..=100, then interleaved with smooth
/// weighted round robin so heavy endpoints do not come up in long runs.
/// Endpoints whose normalized weight is zero are placed first, once each.
pub fn build_static_weight_list(endpoints: &[Endpoint]) -> Option<Vec<usize>> {
    if endpoints.iter().any(|ep| !ep.is_static_weight()) {
        return None;
    }
    if endpoints.is_empty() {
        return Some(Vec::new());
    }

    let mut min_weight = i64::MAX;
    let mut max_weight = i64::MIN;
    let mut total_capacity = 0i64;
    for ep in endpoints {
        let w = i64::from(ep.weight);
        total_capacity += w.max(0);
        min_weight = min_weight.min(w);
        max_weight = max_weight.max(w);
    }

    let mut list = Vec::with_capacity(total_capacity as usize + endpoints.len());
    if max_weight <= 0 {
        list.extend(0..endpoints.len());
        return Some(list);
    }

    let (max_range, mut total_weight) = if min_weight > 0 {
        (
            (max_weight / min_weight).clamp(MIN_STATIC_WEIGHT_LIMIT, MAX_STATIC_WEIGHT_LIMIT),
            0,
        )
    } else {
        (1, 1)
    };

    let mut id_to_weight = HashMap::new();
    let mut pairs: Vec<(i64, usize)> = Vec::new();
    for (idx, ep) in endpoints.iter().enumerate() {
        let weight = i64::from(ep.weight) * max_range / max_weight;
        if weight > 0 {
            total_weight += weight;
            id_to_weight.insert(idx, weight);
            pairs.push((weight, idx));
        } else {
            list.push(idx);
        }
    }

    let names: Vec<String> = endpoints.iter().map(ToString::to_string).collect();
    for _ in 0..total_weight {
        pairs.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| names[a.1].cmp(&names[b.1])));
        let mut next = Vec::with_capacity(pairs.len());
        for (pos, &(current, idx)) in pairs.iter().enumerate().rev() {
            let weight = id_to_weight[&idx];
            if pos + 1 == pairs.len() {
                list.push(idx);
                next.push((current - total_weight + weight, idx));
            } else {
                next.push((current + weight, idx));
            }
        }
        pairs = next;
    }
    Some(list)
}

/// Endpoint set shared by the list-based selectors.
#[derive(Debug, Default)]
pub(crate) struct EndpointList {
    pub(crate) endpoints: Vec<Endpoint>,
    keys: HashSet<String>,
    /// Pre-expanded static weight indices, empty when weighting is off.
    pub(crate) weight_list: Vec<usize>,
}

impl EndpointList {
    pub(crate) fn add(&mut self, selector: &'static str, ep: Endpoint) -> Result<(), SelectorError> {
        let key = ep.hash_key();
        if !self.keys.insert(key.clone()) {
            return Err(SelectorError::AlreadyExists { selector, key });
        }
        self.endpoints.push(ep);
        Ok(())
    }

    pub(crate) fn remove(&mut self, selector: &'static str, ep: &Endpoint) -> Result<(), SelectorError> {
        let key = ep.hash_key();
        if !self.keys.remove(&key) {
            return Err(SelectorError::NotFound { selector, key });
        }
        self.endpoints.retain(|e| e != ep);
        Ok(())
    }

    pub(crate) fn reset(&mut self, endpoints: &[Endpoint]) {
        self.endpoints.clear();
        self.keys.clear();
        for ep in endpoints {
            // duplicates in a refresh are skipped
            let _ = self.add("refresh", ep.clone());
        }
    }

    pub(crate) fn rebuild_weights(&mut self, enable_weight: bool) {
        self.weight_list = if enable_weight {
            build_static_weight_list(&self.endpoints).unwrap_or_default()
        } else {
            Vec::new()
        };
    }
}

#[cfg(test)]
pub(crate) fn sample_endpoints(n: u16) -> Vec<Endpoint> {
    (0..n).map(|i| Endpoint::tcp(format!("10.0.0.{}", i + 1), 8000 + i)).collect()
}
