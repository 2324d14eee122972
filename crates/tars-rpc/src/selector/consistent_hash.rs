// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::{Selector, SelectorError};
use crate::endpoint::Endpoint;
use md5::{Digest, Md5};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const NAME: &str = "consistent_hash";

/// Virtual-node budget per endpoint when weights are off.
pub const DEFAULT_VIRTUAL_NODES: i32 = 100;

/// How virtual-node names are turned into ring points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    /// Four little-endian points per MD5 digest.
    #[default]
    Ketama,
    /// One point per digest: XOR of its four little-endian words.
    Default,
}

fn digest_words(key: &str) -> [u32; 4] {
    let digest = Md5::digest(key.as_bytes());
    let mut words = [0u32; 4];
    for (k, word) in words.iter_mut().enumerate() {
        *word = u32::from_le_bytes([
            digest[4 * k],
            digest[4 * k + 1],
            digest[4 * k + 2],
            digest[4 * k + 3],
        ]);
    }
    words
}

#[derive(Debug, Default)]
struct Ring {
    keys: HashSet<String>,
    /// Sorted by point, then endpoint key for collisions.
    points: Vec<(u32, Endpoint)>,
}

/// Consistent-hash ring of virtual nodes.
///
/// Each endpoint owns `weight / 4` virtual nodes (at least one) when weights
/// are enabled, otherwise `DEFAULT_VIRTUAL_NODES / 4`. Removing an endpoint
/// deletes only its own points, so keys owned by other endpoints never move.
#[derive(Debug)]
pub struct ConsistentHash {
    enable_weight: bool,
    algorithm: HashAlgorithm,
    replicas: i32,
    ring: RwLock<Ring>,
}

impl ConsistentHash {
    pub fn new(enable_weight: bool, algorithm: HashAlgorithm) -> Self {
        Self {
            enable_weight,
            algorithm,
            replicas: DEFAULT_VIRTUAL_NODES,
            ring: RwLock::new(Ring::default()),
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    fn virtual_nodes(&self, ep: &Endpoint) -> usize {
        let weight = if self.enable_weight {
            ep.weight
        } else {
            self.replicas
        };
        if weight > 0 {
            (weight / 4).max(1) as usize
        } else {
            0
        }
    }

    /// Ring points owned by `ep`.
    pub fn points_for(&self, ep: &Endpoint) -> Vec<u32> {
        let key = ep.hash_key();
        let mut points = Vec::new();
        for i in 0..self.virtual_nodes(ep) {
            let words = digest_words(&format!("{}_{}", key, i));
            match self.algorithm {
                HashAlgorithm::Ketama => points.extend_from_slice(&words),
                HashAlgorithm::Default => points.push(words[0] ^ words[1] ^ words[2] ^ words[3]),
            }
        }
        points
    }

    /// Find the owner of a string key, hashed with this ring's algorithm.
    pub fn find_str(&self, key: &str) -> Option<Endpoint> {
        let words = digest_words(key);
        let code = match self.algorithm {
            HashAlgorithm::Ketama => words[0],
            HashAlgorithm::Default => words[0] ^ words[1] ^ words[2] ^ words[3],
        };
        self.find(code)
    }

    /// First point at or after `code`, wrapping to the start of the ring.
    pub fn find(&self, code: u32) -> Option<Endpoint> {
        let ring = self.ring.read();
        if ring.points.is_empty() {
            return None;
        }
        let idx = ring.points.partition_point(|(p, _)| *p < code);
        let idx = if idx == ring.points.len() { 0 } else { idx };
        Some(ring.points[idx].1.clone())
    }

    fn insert_locked(&self, ring: &mut Ring, ep: Endpoint) -> Result<(), SelectorError> {
        let key = ep.hash_key();
        if !ring.keys.insert(key.clone()) {
            return Err(SelectorError::AlreadyExists {
                selector: NAME,
                key,
            });
        }
        for point in self.points_for(&ep) {
            ring.points.push((point, ep.clone()));
        }
        Ok(())
    }

    fn sort(ring: &mut Ring) {
        ring.points.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| a.1.host.cmp(&b.1.host))
                .then_with(|| a.1.port.cmp(&b.1.port))
        });
    }

    pub fn point_count(&self) -> usize {
        self.ring.read().points.len()
    }
}

impl Selector for ConsistentHash {
    fn select(&self, hash_code: u32) -> Result<Endpoint, SelectorError> {
        self.find(hash_code).ok_or(SelectorError::Empty(NAME))
    }

    fn refresh(&self, endpoints: &[Endpoint]) {
        let mut ring = self.ring.write();
        *ring = Ring::default();
        for ep in endpoints {
            let _ = self.insert_locked(&mut ring, ep.clone());
        }
        Self::sort(&mut ring);
    }

    fn add(&self, endpoint: Endpoint) -> Result<(), SelectorError> {
        let mut ring = self.ring.write();
        self.insert_locked(&mut ring, endpoint)?;
        Self::sort(&mut ring);
        Ok(())
    }

    fn remove(&self, endpoint: &Endpoint) -> Result<(), SelectorError> {
        let mut ring = self.ring.write();
        let key = endpoint.hash_key();
        if !ring.keys.remove(&key) {
            return Err(SelectorError::NotFound {
                selector: NAME,
                key,
            });
        }
        ring.points.retain(|(_, ep)| ep != endpoint);
        Ok(())
    }

    fn len(&self) -> usize {
        self.ring.read().keys.len()
    }
}
