// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::cast_precision_loss)] // Ratio assertions

//! Selector properties through the public API: ring stability under
//! removal, round robin fairness and weighted proportions.

use std::collections::HashMap;
use tars_rpc::selector::{ConsistentHash, HashAlgorithm, ModHash, RoundRobin, Selector};
use tars_rpc::Endpoint;

fn endpoints(hosts: &[&str]) -> Vec<Endpoint> {
    hosts.iter().map(|h| Endpoint::tcp(*h, 10000)).collect()
}

fn sample_keys() -> impl Iterator<Item = u32> {
    (0..10_000u32).map(|i| tars_rpc::hash::magic_string_hash(&format!("key-{i}")))
}

#[test]
fn test_ring_removal_moves_only_removed_keys() {
    for algorithm in [HashAlgorithm::Ketama, HashAlgorithm::Default] {
        let ring = ConsistentHash::new(false, algorithm);
        ring.refresh(&endpoints(&["a", "b", "c"]));
        let before: Vec<(u32, Endpoint)> =
            sample_keys().map(|k| (k, ring.select(k).unwrap())).collect();

        ring.remove(&Endpoint::tcp("b", 10000)).unwrap();
        let mut moved = 0;
        for (key, owner) in &before {
            let now = ring.select(*key).unwrap();
            if owner.host == "b" {
                assert_ne!(now.host, "b");
                moved += 1;
            } else {
                assert_eq!(&now, owner, "key {key} moved off a surviving endpoint");
            }
        }
        assert!(moved > 0);
    }
}

#[test]
fn test_round_robin_fair_within_five_percent() {
    let rr = RoundRobin::new(false);
    rr.refresh(&endpoints(&["a", "b", "c", "d"]));
    let mut counts: HashMap<String, usize> = HashMap::new();
    for _ in 0..400 {
        *counts.entry(rr.select(0).unwrap().host).or_default() += 1;
    }
    assert_eq!(counts.len(), 4);
    for (host, n) in counts {
        assert!((95..=105).contains(&n), "{host} picked {n} times");
    }
}

#[test]
fn test_weighted_round_robin_follows_weights() {
    let rr = RoundRobin::new(true);
    rr.refresh(&[
        Endpoint::tcp("heavy", 1).with_static_weight(90),
        Endpoint::tcp("light", 1).with_static_weight(30),
    ]);
    let mut heavy = 0usize;
    let total = 1200;
    for _ in 0..total {
        if rr.select(0).unwrap().host == "heavy" {
            heavy += 1;
        }
    }
    let share = heavy as f64 / total as f64;
    assert!((0.70..=0.80).contains(&share), "heavy share {share}");
}

#[test]
fn test_mod_hash_deterministic_but_unstable() {
    let selector = ModHash::new(false);
    selector.refresh(&endpoints(&["a", "b", "c", "d"]));
    let first = selector.select(12345).unwrap();
    assert_eq!(selector.select(12345).unwrap(), first);

    let before: Vec<Endpoint> = sample_keys().map(|k| selector.select(k).unwrap()).collect();
    selector.remove(&Endpoint::tcp("d", 10000)).unwrap();
    let remapped = sample_keys()
        .zip(&before)
        .filter(|(k, owner)| selector.select(*k).unwrap() != **owner)
        .count();
    // plain modulo remaps most keys when one of four endpoints leaves
    assert!(remapped > 5_000, "only {remapped} keys moved");
}
