// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::{EndpointList, Selector, SelectorError};
use crate::endpoint::Endpoint;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

const NAME: &str = "round_robin";

/// Rotates through endpoints with an atomic cursor.
///
/// The cursor is reseeded to a random position on every topology change so
/// that many clients refreshing at once do not all start on the same endpoint.
#[derive(Debug)]
pub struct RoundRobin {
    enable_weight: bool,
    list: RwLock<EndpointList>,
    cursor: AtomicU64,
    weight_cursor: AtomicU64,
}

impl RoundRobin {
    pub fn new(enable_weight: bool) -> Self {
        Self {
            enable_weight,
            list: RwLock::new(EndpointList::default()),
            cursor: AtomicU64::new(0),
            weight_cursor: AtomicU64::new(0),
        }
    }

    fn rebuild(&self, list: &mut EndpointList) {
        list.rebuild_weights(self.enable_weight);
        let start = match list.endpoints.len() {
            0 => 0,
            n => fastrand::u64(..n as u64),
        };
        self.cursor.store(start, Ordering::Relaxed);
        let start = match list.weight_list.len() {
            0 => 0,
            n => fastrand::u64(..n as u64),
        };
        self.weight_cursor.store(start, Ordering::Relaxed);
    }
}

impl Selector for RoundRobin {
    fn select(&self, _hash_code: u32) -> Result<Endpoint, SelectorError> {
        let list = self.list.read();
        if list.endpoints.is_empty() {
            return Err(SelectorError::Empty(NAME));
        }
        if !list.weight_list.is_empty() {
            let idx = self.weight_cursor.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
            let slot = list.weight_list[(idx % list.weight_list.len() as u64) as usize];
            return Ok(list.endpoints[slot].clone());
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        Ok(list.endpoints[(idx % list.endpoints.len() as u64) as usize].clone())
    }

    fn refresh(&self, endpoints: &[Endpoint]) {
        let mut list = self.list.write();
        list.reset(endpoints);
        self.rebuild(&mut list);
    }

    fn add(&self, endpoint: Endpoint) -> Result<(), SelectorError> {
        let mut list = self.list.write();
        list.add(NAME, endpoint)?;
        self.rebuild(&mut list);
        Ok(())
    }

    fn remove(&self, endpoint: &Endpoint) -> Result<(), SelectorError> {
        let mut list = self.list.write();
        list.remove(NAME, endpoint)?;
        self.rebuild(&mut list);
        Ok(())
    }

    fn len(&self) -> usize {
        self.list.read().endpoints.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::sample_endpoints;
    use std::collections::HashMap;

    #[test]
    fn test_empty() {
        let rr = RoundRobin::new(false);
        assert_eq!(rr.select(0), Err(SelectorError::Empty("round_robin")));
    }

    #[test]
    fn test_fairness() {
        let rr = RoundRobin::new(false);
        rr.refresh(&sample_endpoints(4));
        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..400 {
            *counts.entry(rr.select(0).unwrap().hash_key()).or_default() += 1;
        }
        assert_eq!(counts.len(), 4);
        for count in counts.values() {
            assert!((95..=105).contains(count), "count {count} outside 100 +/- 5%");
        }
    }

    #[test]
    fn test_consecutive_picks_rotate() {
        let rr = RoundRobin::new(false);
        rr.refresh(&sample_endpoints(3));
        let a = rr.select(0).unwrap();
        let b = rr.select(0).unwrap();
        let c = rr.select(0).unwrap();
        let d = rr.select(0).unwrap();
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_eq!(a, d);
    }

    #[test]
    fn test_add_remove() {
        let rr = RoundRobin::new(false);
        let eps = sample_endpoints(2);
        rr.add(eps[0].clone()).unwrap();
        rr.add(eps[1].clone()).unwrap();
        assert!(rr.add(eps[1].clone()).is_err());
        rr.remove(&eps[0]).unwrap();
        assert_eq!(rr.len(), 1);
        for _ in 0..5 {
            assert_eq!(rr.select(0).unwrap(), eps[1]);
        }
    }

    #[test]
    fn test_static_weight_distribution() {
        let rr = RoundRobin::new(true);
        rr.refresh(&[
            Endpoint::tcp("light", 1).with_static_weight(10),
            Endpoint::tcp("heavy", 1).with_static_weight(30),
        ]);
        let mut heavy = 0;
        for _ in 0..400 {
            if rr.select(0).unwrap().host == "heavy" {
                heavy += 1;
            }
        }
        // ratio 3 lifts to 10: weights 3 and 10 over a 13-slot cycle
        assert!((290..=320).contains(&heavy), "heavy picked {heavy} times");
    }
}
