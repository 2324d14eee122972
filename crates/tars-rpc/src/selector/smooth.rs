// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Stateful smooth weighted round robin.

use parking_lot::Mutex;

#[derive(Debug)]
struct Node<T> {
    item: T,
    weight: i64,
    current: i64,
}

/// Smooth weighted round robin over arbitrary items.
///
/// Each pick adds every node's weight to its running score, returns the
/// highest scorer and subtracts the total weight from it. Over one cycle of
/// `sum(weights)` picks every node is returned exactly `weight` times, spread
/// as evenly as possible.
#[derive(Debug)]
pub struct SmoothWeighted<T> {
    nodes: Mutex<Vec<Node<T>>>,
}

impl<T: Clone + PartialEq> SmoothWeighted<T> {
    pub fn new() -> Self {
        Self {
            nodes: Mutex::new(Vec::new()),
        }
    }

    /// Add an item or update its weight. Non-positive weights are refused.
    pub fn add(&self, item: T, weight: i64) -> bool {
        if weight <= 0 {
            return false;
        }
        let mut nodes = self.nodes.lock();
        if let Some(node) = nodes.iter_mut().find(|n| n.item == item) {
            node.weight = weight;
        } else {
            nodes.push(Node {
                item,
                weight,
                current: 0,
            });
        }
        for node in nodes.iter_mut() {
            node.current = 0;
        }
        true
    }

    pub fn remove(&self, item: &T) -> bool {
        let mut nodes = self.nodes.lock();
        let before = nodes.len();
        nodes.retain(|n| n.item != *item);
        nodes.len() != before
    }

    pub fn len(&self) -> usize {
        self.nodes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn next(&self) -> Option<T> {
        let mut nodes = self.nodes.lock();
        if nodes.is_empty() {
            return None;
        }
        let total: i64 = nodes.iter().map(|n| n.weight).sum();
        // highest running score wins, first one on ties
        let mut pick = 0;
        for idx in 0..nodes.len() {
            nodes[idx].current += nodes[idx].weight;
            if nodes[idx].current > nodes[pick].current {
                pick = idx;
            }
        }
        nodes[pick].current -= total;
        Some(nodes[pick].item.clone())
    }
}

impl<T: Clone + PartialEq> Default for SmoothWeighted<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classic_sequence() {
        let wrr = SmoothWeighted::new();
        wrr.add("a", 5);
        wrr.add("b", 1);
        wrr.add("c", 1);
        let picks: Vec<_> = (0..7).map(|_| wrr.next().unwrap()).collect();
        assert_eq!(picks, vec!["a", "a", "b", "a", "c", "a", "a"]);
    }

    #[test]
    fn test_cycle_counts() {
        let wrr = SmoothWeighted::new();
        wrr.add(1, 3);
        wrr.add(2, 2);
        let picks: Vec<_> = (0..10).map(|_| wrr.next().unwrap()).collect();
        assert_eq!(picks.iter().filter(|&&p| p == 1).count(), 6);
    }

    #[test]
    fn test_add_remove() {
        let wrr = SmoothWeighted::new();
        assert!(!wrr.add("zero", 0));
        assert!(wrr.next().is_none());
        assert!(wrr.add("x", 2));
        assert!(wrr.remove(&"x"));
        assert!(!wrr.remove(&"x"));
        assert!(wrr.is_empty());
    }
}
