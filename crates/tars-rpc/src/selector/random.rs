// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::{EndpointList, Selector, SelectorError};
use crate::endpoint::Endpoint;
use parking_lot::RwLock;

const NAME: &str = "random";

/// Uniform random pick, or weighted via the static weight list.
#[derive(Debug)]
pub struct Random {
    enable_weight: bool,
    list: RwLock<EndpointList>,
}

impl Random {
    pub fn new(enable_weight: bool) -> Self {
        Self {
            enable_weight,
            list: RwLock::new(EndpointList::default()),
        }
    }
}

impl Selector for Random {
    fn select(&self, _hash_code: u32) -> Result<Endpoint, SelectorError> {
        let list = self.list.read();
        if list.endpoints.is_empty() {
            return Err(SelectorError::Empty(NAME));
        }
        if !list.weight_list.is_empty() {
            let slot = list.weight_list[fastrand::usize(..list.weight_list.len())];
            return Ok(list.endpoints[slot].clone());
        }
        Ok(list.endpoints[fastrand::usize(..list.endpoints.len())].clone())
    }

    fn refresh(&self, endpoints: &[Endpoint]) {
        let mut list = self.list.write();
        list.reset(endpoints);
        list.rebuild_weights(self.enable_weight);
    }

    fn add(&self, endpoint: Endpoint) -> Result<(), SelectorError> {
        let mut list = self.list.write();
        list.add(NAME, endpoint)?;
        list.rebuild_weights(self.enable_weight);
        Ok(())
    }

    fn remove(&self, endpoint: &Endpoint) -> Result<(), SelectorError> {
        let mut list = self.list.write();
        list.remove(NAME, endpoint)?;
        list.rebuild_weights(self.enable_weight);
        Ok(())
    }

    fn len(&self) -> usize {
        self.list.read().endpoints.len()
    }
}
