// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Live endpoint set and adapter pool of one remote object.
//!
//! # Lifecycle
//!
//! ```text
//! registry ──refresh()──> active list ──(minus unhealthy)──> alive set
//!                              │                               │
//!                              └── evicts stale adapters       └── selectors
//!
//! select(hash) ──> alive set ──> adapter pool (lazy AdapterProxy per endpoint)
//!        └─ nothing healthy ──> random pick from the active list (degraded)
//! ```
//!
//! The network query of a refresh runs before any structural change; the
//! alive set is rebuilt off to the side and published with a single swap.

use crate::adapter::{AdapterOptions, AdapterProxy, HealthEvent};
use crate::cache::EndpointCache;
use crate::config::LoadBalance;
use crate::endpoint::{Endpoint, ObjectRef};
use crate::error::{RpcError, RpcResult};
use crate::registry::{EndpointLists, Registry};
use crate::selector::{
    ConsistentHash, HashAlgorithm, HashKey, HashType, ModHash, Random, RoundRobin, Selector,
};
use arc_swap::ArcSwap;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Routing policy of a manager.
#[derive(Clone)]
pub struct ManagerOptions {
    pub load_balance: LoadBalance,
    pub hash_algorithm: HashAlgorithm,
    /// Pick among every active endpoint when no healthy one is left.
    pub degrade_to_unhealthy: bool,
    /// Registry identity, part of the endpoint cache key.
    pub locator: String,
    pub adapter: AdapterOptions,
}

/// Healthy endpoints and the selectors built over them.
struct AliveSet {
    endpoints: Vec<Endpoint>,
    balance: Box<dyn Selector>,
    mod_hash: ModHash,
    consistent: ConsistentHash,
}

impl AliveSet {
    fn build(endpoints: Vec<Endpoint>, options: &ManagerOptions) -> Self {
        // weighting only applies when every endpoint carries a static weight
        let weighted = !endpoints.is_empty() && endpoints.iter().all(Endpoint::is_static_weight);
        let balance: Box<dyn Selector> = match options.load_balance {
            LoadBalance::RoundRobin => Box::new(RoundRobin::new(weighted)),
            LoadBalance::Random => Box::new(Random::new(weighted)),
        };
        let mod_hash = ModHash::new(weighted);
        let consistent = ConsistentHash::new(weighted, options.hash_algorithm);
        balance.refresh(&endpoints);
        mod_hash.refresh(&endpoints);
        consistent.refresh(&endpoints);
        Self {
            endpoints,
            balance,
            mod_hash,
            consistent,
        }
    }

    fn select(&self, hash: Option<HashKey>) -> RpcResult<Endpoint> {
        let picked = match hash {
            Some(HashKey {
                code,
                kind: HashType::ModHash,
            }) => self.mod_hash.select(code),
            Some(HashKey {
                code,
                kind: HashType::ConsistentHash,
            }) => self.consistent.select(code),
            None => self.balance.select(0),
        };
        Ok(picked?)
    }
}

fn same_endpoints(a: &[Endpoint], b: &[Endpoint]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_string() == y.to_string())
}

fn sort_endpoints(list: &mut [Endpoint]) {
    list.sort_by_cached_key(|ep| ep.to_string());
}

/// Endpoint discovery, selection and adapter pool of one object.
pub struct EndpointManager {
    obj_name: String,
    set: Option<String>,
    direct: bool,
    registry: Option<Arc<dyn Registry>>,
    cache: Option<Arc<EndpointCache>>,
    options: ManagerOptions,
    lists: RwLock<EndpointLists>,
    alive: ArcSwap<AliveSet>,
    adapters: DashMap<String, Arc<AdapterProxy>>,
    refresh_lock: tokio::sync::Mutex<()>,
    closed: AtomicBool,
}

impl EndpointManager {
    /// Build the manager and load its first endpoint list.
    ///
    /// Direct objects use their pinned endpoints. Registry-backed objects run
    /// one refresh; if the registry cannot answer, the endpoint cache is used
    /// instead and the next periodic refresh retries the registry.
    pub async fn new(
        obj: &ObjectRef,
        set: Option<String>,
        options: ManagerOptions,
        registry: Option<Arc<dyn Registry>>,
        cache: Option<Arc<EndpointCache>>,
    ) -> RpcResult<Arc<Self>> {
        if obj.direct.is_none() && registry.is_none() {
            return Err(RpcError::Config(format!(
                "{} has no endpoints and no registry is configured",
                obj.name
            )));
        }
        let manager = Arc::new(Self {
            obj_name: obj.name.clone(),
            set: set.filter(|s| !s.is_empty()),
            direct: obj.is_direct(),
            registry,
            cache,
            alive: ArcSwap::from_pointee(AliveSet::build(Vec::new(), &options)),
            options,
            lists: RwLock::new(EndpointLists::default()),
            adapters: DashMap::new(),
            refresh_lock: tokio::sync::Mutex::new(()),
            closed: AtomicBool::new(false),
        });

        if let Some(direct) = &obj.direct {
            manager.apply(EndpointLists::new(direct.clone(), Vec::new()), false);
            return Ok(manager);
        }

        if let Err(e) = manager.refresh().await {
            log::error!("[manager] {} initial refresh failed: {}", manager.obj_name, e);
            if let Some(lists) = manager.cached_lists() {
                log::info!(
                    "[manager] {} starting from {} cached endpoints",
                    manager.obj_name,
                    lists.active.len()
                );
                manager.apply(lists, false);
            }
        }
        Ok(manager)
    }

    pub fn obj_name(&self) -> &str {
        &self.obj_name
    }

    pub fn set(&self) -> Option<&str> {
        self.set.as_deref()
    }

    pub fn is_direct(&self) -> bool {
        self.direct
    }

    fn cache_set_id(&self) -> &str {
        self.set.as_deref().unwrap_or_default()
    }

    fn cached_lists(&self) -> Option<EndpointLists> {
        self.cache.as_ref()?.lookup(
            &self.obj_name,
            self.cache_set_id(),
            &self.options.locator,
        )
    }

    /// Query the registry and apply the result.
    ///
    /// Returns `Ok(true)` when the active or inactive list changed. Direct
    /// objects never refresh.
    pub async fn refresh(&self) -> RpcResult<bool> {
        if self.direct || self.is_closed() {
            return Ok(false);
        }
        let Some(registry) = &self.registry else {
            return Err(RpcError::Registry(format!(
                "no registry for {}",
                self.obj_name
            )));
        };
        let _guard = self.refresh_lock.lock().await;
        let lists = registry
            .find_active_and_inactive(&self.obj_name, self.set.as_deref())
            .await?;
        Ok(self.apply(lists, true))
    }

    /// Install new lists. An empty active list is ignored.
    fn apply(&self, mut lists: EndpointLists, persist: bool) -> bool {
        if lists.active.is_empty() {
            log::error!(
                "[manager] {} registry returned no active endpoints, keeping current list",
                self.obj_name
            );
            return false;
        }
        sort_endpoints(&mut lists.active);
        sort_endpoints(&mut lists.inactive);

        {
            let current = self.lists.read();
            if same_endpoints(&current.active, &lists.active)
                && same_endpoints(&current.inactive, &lists.inactive)
            {
                log::trace!("[manager] {} endpoint list unchanged", self.obj_name);
                return false;
            }
        }

        log::info!(
            "[manager] {} endpoints: {} active, {} inactive",
            self.obj_name,
            lists.active.len(),
            lists.inactive.len()
        );
        if persist {
            if let Some(cache) = &self.cache {
                if let Err(e) =
                    cache.store(&self.obj_name, self.cache_set_id(), &self.options.locator, &lists)
                {
                    log::warn!(
                        "[manager] {} cannot write {}: {}",
                        self.obj_name,
                        cache.path().display(),
                        e
                    );
                }
            }
        }

        let keep: std::collections::HashSet<String> =
            lists.active.iter().map(Endpoint::hash_key).collect();
        *self.lists.write() = lists;

        let stale: Vec<String> = self
            .adapters
            .iter()
            .filter(|entry| !keep.contains(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        for key in stale {
            if let Some((_, adapter)) = self.adapters.remove(&key) {
                log::debug!("[manager] {} evicting {}", self.obj_name, key);
                self.retire(adapter);
            }
        }

        self.rebuild_alive();
        true
    }

    fn retire(&self, adapter: Arc<AdapterProxy>) {
        let grace = self.options.adapter.reconnect_grace;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { adapter.grace_close(grace).await });
            }
            Err(_) => adapter.close(),
        }
    }

    /// Republish the alive set: active endpoints minus unhealthy adapters,
    /// ordered by the CRC32 of their key.
    fn rebuild_alive(&self) {
        let mut alive: Vec<Endpoint> = self
            .lists
            .read()
            .active
            .iter()
            .filter(|ep| {
                self.adapters
                    .get(&ep.hash_key())
                    .map_or(true, |adapter| adapter.is_healthy())
            })
            .cloned()
            .collect();
        alive.sort_by_cached_key(|ep| crc32fast::hash(ep.hash_key().as_bytes()));
        self.alive
            .store(Arc::new(AliveSet::build(alive, &self.options)));
    }

    fn adapter_for(&self, endpoint: &Endpoint) -> Arc<AdapterProxy> {
        self.adapters
            .entry(endpoint.hash_key())
            .or_insert_with(|| {
                log::debug!(
                    "[manager] {} new adapter for {}",
                    self.obj_name,
                    endpoint.hash_key()
                );
                AdapterProxy::new(endpoint.clone(), self.options.adapter.clone())
            })
            .clone()
    }

    /// Pick the adapter for one invocation.
    ///
    /// The flag is `true` when the pick was degraded to a possibly unhealthy
    /// endpoint; a successful call on it should be reported with
    /// [`add_alive`](Self::add_alive).
    pub fn select(&self, hash: Option<HashKey>) -> RpcResult<(Arc<AdapterProxy>, bool)> {
        if self.is_closed() {
            return Err(RpcError::Shutdown);
        }
        let alive = self.alive.load();
        match alive.select(hash) {
            Ok(endpoint) => {
                let adapter = self.adapter_for(&endpoint);
                if adapter.is_healthy() {
                    return Ok((adapter, false));
                }
                // the alive set lags health by one status tick; walk the rest
                // in a fixed order so hashed calls keep a stable fallback
                let start = alive
                    .endpoints
                    .iter()
                    .position(|ep| ep == &endpoint)
                    .unwrap_or(0);
                let len = alive.endpoints.len();
                for step in 1..len {
                    let next = &alive.endpoints[(start + step) % len];
                    let adapter = self.adapter_for(next);
                    if adapter.is_healthy() {
                        log::debug!(
                            "[manager] {} {} unhealthy, using {}",
                            self.obj_name,
                            endpoint.hash_key(),
                            next.hash_key()
                        );
                        return Ok((adapter, false));
                    }
                }
            }
            Err(e) => log::debug!("[manager] {} {}", self.obj_name, e),
        }

        if !self.options.degrade_to_unhealthy {
            return Err(RpcError::NoEndpointAvailable(self.obj_name.clone()));
        }
        let endpoint = {
            let lists = self.lists.read();
            if lists.active.is_empty() {
                return Err(RpcError::NoEndpointAvailable(self.obj_name.clone()));
            }
            lists.active[fastrand::usize(..lists.active.len())].clone()
        };
        log::debug!(
            "[manager] {} degraded to {}",
            self.obj_name,
            endpoint.hash_key()
        );
        Ok((self.adapter_for(&endpoint), true))
    }

    /// Put a recovered endpoint back into the alive set.
    pub fn add_alive(&self, endpoint: &Endpoint) {
        let present = self
            .alive
            .load()
            .endpoints
            .iter()
            .any(|ep| ep == endpoint);
        let active = self.lists.read().active.iter().any(|ep| ep == endpoint);
        if active && !present {
            log::info!(
                "[manager] {} {} is alive again",
                self.obj_name,
                endpoint.hash_key()
            );
            self.rebuild_alive();
        }
    }

    /// One status tick over the adapter pool: keepalive pings, health checks
    /// and retries. Rebuilds the alive set when any adapter changed state.
    pub async fn check_status(&self, keep_alive: Option<Duration>) {
        if self.is_closed() {
            return;
        }
        let adapters: Vec<Arc<AdapterProxy>> =
            self.adapters.iter().map(|entry| entry.value().clone()).collect();
        let mut changed = false;
        for adapter in adapters {
            if let Some(interval) = keep_alive {
                if adapter.is_healthy() {
                    adapter.keep_alive(interval).await;
                }
            }
            match adapter.check_health(Instant::now()).await {
                HealthEvent::None => {}
                HealthEvent::BecameUnhealthy | HealthEvent::Recovered => changed = true,
            }
        }
        if changed {
            self.rebuild_alive();
        }
    }

    /// Every active endpoint known to the manager.
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.lists.read().active.clone()
    }

    pub fn inactive_endpoints(&self) -> Vec<Endpoint> {
        self.lists.read().inactive.clone()
    }

    /// Active endpoints currently eligible for selection.
    pub fn alive_endpoints(&self) -> Vec<Endpoint> {
        self.alive.load().endpoints.clone()
    }

    pub fn adapter(&self, endpoint: &Endpoint) -> Option<Arc<AdapterProxy>> {
        self.adapters
            .get(&endpoint.hash_key())
            .map(|entry| entry.value().clone())
    }

    pub fn adapter_count(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop selecting and grace-close every adapter.
    pub async fn close(&self, grace: Duration) {
        self.closed.store(true, Ordering::Release);
        let adapters: Vec<Arc<AdapterProxy>> =
            self.adapters.iter().map(|entry| entry.value().clone()).collect();
        self.adapters.clear();
        for adapter in adapters {
            adapter.grace_close(grace).await;
        }
    }
}

impl std::fmt::Debug for EndpointManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointManager")
            .field("obj_name", &self.obj_name)
            .field("set", &self.set)
            .field("direct", &self.direct)
            .field("active", &self.lists.read().active.len())
            .field("alive", &self.alive.load().endpoints.len())
            .field("adapters", &self.adapters.len())
            .finish()
    }
}
