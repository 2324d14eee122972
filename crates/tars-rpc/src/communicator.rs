// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client runtime context.
//!
//! A [`Communicator`] owns everything that would otherwise be process-wide:
//! configuration, the registry handle, the filter chain, the request id
//! generator and the endpoint managers shared by every proxy of the same
//! object. Each manager gets a refresh task and a status task; both hold the
//! manager weakly and stop on [`Communicator::shutdown`].

use crate::adapter::AdapterOptions;
use crate::cache::EndpointCache;
use crate::config::ClientConfig;
use crate::endpoint::ObjectRef;
use crate::endpoint_manager::{EndpointManager, ManagerOptions};
use crate::error::{RpcError, RpcResult};
use crate::filter::FilterChain;
use crate::message::RequestIdGenerator;
use crate::protocol::{Protocol, TarsProtocol};
use crate::registry::Registry;
use crate::servant::{ServantOptions, ServantProxy};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Builder for [`Communicator`].
#[derive(Default)]
pub struct CommunicatorBuilder {
    config: ClientConfig,
    registry: Option<Arc<dyn Registry>>,
    filters: FilterChain,
    protocol: Option<Arc<dyn Protocol>>,
}

impl CommunicatorBuilder {
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_registry(mut self, registry: Arc<dyn Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_filters(mut self, filters: FilterChain) -> Self {
        self.filters = filters;
        self
    }

    /// Replace the wire protocol (defaults to [`TarsProtocol`]).
    pub fn with_protocol(mut self, protocol: Arc<dyn Protocol>) -> Self {
        self.protocol = Some(protocol);
        self
    }

    /// Validate the configuration and build the runtime.
    pub fn build(self) -> RpcResult<Communicator> {
        self.config.validate()?;
        let protocol = self.protocol.unwrap_or_else(|| {
            Arc::new(TarsProtocol::new(self.config.transport.max_package_length))
        });
        let cache = self
            .config
            .endpoint_cache_path
            .as_ref()
            .map(|path| Arc::new(EndpointCache::open(path)));
        let (shutdown, _) = watch::channel(false);
        log::debug!(
            "[communicator] built (locator={:?}, set={:?})",
            self.config.locator,
            self.config.set_division
        );
        Ok(Communicator {
            inner: Arc::new(Inner {
                config: self.config,
                registry: self.registry,
                filters: self.filters,
                protocol,
                ids: Arc::new(RequestIdGenerator::new()),
                cache,
                managers: tokio::sync::Mutex::new(HashMap::new()),
                tasks: Mutex::new(Vec::new()),
                shutdown,
                closed: AtomicBool::new(false),
            }),
        })
    }
}

struct Inner {
    config: ClientConfig,
    registry: Option<Arc<dyn Registry>>,
    filters: FilterChain,
    protocol: Arc<dyn Protocol>,
    ids: Arc<RequestIdGenerator>,
    cache: Option<Arc<EndpointCache>>,
    managers: tokio::sync::Mutex<HashMap<String, Arc<EndpointManager>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
    closed: AtomicBool,
}

/// Client runtime. Cheap to clone; clones share managers and tasks.
#[derive(Clone)]
pub struct Communicator {
    inner: Arc<Inner>,
}

impl Communicator {
    pub fn builder() -> CommunicatorBuilder {
        CommunicatorBuilder::default()
    }

    /// Runtime with `config`, no registry and no filters.
    pub fn new(config: ClientConfig) -> RpcResult<Self> {
        Self::builder().with_config(config).build()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Proxy for `obj`, scoped to the configured set division if any.
    ///
    /// `obj` is either a bare object name resolved through the registry, or
    /// `Name@endpoint:endpoint...` to pin the endpoints.
    pub async fn string_to_proxy(&self, obj: &str) -> RpcResult<ServantProxy> {
        let set = self.inner.config.set_division.clone();
        self.proxy(obj, set).await
    }

    /// Proxy for `obj` inside `set`.
    pub async fn string_to_proxy_with_set(&self, obj: &str, set: &str) -> RpcResult<ServantProxy> {
        self.proxy(obj, Some(set.to_string())).await
    }

    async fn proxy(&self, obj: &str, set: Option<String>) -> RpcResult<ServantProxy> {
        let manager = self.manager(obj, set).await?;
        let config = &self.inner.config;
        Ok(ServantProxy::new(
            manager,
            self.inner.filters.clone(),
            self.inner.ids.clone(),
            ServantOptions {
                request_timeout: config.request_timeout(),
                async_timeout: config.async_invoke_timeout(),
                obj_queue_max: config.obj_queue_max,
            },
        ))
    }

    async fn manager(&self, obj: &str, set: Option<String>) -> RpcResult<Arc<EndpointManager>> {
        if self.is_shutdown() {
            return Err(RpcError::Shutdown);
        }
        let obj_ref = ObjectRef::parse(obj)?;
        let set = set.filter(|s| !s.is_empty());
        let key = match &set {
            Some(set) => format!("{}#{}", obj.trim(), set),
            None => obj.trim().to_string(),
        };

        let mut managers = self.inner.managers.lock().await;
        if let Some(manager) = managers.get(&key) {
            return Ok(manager.clone());
        }
        let manager = EndpointManager::new(
            &obj_ref,
            set,
            self.manager_options(&obj_ref.name),
            self.inner.registry.clone(),
            self.inner.cache.clone(),
        )
        .await?;
        self.spawn_maintenance(&manager);
        managers.insert(key, manager.clone());
        Ok(manager)
    }

    fn manager_options(&self, obj_name: &str) -> ManagerOptions {
        let config = &self.inner.config;
        ManagerOptions {
            load_balance: config.load_balance,
            hash_algorithm: config.consistent_hash_algorithm,
            degrade_to_unhealthy: config.degrade_to_unhealthy,
            locator: config.locator.clone().unwrap_or_default(),
            adapter: AdapterOptions {
                obj_name: obj_name.to_string(),
                transport: config.transport.clone(),
                health: config.health.clone(),
                protocol: self.inner.protocol.clone(),
                ids: self.inner.ids.clone(),
                // a replaced connection drains for one call timeout
                reconnect_grace: config.request_timeout(),
            },
        }
    }

    fn spawn_maintenance(&self, manager: &Arc<EndpointManager>) {
        let config = &self.inner.config;
        let mut tasks = self.inner.tasks.lock();
        if !manager.is_direct() {
            tasks.push(spawn_periodic(
                Arc::downgrade(manager),
                config.refresh_endpoint_interval(),
                self.inner.shutdown.subscribe(),
                |manager| {
                    Box::pin(async move {
                        if let Err(e) = manager.refresh().await {
                            log::error!("[communicator] refresh of {} failed: {}", manager.obj_name(), e);
                        }
                    })
                },
            ));
        }
        let keep_alive = config.keep_alive_interval();
        tasks.push(spawn_periodic(
            Arc::downgrade(manager),
            config.check_status_interval(),
            self.inner.shutdown.subscribe(),
            move |manager| Box::pin(async move { manager.check_status(keep_alive).await }),
        ));
        tasks.retain(|task| !task.is_finished());
    }

    /// Stop background tasks and grace-close every adapter.
    ///
    /// Later `string_to_proxy` calls and calls through existing proxies fail
    /// with [`RpcError::Shutdown`].
    pub async fn shutdown(&self, grace: Duration) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        log::info!("[communicator] shutting down");
        self.inner.shutdown.send_replace(true);
        let managers: Vec<Arc<EndpointManager>> =
            self.inner.managers.lock().await.drain().map(|(_, m)| m).collect();
        for manager in managers {
            manager.close(grace).await;
        }
        let tasks: Vec<JoinHandle<()>> = self.inner.tasks.lock().drain(..).collect();
        for task in tasks {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Communicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Communicator")
            .field("locator", &self.inner.config.locator)
            .field("set_division", &self.inner.config.set_division)
            .field("filters", &self.inner.filters)
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

/// Run `tick` every `period` until shutdown or until the manager is gone.
fn spawn_periodic<F>(
    manager: Weak<EndpointManager>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    tick: F,
) -> JoinHandle<()>
where
    F: Fn(Arc<EndpointManager>) -> crate::BoxFuture<'static, ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick completes immediately; construction already refreshed
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }
            let Some(manager) = manager.upgrade() else {
                break;
            };
            if manager.is_closed() {
                break;
            }
            tick(manager).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Endpoint;
    use crate::registry::StaticRegistry;

    fn registry() -> Arc<StaticRegistry> {
        let registry = Arc::new(StaticRegistry::new());
        registry.set("App.Server.Obj", vec![Endpoint::tcp("127.0.0.1", 1)], vec![]);
        registry.set_in(
            "App.Server.Obj",
            "app.sz.1",
            vec![Endpoint::tcp("127.0.0.1", 2)],
            vec![],
        );
        registry
    }

    #[tokio::test]
    async fn test_managers_shared_per_object_and_set() {
        let registry = registry();
        let comm = Communicator::builder()
            .with_registry(registry.clone())
            .build()
            .unwrap();

        let a = comm.string_to_proxy("App.Server.Obj").await.unwrap();
        let b = comm.string_to_proxy("App.Server.Obj").await.unwrap();
        assert!(Arc::ptr_eq(a.manager(), b.manager()));
        assert_eq!(registry.query_count(), 1);

        let sz = comm
            .string_to_proxy_with_set("App.Server.Obj", "app.sz.1")
            .await
            .unwrap();
        assert!(!Arc::ptr_eq(a.manager(), sz.manager()));
        assert_eq!(sz.manager().endpoints()[0].port, 2);
        assert_eq!(sz.manager().set(), Some("app.sz.1"));
    }

    #[tokio::test]
    async fn test_configured_set_division_applies() {
        let config = ClientConfig::default().with_set_division("app.sz.1");
        let comm = Communicator::builder()
            .with_config(config)
            .with_registry(registry())
            .build()
            .unwrap();
        let proxy = comm.string_to_proxy("App.Server.Obj").await.unwrap();
        assert_eq!(proxy.manager().endpoints()[0].port, 2);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = ClientConfig::default();
        config.transport.queue_len = 0;
        assert!(matches!(
            Communicator::new(config),
            Err(RpcError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_bad_object_string() {
        let comm = Communicator::new(ClientConfig::default()).unwrap();
        assert!(matches!(
            comm.string_to_proxy("Obj@bogus -h x").await,
            Err(RpcError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            comm.string_to_proxy("App.Server.Obj").await,
            Err(RpcError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_periodic_refresh_picks_up_changes() {
        let registry = registry();
        let mut config = ClientConfig::default();
        config.refresh_endpoint_interval_ms = 20;
        let comm = Communicator::builder()
            .with_config(config)
            .with_registry(registry.clone())
            .build()
            .unwrap();
        let proxy = comm.string_to_proxy("App.Server.Obj").await.unwrap();

        registry.set("App.Server.Obj", vec![Endpoint::tcp("127.0.0.1", 9)], vec![]);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(proxy.manager().endpoints()[0].port, 9);
        comm.shutdown(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_everything() {
        let registry = registry();
        let mut config = ClientConfig::default();
        config.refresh_endpoint_interval_ms = 10;
        let comm = Communicator::builder()
            .with_config(config)
            .with_registry(registry.clone())
            .build()
            .unwrap();
        let proxy = comm.string_to_proxy("App.Server.Obj").await.unwrap();
        comm.shutdown(Duration::from_millis(10)).await;

        assert!(comm.is_shutdown());
        assert!(proxy.manager().is_closed());
        assert!(matches!(
            comm.string_to_proxy("App.Server.Obj").await,
            Err(RpcError::Shutdown)
        ));
        let queries = registry.query_count();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(registry.query_count(), queries);
    }
}
