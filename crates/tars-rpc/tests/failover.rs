// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test readability

//! Registry-backed routing, health exclusion and recovery.

mod common;

use common::{dead_endpoint, MockServer};
use std::sync::Arc;
use std::time::Duration;
use tars_rpc::{
    ClientConfig, Communicator, HashKey, HealthConfig, InvokeOptions, RpcError, StaticRegistry,
};

const OBJ: &str = "Test.RouteServer.RouteObj";

fn config(degrade: bool, retry_ms: u64) -> ClientConfig {
    ClientConfig {
        check_status_interval_ms: 20,
        degrade_to_unhealthy: degrade,
        health: HealthConfig {
            fail_window_ms: 0,
            fail_threshold: 1,
            retry_interval_ms: retry_ms,
            ..HealthConfig::default()
        },
        ..ClientConfig::default()
    }
    .with_request_timeout(Duration::from_millis(500))
}

#[tokio::test]
async fn test_dead_endpoint_is_excluded() {
    let live = MockServer::start().await;
    let dead = dead_endpoint().await;
    let registry = Arc::new(StaticRegistry::new());
    registry.set(OBJ, vec![live.endpoint.clone(), dead.clone()], vec![]);

    let comm = Communicator::builder()
        .with_config(config(false, 3_600_000))
        .with_registry(registry)
        .build()
        .unwrap();
    let proxy = comm.string_to_proxy(OBJ).await.unwrap();

    let mut failures = 0;
    for _ in 0..4 {
        match proxy.invoke("echo", b"x".to_vec(), InvokeOptions::new()).await {
            Ok(_) => {}
            Err(RpcError::Connection(_)) => failures += 1,
            Err(other) => panic!("unexpected {other:?}"),
        }
    }
    assert!(failures > 0, "round robin never reached the dead endpoint");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(proxy.manager().alive_endpoints(), vec![live.endpoint.clone()]);
    for _ in 0..10 {
        proxy
            .invoke("echo", b"x".to_vec(), InvokeOptions::new())
            .await
            .unwrap();
    }
    comm.shutdown(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_unhealthy_endpoint_recovers_after_retry() {
    let dead = dead_endpoint().await;
    let registry = Arc::new(StaticRegistry::new());
    registry.set(OBJ, vec![dead.clone()], vec![]);

    let comm = Communicator::builder()
        .with_config(config(false, 50))
        .with_registry(registry)
        .build()
        .unwrap();
    let proxy = comm.string_to_proxy(OBJ).await.unwrap();

    let err = proxy
        .invoke("echo", Vec::new(), InvokeOptions::new())
        .await
        .unwrap_err();
    assert!(err.is_endpoint_failure());
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(proxy.manager().alive_endpoints().is_empty());
    assert!(matches!(
        proxy.invoke("echo", Vec::new(), InvokeOptions::new()).await,
        Err(RpcError::NoEndpointAvailable(_))
    ));

    // bring the endpoint up; the retry tick reconnects and restores it
    let _server = MockServer::start_on(dead.port).await;
    let mut recovered = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if !proxy.manager().alive_endpoints().is_empty() {
            recovered = true;
            break;
        }
    }
    assert!(recovered, "endpoint never came back");
    let adapter = proxy.manager().adapter(&dead).unwrap();
    assert!(adapter.is_healthy());
    assert_eq!(adapter.health().stats().fail_count, 0);

    let rsp = proxy
        .invoke("echo", b"back".to_vec(), InvokeOptions::new())
        .await
        .unwrap();
    assert_eq!(rsp.buffer, b"back");
    comm.shutdown(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_degraded_pick_revives_endpoint() {
    let server = MockServer::start().await;
    let registry = Arc::new(StaticRegistry::new());
    registry.set(OBJ, vec![server.endpoint.clone()], vec![]);

    let comm = Communicator::builder()
        .with_config(config(true, 3_600_000))
        .with_registry(registry)
        .build()
        .unwrap();
    let proxy = comm.string_to_proxy(OBJ).await.unwrap();

    proxy
        .invoke("echo", Vec::new(), InvokeOptions::new())
        .await
        .unwrap();
    // trip the healthy endpoint by hand
    let adapter = proxy.manager().adapter(&server.endpoint).unwrap();
    adapter.health().on_failure();
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(proxy.manager().alive_endpoints().is_empty());

    // nothing healthy: the call degrades, succeeds and puts it back
    proxy
        .invoke("echo", Vec::new(), InvokeOptions::new())
        .await
        .unwrap();
    assert!(adapter.is_healthy());
    assert_eq!(proxy.manager().alive_endpoints().len(), 1);
    comm.shutdown(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_hash_calls_stick_to_one_endpoint() {
    let servers = [
        MockServer::start().await,
        MockServer::start().await,
        MockServer::start().await,
    ];
    let registry = Arc::new(StaticRegistry::new());
    registry.set(
        OBJ,
        servers.iter().map(|s| s.endpoint.clone()).collect(),
        vec![],
    );
    let comm = Communicator::builder()
        .with_registry(registry)
        .build()
        .unwrap();
    let proxy = comm.string_to_proxy(OBJ).await.unwrap();

    let opts = InvokeOptions::new().with_hash(HashKey::consistent_str("account-17"));
    for _ in 0..12 {
        proxy.invoke("echo", Vec::new(), opts.clone()).await.unwrap();
    }
    let counts: Vec<usize> = servers
        .iter()
        .map(|s| s.requests.load(std::sync::atomic::Ordering::SeqCst))
        .collect();
    assert_eq!(counts.iter().sum::<usize>(), 12);
    assert!(counts.contains(&12), "hash calls spread: {:?}", counts);
    comm.shutdown(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_refresh_removes_endpoint_from_rotation() {
    let a = MockServer::start().await;
    let b = MockServer::start().await;
    let registry = Arc::new(StaticRegistry::new());
    registry.set(OBJ, vec![a.endpoint.clone(), b.endpoint.clone()], vec![]);
    let comm = Communicator::builder()
        .with_registry(registry.clone())
        .build()
        .unwrap();
    let proxy = comm.string_to_proxy(OBJ).await.unwrap();
    for _ in 0..4 {
        proxy.invoke("echo", Vec::new(), InvokeOptions::new()).await.unwrap();
    }

    registry.set(OBJ, vec![a.endpoint.clone()], vec![b.endpoint.clone()]);
    assert!(proxy.manager().refresh().await.unwrap());
    let before = b.requests.load(std::sync::atomic::Ordering::SeqCst);
    for _ in 0..6 {
        proxy.invoke("echo", Vec::new(), InvokeOptions::new()).await.unwrap();
    }
    assert_eq!(b.requests.load(std::sync::atomic::Ordering::SeqCst), before);
    assert!(proxy.manager().adapter(&b.endpoint).is_none());
    comm.shutdown(Duration::from_millis(50)).await;
}
