// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # tars-rpc
//!
//! Client-side runtime for the TARS RPC protocol: tagged binary codec,
//! length-prefixed framing, per-endpoint connections with health tracking,
//! load-balanced endpoint selection and request/response correlation.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tars_rpc::{ClientConfig, Communicator, InvokeOptions, RpcResult};
//!
//! # async fn demo() -> RpcResult<()> {
//! let comm = Communicator::new(ClientConfig::default())?;
//! let proxy = comm
//!     .string_to_proxy("Test.HelloServer.HelloObj@tcp -h 127.0.0.1 -p 18015")
//!     .await?;
//!
//! let rsp = proxy
//!     .invoke("sayHello", b"payload".to_vec(), InvokeOptions::new())
//!     .await?;
//! println!("{} bytes back", rsp.buffer.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |  Communicator: config, registry, filters, request ids, managers      |
//! +---------------------------------------------------------------------+
//! |  ServantProxy: build packet -> filter chain -> select -> send/wait   |
//! +---------------------------------------------------------------------+
//! |  EndpointManager: registry refresh | selectors | adapter pool        |
//! +---------------------------------------------------------------------+
//! |  AdapterProxy: health machine | pending calls | push handling        |
//! +---------------------------------------------------------------------+
//! |  Connection: outbound queue | send loop | receive loop | idle close  |
//! +---------------------------------------------------------------------+
//! |  Protocol / codec: framing | Request/ResponsePacket | tagged values  |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Communicator`] | Runtime context, factory for proxies |
//! | [`ServantProxy`] | Blocking, oneway and callback calls on one object |
//! | [`EndpointManager`] | Endpoint set, selectors and adapters of one object |
//! | [`AdapterProxy`] | Connection and health of one endpoint |
//! | [`Connection`] | One socket with its send and receive loops |
//! | [`ClientConfig`] | TOML-loadable settings |

pub mod adapter;
pub mod cache;
pub mod codec;
pub mod communicator;
pub mod config;
pub mod endpoint;
pub mod endpoint_manager;
pub mod error;
pub mod filter;
pub mod hash;
pub mod message;
pub mod protocol;
pub mod registry;
pub mod selector;
pub mod servant;
pub mod transport;

use std::future::Future;
use std::pin::Pin;

/// Boxed, sendable future used at trait-object seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub use adapter::{AdapterProxy, HealthConfig, PushCallback};
pub use communicator::{Communicator, CommunicatorBuilder};
pub use config::{ClientConfig, ConfigError, LoadBalance};
pub use endpoint::{Endpoint, ObjectRef, TransportKind, WeightType};
pub use endpoint_manager::EndpointManager;
pub use error::{RpcError, RpcResult};
pub use filter::{ClientFilter, FilterChain, Invoke, Next};
pub use message::{Message, RequestIdGenerator};
pub use protocol::{Context, Protocol, RequestPacket, ResponsePacket, TarsProtocol};
pub use registry::{EndpointLists, Registry, StaticRegistry};
pub use selector::{HashAlgorithm, HashKey, HashType};
pub use servant::{InvokeOptions, ServantProxy};
pub use transport::{Connection, TlsOptions, TransportConfig};
