// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Caller-facing error taxonomy.

use crate::codec::DecodeError;
use crate::config::ConfigError;
use crate::endpoint::EndpointParseError;
use crate::protocol::packet::ret;
use crate::selector::SelectorError;
use crate::transport::TransportError;
use std::time::Duration;
use thiserror::Error;

/// Result type for RPC operations
pub type RpcResult<T> = Result<T, RpcError>;

/// Errors surfaced by proxy invocations.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// Malformed frame or oversize declared length
    #[error("framing error: {0}")]
    Framing(String),

    /// Response body or payload failed to decode
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// No endpoint could be selected for the object
    #[error("no endpoint available for {0}")]
    NoEndpointAvailable(String),

    /// Connection send queue stayed full past the write timeout
    #[error("send queue full for {0}")]
    QueueFull(String),

    /// Too many invocations in flight on one object
    #[error("{obj}: {in_flight} invocations in flight")]
    Overloaded { obj: String, in_flight: usize },

    /// No response arrived in time
    #[error("request {request_id} timed out after {elapsed:?}")]
    Timeout { request_id: i32, elapsed: Duration },

    /// Server answered with a non-zero return code
    #[error("server returned {code} ({}): {message}", crate::protocol::return_code_name(*.code))]
    Application { code: i32, message: String },

    /// Dial or write failure
    #[error("connection error: {0}")]
    Connection(String),

    /// A client filter rejected the call
    #[error("filter error: {0}")]
    Filter(String),

    /// Registry lookup failed
    #[error("registry error: {0}")]
    Registry(String),

    /// Bad object or endpoint string
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Bad client configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// The communicator was shut down
    #[error("communicator shut down")]
    Shutdown,
}

impl RpcError {
    /// Protocol return code for this error.
    pub fn code(&self) -> i32 {
        match self {
            Self::Framing(_) | Self::Decode(_) => ret::CLIENT_DECODE_ERR,
            Self::NoEndpointAvailable(_) => ret::ADAPTER_NULL,
            Self::QueueFull(_) | Self::Connection(_) => ret::SEND_REQUEST_ERR,
            Self::Overloaded { .. } => ret::OVERLOAD,
            Self::Timeout { .. } => ret::INVOKE_TIMEOUT,
            Self::Application { code, .. } => *code,
            Self::InvalidEndpoint(_) => ret::PROXY_CONNECT_ERR,
            Self::Filter(_) | Self::Registry(_) | Self::Config(_) | Self::Shutdown => ret::UNKNOWN,
        }
    }

    /// True for errors that count against the adapter's health.
    pub fn is_endpoint_failure(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Connection(_) | Self::QueueFull(_)
        )
    }
}

impl From<TransportError> for RpcError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::QueueFull(addr) => Self::QueueFull(addr),
            TransportError::Framing(declared) => {
                Self::Framing(format!("declared package length {}", declared))
            }
            other => Self::Connection(other.to_string()),
        }
    }
}

impl From<ConfigError> for RpcError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<SelectorError> for RpcError {
    fn from(err: SelectorError) -> Self {
        Self::NoEndpointAvailable(err.to_string())
    }
}

impl From<EndpointParseError> for RpcError {
    fn from(err: EndpointParseError) -> Self {
        Self::InvalidEndpoint(err.to_string())
    }
}
