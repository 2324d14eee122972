// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Endpoint descriptors.
//!
//! An endpoint is written as `proto -h host -p port [-t timeout] [-w weight]
//! [-v weight_type] [-s set_id]`, for example
//! `tcp -h 10.0.0.7 -p 19386 -t 60000`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Default per-endpoint timeout when `-t` is absent, in milliseconds.
pub const DEFAULT_ENDPOINT_TIMEOUT_MS: u32 = 3000;

/// Upper bound for static weights.
pub const MAX_STATIC_WEIGHT: i32 = 100;

/// Socket flavour used to reach an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Tcp,
    Udp,
    /// TCP wrapped in TLS (`ssl` in descriptors).
    Tls,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Tcp => "tcp",
            TransportKind::Udp => "udp",
            TransportKind::Tls => "ssl",
        }
    }
}

/// How the `weight` of an endpoint is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightType {
    /// Plain rotation; weights ignored.
    #[default]
    Loop,
    /// Pre-expanded static weight list.
    Static,
}

impl WeightType {
    fn from_flag(v: i32) -> Self {
        if v == 0 {
            WeightType::Loop
        } else {
            WeightType::Static
        }
    }

    fn as_flag(self) -> i32 {
        match self {
            WeightType::Loop => 0,
            WeightType::Static => 1,
        }
    }
}

/// Error parsing an endpoint or object descriptor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointParseError {
    #[error("unknown transport {0:?} (expected tcp, udp or ssl)")]
    UnknownTransport(String),

    #[error("missing value for flag -{0}")]
    MissingValue(char),

    #[error("invalid value {value:?} for flag -{flag}")]
    InvalidValue { flag: char, value: String },

    #[error("endpoint has no host")]
    MissingHost,

    #[error("empty endpoint descriptor")]
    Empty,
}

/// A reachable server instance plus its routing metadata.
///
/// Identity (equality and hashing) is the `(host, port)` pair only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub transport: TransportKind,
    /// Server-side timeout hint in milliseconds.
    pub timeout_ms: u32,
    /// -1 when unset.
    pub weight: i32,
    pub weight_type: WeightType,
    /// Set/subset label, empty when the endpoint is not in a set.
    #[serde(default)]
    pub set_id: String,
}

impl Endpoint {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::new(host, port, TransportKind::Tcp)
    }

    pub fn udp(host: impl Into<String>, port: u16) -> Self {
        Self::new(host, port, TransportKind::Udp)
    }

    pub fn new(host: impl Into<String>, port: u16, transport: TransportKind) -> Self {
        Self {
            host: host.into(),
            port,
            transport,
            timeout_ms: DEFAULT_ENDPOINT_TIMEOUT_MS,
            weight: -1,
            weight_type: WeightType::Loop,
            set_id: String::new(),
        }
    }

    /// Builder-style static weight; clamps like the descriptor parser does.
    pub fn with_static_weight(mut self, weight: i32) -> Self {
        self.weight_type = WeightType::Static;
        self.weight = clamp_static_weight(weight);
        self
    }

    pub fn with_set_id(mut self, set_id: impl Into<String>) -> Self {
        self.set_id = set_id.into();
        self
    }

    /// `host:port`, the identity used by selectors and the adapter pool.
    pub fn hash_key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `host:port` suitable for a socket connect.
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            self.hash_key()
        }
    }

    pub fn is_static_weight(&self) -> bool {
        self.weight_type == WeightType::Static
    }

    /// Parse one descriptor such as `tcp -h 127.0.0.1 -p 10015 -t 60000`.
    pub fn parse(descriptor: &str) -> Result<Self, EndpointParseError> {
        let mut words = descriptor.split_whitespace();
        let proto = words.next().ok_or(EndpointParseError::Empty)?;
        let transport = match proto.to_ascii_lowercase().as_str() {
            "tcp" => TransportKind::Tcp,
            "udp" => TransportKind::Udp,
            "ssl" => TransportKind::Tls,
            other => return Err(EndpointParseError::UnknownTransport(other.to_owned())),
        };

        let mut ep = Endpoint::new(String::new(), 0, transport);
        let mut weight_flag = 0;
        while let Some(word) = words.next() {
            let Some(flag) = word.strip_prefix('-').and_then(|f| f.chars().next()) else {
                continue;
            };
            let value = words.next().ok_or(EndpointParseError::MissingValue(flag))?;
            match flag {
                'h' => ep.host = value.to_owned(),
                'p' => ep.port = parse_flag(flag, value)?,
                't' => ep.timeout_ms = parse_flag(flag, value)?,
                'w' => ep.weight = parse_flag(flag, value)?,
                'v' => weight_flag = parse_flag(flag, value)?,
                's' => ep.set_id = value.to_owned(),
                // grid, qos, auth, bind, container: accepted and ignored
                _ => {}
            }
        }
        if ep.host.is_empty() {
            return Err(EndpointParseError::MissingHost);
        }
        ep.weight_type = WeightType::from_flag(weight_flag);
        if ep.weight_type == WeightType::Static {
            ep.weight = clamp_static_weight(ep.weight);
        }
        Ok(ep)
    }
}

fn clamp_static_weight(weight: i32) -> i32 {
    if weight == -1 || weight > MAX_STATIC_WEIGHT {
        MAX_STATIC_WEIGHT
    } else {
        weight
    }
}

fn parse_flag<T: FromStr>(flag: char, value: &str) -> Result<T, EndpointParseError> {
    value.parse().map_err(|_| EndpointParseError::InvalidValue {
        flag,
        value: value.to_owned(),
    })
}

impl FromStr for Endpoint {
    type Err = EndpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Endpoint::parse(s)
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.port == other.port
    }
}

impl Eq for Endpoint {}

impl Hash for Endpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.port.hash(state);
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -h {} -p {} -t {} -v {} -w {}",
            self.transport.as_str(),
            self.host,
            self.port,
            self.timeout_ms,
            self.weight_type.as_flag(),
            self.weight
        )?;
        if !self.set_id.is_empty() {
            write!(f, " -s {}", self.set_id)?;
        }
        Ok(())
    }
}

/// An object reference split into its name and optional direct endpoints.
///
/// `App.Server.Obj` resolves through the registry, while
/// `App.Server.Obj@tcp -h 1.2.3.4 -p 80:udp -h 1.2.3.5 -p 81` pins the
/// endpoint list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub name: String,
    pub direct: Option<Vec<Endpoint>>,
}

impl ObjectRef {
    pub fn parse(s: &str) -> Result<Self, EndpointParseError> {
        let s = s.trim();
        let Some((name, rest)) = s.split_once('@') else {
            return Ok(Self {
                name: s.to_owned(),
                direct: None,
            });
        };
        let mut endpoints = Vec::new();
        for part in rest.split(':') {
            if part.trim().is_empty() {
                continue;
            }
            endpoints.push(Endpoint::parse(part)?);
        }
        if endpoints.is_empty() {
            return Err(EndpointParseError::Empty);
        }
        Ok(Self {
            name: name.trim().to_owned(),
            direct: Some(endpoints),
        })
    }

    pub fn is_direct(&self) -> bool {
        self.direct.is_some()
    }
}
