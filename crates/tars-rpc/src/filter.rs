// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client filter middleware.
//!
//! A filter receives the invocation and a [`Next`] handle for the rest of
//! the chain. It may rewrite the request before calling `next.run(..)`,
//! inspect the outcome afterwards, or return without calling it at all to
//! short-circuit the call.
//!
//! Chain order is pre-filters, then the primary filter, then post-filters;
//! the innermost step dispatches the request to an endpoint.
//!
//! ```ignore
//! struct Stamp;
//!
//! impl ClientFilter for Stamp {
//!     fn filter<'a>(&'a self, msg: &'a mut Message, timeout: Duration, next: Next<'a>)
//!         -> BoxFuture<'a, RpcResult<()>>
//!     {
//!         Box::pin(async move {
//!             msg.request.context.insert("caller".into(), "billing".into());
//!             next.run(msg, timeout).await
//!         })
//!     }
//! }
//! ```

use crate::error::RpcResult;
use crate::message::Message;
use crate::BoxFuture;
use std::sync::Arc;
use std::time::Duration;

/// Innermost step of a chain: actually perform the call.
pub trait Invoke: Send + Sync {
    fn invoke<'a>(&'a self, msg: &'a mut Message, timeout: Duration) -> BoxFuture<'a, RpcResult<()>>;
}

/// One middleware layer.
pub trait ClientFilter: Send + Sync {
    fn filter<'a>(
        &'a self,
        msg: &'a mut Message,
        timeout: Duration,
        next: Next<'a>,
    ) -> BoxFuture<'a, RpcResult<()>>;
}

/// Remainder of a chain, handed to each filter.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    filters: &'a [Arc<dyn ClientFilter>],
    endpoint: &'a dyn Invoke,
}

impl<'a> Next<'a> {
    /// Run the remaining filters, then the call itself.
    pub fn run(self, msg: &'a mut Message, timeout: Duration) -> BoxFuture<'a, RpcResult<()>> {
        match self.filters.split_first() {
            Some((first, rest)) => first.filter(
                msg,
                timeout,
                Next {
                    filters: rest,
                    endpoint: self.endpoint,
                },
            ),
            None => self.endpoint.invoke(msg, timeout),
        }
    }
}

/// Ordered filters of one communicator.
#[derive(Clone, Default)]
pub struct FilterChain {
    pre: Vec<Arc<dyn ClientFilter>>,
    primary: Option<Arc<dyn ClientFilter>>,
    post: Vec<Arc<dyn ClientFilter>>,
    ordered: Vec<Arc<dyn ClientFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    fn reorder(&mut self) {
        self.ordered = self
            .pre
            .iter()
            .chain(self.primary.iter())
            .chain(self.post.iter())
            .cloned()
            .collect();
    }

    pub fn with_pre(mut self, filter: Arc<dyn ClientFilter>) -> Self {
        self.pre.push(filter);
        self.reorder();
        self
    }

    /// Install the primary filter, replacing any previous one.
    pub fn with_primary(mut self, filter: Arc<dyn ClientFilter>) -> Self {
        self.primary = Some(filter);
        self.reorder();
        self
    }

    pub fn with_post(mut self, filter: Arc<dyn ClientFilter>) -> Self {
        self.post.push(filter);
        self.reorder();
        self
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Run `msg` through every filter, ending in `endpoint`.
    pub fn run<'a>(
        &'a self,
        endpoint: &'a dyn Invoke,
        msg: &'a mut Message,
        timeout: Duration,
    ) -> BoxFuture<'a, RpcResult<()>> {
        Next {
            filters: &self.ordered,
            endpoint,
        }
        .run(msg, timeout)
    }
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterChain")
            .field("pre", &self.pre.len())
            .field("primary", &self.primary.is_some())
            .field("post", &self.post.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcError;
    use crate::protocol::{RequestPacket, ResponsePacket};
    use parking_lot::Mutex;

    struct Record {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl ClientFilter for Record {
        fn filter<'a>(
            &'a self,
            msg: &'a mut Message,
            timeout: Duration,
            next: Next<'a>,
        ) -> BoxFuture<'a, RpcResult<()>> {
            Box::pin(async move {
                self.log.lock().push(format!("{}>", self.name));
                msg.request
                    .context
                    .insert(self.name.to_string(), "seen".into());
                let res = next.run(msg, timeout).await;
                self.log.lock().push(format!("<{}", self.name));
                res
            })
        }
    }

    struct Refuse;

    impl ClientFilter for Refuse {
        fn filter<'a>(
            &'a self,
            _msg: &'a mut Message,
            _timeout: Duration,
            _next: Next<'a>,
        ) -> BoxFuture<'a, RpcResult<()>> {
            Box::pin(async { Err(RpcError::Filter("refused".into())) })
        }
    }

    struct Halve;

    impl ClientFilter for Halve {
        fn filter<'a>(
            &'a self,
            msg: &'a mut Message,
            timeout: Duration,
            next: Next<'a>,
        ) -> BoxFuture<'a, RpcResult<()>> {
            next.run(msg, timeout / 2)
        }
    }

    struct Terminal {
        log: Arc<Mutex<Vec<String>>>,
        seen_timeout: Mutex<Option<Duration>>,
    }

    impl Invoke for Terminal {
        fn invoke<'a>(&'a self, msg: &'a mut Message, timeout: Duration) -> BoxFuture<'a, RpcResult<()>> {
            Box::pin(async move {
                self.log.lock().push("call".into());
                *self.seen_timeout.lock() = Some(timeout);
                msg.response = Some(ResponsePacket::reply_to(&msg.request, 0, Vec::new()));
                Ok(())
            })
        }
    }

    fn terminal(log: &Arc<Mutex<Vec<String>>>) -> Terminal {
        Terminal {
            log: log.clone(),
            seen_timeout: Mutex::new(None),
        }
    }

    #[tokio::test]
    async fn test_chain_order_wraps() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let rec = |name: &'static str| -> Arc<dyn ClientFilter> {
            Arc::new(Record {
                name,
                log: log.clone(),
            })
        };
        let chain = FilterChain::new()
            .with_post(rec("post"))
            .with_primary(rec("primary"))
            .with_pre(rec("pre"));
        let end = terminal(&log);
        let mut msg = Message::new(RequestPacket::default());
        chain.run(&end, &mut msg, Duration::from_secs(1)).await.unwrap();

        assert_eq!(
            *log.lock(),
            vec!["pre>", "primary>", "post>", "call", "<post", "<primary", "<pre"]
        );
        assert_eq!(msg.request.context.len(), 3);
        assert!(msg.response.is_some());
    }

    #[tokio::test]
    async fn test_short_circuit_skips_call() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = FilterChain::new().with_pre(Arc::new(Refuse));
        let end = terminal(&log);
        let mut msg = Message::new(RequestPacket::default());
        let err = chain
            .run(&end, &mut msg, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Filter(_)));
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn test_filter_rewrites_timeout() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = FilterChain::new().with_primary(Arc::new(Halve));
        let end = terminal(&log);
        let mut msg = Message::new(RequestPacket::default());
        chain.run(&end, &mut msg, Duration::from_secs(4)).await.unwrap();
        assert_eq!(*end.seen_timeout.lock(), Some(Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn test_empty_chain_calls_directly() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = FilterChain::new();
        assert!(chain.is_empty());
        let end = terminal(&log);
        let mut msg = Message::new(RequestPacket::default());
        chain.run(&end, &mut msg, Duration::from_secs(1)).await.unwrap();
        assert_eq!(*log.lock(), vec!["call"]);
    }
}
