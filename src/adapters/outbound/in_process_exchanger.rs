//! In-Process Exchanger
//!
//! Implements NodeExchanger for nodes living in the same process. Requests
//! go through the same frame codec a socket transport would use and are
//! routed to the target's registered MessageHandlers.

use crate::replication::transport::{
    decode_frame, encode_frame, ExchangeError, HandlerType, MessageHandler, NodeExchanger,
    OutboundRequest,
};
use crate::replication::types::Envelope;
use async_trait::async_trait;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;

/// Handlers of every node reachable in this process, keyed by address.
pub struct InProcessNetwork {
    endpoints: DashMap<SocketAddr, Vec<Arc<dyn MessageHandler>>>,
}

impl InProcessNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            endpoints: DashMap::new(),
        })
    }

    /// Route messages for `addr` to `handler`. Handlers are consulted in
    /// registration order.
    pub fn register(&self, addr: SocketAddr, handler: Arc<dyn MessageHandler>) {
        self.endpoints.entry(addr).or_default().push(handler);
    }

    /// Make `addr` unreachable. Returns whether it was registered.
    pub fn unregister(&self, addr: &SocketAddr) -> bool {
        self.endpoints.remove(addr).is_some()
    }

    pub fn is_registered(&self, addr: &SocketAddr) -> bool {
        self.endpoints.contains_key(addr)
    }

    /// Exchanger for the node at `local`.
    pub fn exchanger(self: &Arc<Self>, local: SocketAddr) -> InProcessExchanger {
        InProcessExchanger {
            network: self.clone(),
            local,
        }
    }
}

/// One node's view of an [`InProcessNetwork`].
pub struct InProcessExchanger {
    network: Arc<InProcessNetwork>,
    local: SocketAddr,
}

impl InProcessExchanger {
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }
}

#[async_trait]
impl NodeExchanger for InProcessExchanger {
    async fn request(&self, request: OutboundRequest) -> Result<Option<Envelope>, ExchangeError> {
        let target = request.target;
        let frame = encode_frame(&request.envelope.open()?)?;

        // Clone the handler out so no map guard is held across the await
        let handler = {
            let handlers = self
                .network
                .endpoints
                .get(&target)
                .ok_or(ExchangeError::Unreachable(target))?;
            let msg = decode_frame(&frame)?;
            handlers
                .iter()
                .find(|h| h.interest(&msg))
                .cloned()
                .map(|h| (h, msg))
        };

        let Some((handler, msg)) = handler else {
            return Err(ExchangeError::Remote {
                addr: target,
                reason: "no handler interested".to_string(),
            });
        };

        tracing::trace!(
            "{} -> {} {} retry_times={}",
            self.local,
            target,
            msg.type_name(),
            request.retry_times
        );

        let from = self.local;
        let reply = match handler.handler_type() {
            HandlerType::Listener => handler.handle(from, msg).await,
            HandlerType::Processor => tokio::spawn(async move { handler.handle(from, msg).await })
                .await
                .map_err(|e| ExchangeError::Remote {
                    addr: target,
                    reason: e.to_string(),
                })?,
        }
        .map_err(|e| ExchangeError::Remote {
            addr: target,
            reason: e.to_string(),
        })?;

        match reply {
            Some(reply) => Ok(Some(Envelope::seal(&reply)?)),
            None => Ok(None),
        }
    }
}
