//! Cluster Broadcaster
//!
//! Sends one message to every member of a role that is both registered and
//! connected. Two delivery modes:
//!
//! - **notify**: fire-and-forget, outcomes are only logged
//! - **invoke**: waits for replies up to a deadline and returns what arrived
//!
//! Each role gets its own broadcaster and dispatch bound, so a slow role
//! cannot starve another.

use crate::domain::ports::{ConnectionRegistry, PartitionMembership};
use crate::domain::value_objects::NodeRole;
use crate::replication::config::ReplicationConfig;
use crate::replication::transport::{ExchangeError, NodeExchanger, OutboundRequest};
use crate::replication::types::{Envelope, Message};
use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tracing::Instrument;
use uuid::Uuid;

/// Outcome of one dispatched request.
type Reply = Result<Option<Envelope>, ExchangeError>;

/// What a broadcaster needs from one role's side of the cluster.
#[derive(Clone)]
pub struct RoleCapabilities {
    /// Request transport to the role's members
    pub exchanger: Arc<dyn NodeExchanger>,
    /// Logical members registered for the role
    pub nodes: Arc<dyn PartitionMembership>,
    /// Live connections to the role's members
    pub connections: Arc<dyn ConnectionRegistry>,
}

/// Broadcasts messages to the members of one role.
pub struct Broadcaster {
    role: NodeRole,
    caps: RoleCapabilities,
    dispatch: Arc<Semaphore>,
    retry_times: u32,
}

impl Broadcaster {
    /// Create a broadcaster with at most `dispatch_pool_size` requests in
    /// flight at once.
    pub fn new(
        role: NodeRole,
        caps: RoleCapabilities,
        dispatch_pool_size: usize,
        retry_times: u32,
    ) -> Self {
        Self {
            role,
            caps,
            dispatch: Arc::new(Semaphore::new(dispatch_pool_size.max(1))),
            retry_times,
        }
    }

    /// Create a broadcaster for `role` using the pool size and retry hint
    /// from `config`.
    pub fn from_config(role: NodeRole, caps: RoleCapabilities, config: &ReplicationConfig) -> Self {
        Self::new(role, caps, config.dispatch_pool_size, config.retry_times)
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    /// Connections whose IP is registered for the role, one per IP.
    ///
    /// When several connections share an IP the lowest address wins, so the
    /// choice is stable across calls. An empty result is logged as an error.
    pub fn resolve_targets(&self) -> Vec<SocketAddr> {
        let mut connections = self.caps.connections.live_connections();
        if connections.is_empty() {
            tracing::error!("no {} node connected", self.role);
            return Vec::new();
        }

        let registered: HashSet<IpAddr> = self
            .caps
            .nodes
            .registered_node_addresses()
            .into_iter()
            .collect();
        if registered.is_empty() {
            tracing::error!("no {} node registered", self.role);
            return Vec::new();
        }

        connections.sort();
        let mut seen = HashSet::new();
        let targets: Vec<SocketAddr> = connections
            .into_iter()
            .filter(|addr| registered.contains(&addr.ip()) && seen.insert(addr.ip()))
            .collect();

        if targets.is_empty() {
            tracing::warn!(
                "no connected {} node is registered, registered={}",
                self.role,
                registered.len()
            );
        }
        targets
    }

    /// Send `msg` to every target without waiting for replies.
    ///
    /// Returns the number of targets a send was dispatched to. Each send's
    /// outcome is logged when it completes; a failing target does not affect
    /// the others.
    pub fn notify(&self, msg: &Message) -> usize {
        let targets = self.resolve_targets();
        if targets.is_empty() {
            return 0;
        }

        let envelope = match Envelope::seal(msg) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!("[{}] failed to encode {}: {}", self.role, msg.type_name(), e);
                return 0;
            }
        };

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!("[{}] cannot dispatch {}: {}", self.role, msg.type_name(), e);
                return 0;
            }
        };

        let correlation = Uuid::new_v4();
        let kind = msg.type_name();
        tracing::debug!(
            "[{}] notify {} to {} nodes, correlation={}",
            self.role,
            kind,
            targets.len(),
            correlation
        );

        for target in &targets {
            let request = OutboundRequest {
                target: *target,
                envelope: envelope.clone(),
                retry_times: self.retry_times,
            };
            let exchanger = self.caps.exchanger.clone();
            let dispatch = self.dispatch.clone();
            let role = self.role;

            handle.spawn(
                async move {
                    let Ok(_permit) = dispatch.acquire_owned().await else {
                        return;
                    };
                    let target = request.target;
                    match dispatch_isolated(exchanger, request).await {
                        Ok(_) => {
                            tracing::info!(
                                "[{}] notify {} to {} success, correlation={}",
                                role,
                                kind,
                                target,
                                correlation
                            );
                        }
                        Err(e) => {
                            tracing::error!(
                                "[{}] notify {} to {} failed, correlation={}: {}",
                                role,
                                kind,
                                target,
                                correlation,
                                e
                            );
                        }
                    }
                }
                .in_current_span(),
            );
        }

        targets.len()
    }

    /// Send `msg` to every target and collect typed replies until all have
    /// answered or `timeout` elapses.
    ///
    /// The result is keyed by target IP. Targets that failed, timed out, or
    /// answered with something other than `R` are absent; callers decide
    /// what a missing entry means.
    pub async fn invoke<R>(&self, msg: &Message, timeout: Duration) -> HashMap<IpAddr, R>
    where
        R: TryFrom<Message, Error = Message> + Send + 'static,
    {
        let targets = self.resolve_targets();
        self.invoke_on(&targets, msg, timeout).await
    }

    /// [`invoke`](Self::invoke) against an already resolved target list.
    pub async fn invoke_on<R>(
        &self,
        targets: &[SocketAddr],
        msg: &Message,
        timeout: Duration,
    ) -> HashMap<IpAddr, R>
    where
        R: TryFrom<Message, Error = Message> + Send + 'static,
    {
        let mut responses = HashMap::new();
        if targets.is_empty() {
            return responses;
        }

        let envelope = match Envelope::seal(msg) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!("[{}] failed to encode {}: {}", self.role, msg.type_name(), e);
                return responses;
            }
        };

        let deadline = tokio::time::Instant::now() + timeout;
        let correlation = Uuid::new_v4();
        let kind = msg.type_name();
        let (tx, mut rx) = mpsc::channel::<(SocketAddr, Reply)>(targets.len());

        for target in targets {
            let request = OutboundRequest {
                target: *target,
                envelope: envelope.clone(),
                retry_times: self.retry_times,
            };
            let exchanger = self.caps.exchanger.clone();
            let dispatch = self.dispatch.clone();
            let tx = tx.clone();

            tokio::spawn(
                async move {
                    let Ok(_permit) = dispatch.acquire_owned().await else {
                        return;
                    };
                    let target = request.target;
                    let outcome = dispatch_isolated(exchanger, request).await;
                    // The collector may have given up already
                    let _ = tx.send((target, outcome)).await;
                }
                .in_current_span(),
            );
        }
        drop(tx);

        let mut pending = targets.len();
        while pending > 0 {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some((target, outcome))) => {
                    pending -= 1;
                    if let Some(reply) = self.decode_reply::<R>(target, kind, outcome) {
                        responses.insert(target.ip(), reply);
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        "[{}] invoke {} timed out after {:?}, {}/{} pending, correlation={}",
                        self.role,
                        kind,
                        timeout,
                        pending,
                        targets.len(),
                        correlation
                    );
                    break;
                }
            }
        }

        tracing::debug!(
            "[{}] invoke {} collected {}/{} replies, correlation={}",
            self.role,
            kind,
            responses.len(),
            targets.len(),
            correlation
        );
        responses
    }

    fn decode_reply<R>(
        &self,
        target: SocketAddr,
        kind: &str,
        outcome: Reply,
    ) -> Option<R>
    where
        R: TryFrom<Message, Error = Message>,
    {
        let envelope = match outcome {
            Ok(Some(envelope)) => envelope,
            Ok(None) => {
                tracing::warn!("[{}] invoke {} to {} got no reply", self.role, kind, target);
                return None;
            }
            Err(e) => {
                tracing::error!("[{}] invoke {} to {} failed: {}", self.role, kind, target, e);
                return None;
            }
        };

        let reply = match envelope.open() {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!("[{}] invoke {} to {} bad reply: {}", self.role, kind, target, e);
                return None;
            }
        };

        match R::try_from(reply) {
            Ok(reply) => Some(reply),
            Err(other) => {
                tracing::warn!(
                    "[{}] invoke {} to {} unexpected reply {}",
                    self.role,
                    kind,
                    target,
                    other.type_name()
                );
                None
            }
        }
    }
}

/// Run one request as its own task. A panicking exchanger surfaces as a
/// `Remote` error for that target instead of ending the dispatch silently.
async fn dispatch_isolated(
    exchanger: Arc<dyn NodeExchanger>,
    request: OutboundRequest,
) -> Reply {
    let target = request.target;
    let task = tokio::spawn(async move { exchanger.request(request).await }.in_current_span());
    match task.await {
        Ok(outcome) => outcome,
        Err(e) => Err(ExchangeError::Remote {
            addr: target,
            reason: format!("dispatch aborted: {}", e),
        }),
    }
}
