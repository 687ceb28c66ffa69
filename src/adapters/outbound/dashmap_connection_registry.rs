//! DashMap Connection and Node Registries
//!
//! Live transport connections and registered logical nodes for one role.
//! The two are tracked separately: a node can be registered while its
//! connection is down, and a connection can exist before registration.

use crate::domain::entities::LogicalNode;
use crate::domain::ports::{ConnectionRegistry, PartitionMembership};
use crate::domain::value_objects::NodeRole;
use dashmap::DashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

/// Live connections keyed by remote address.
pub struct DashMapConnectionRegistry {
    connections: DashMap<SocketAddr, Instant>,
}

impl DashMapConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Record a new connection. Reconnecting refreshes its timestamp.
    pub fn connect(&self, addr: SocketAddr) {
        if self.connections.insert(addr, Instant::now()).is_none() {
            tracing::debug!("connection {} established", addr);
        }
    }

    /// Forget a connection. Returns whether it was known.
    pub fn disconnect(&self, addr: &SocketAddr) -> bool {
        let removed = self.connections.remove(addr).is_some();
        if removed {
            tracing::debug!("connection {} closed", addr);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Default for DashMapConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry for DashMapConnectionRegistry {
    fn live_connections(&self) -> Vec<SocketAddr> {
        self.connections.iter().map(|e| *e.key()).collect()
    }
}

/// Registered logical nodes of one role, keyed by address.
pub struct DashMapNodeRegistry {
    role: NodeRole,
    nodes: DashMap<IpAddr, LogicalNode>,
}

impl DashMapNodeRegistry {
    pub fn new(role: NodeRole) -> Self {
        Self {
            role,
            nodes: DashMap::new(),
        }
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    /// Register a node. Re-registering keeps the original registration time.
    pub fn register(&self, address: IpAddr) {
        self.nodes.entry(address).or_insert_with(|| {
            tracing::info!("{} node {} registered", self.role, address);
            LogicalNode::new(address, self.role)
        });
    }

    /// Unregister a node. Returns whether it was registered.
    pub fn unregister(&self, address: &IpAddr) -> bool {
        let removed = self.nodes.remove(address).is_some();
        if removed {
            tracing::info!("{} node {} unregistered", self.role, address);
        }
        removed
    }

    /// Snapshot of registered nodes.
    pub fn nodes(&self) -> Vec<LogicalNode> {
        self.nodes.iter().map(|e| e.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl PartitionMembership for DashMapNodeRegistry {
    fn registered_node_addresses(&self) -> Vec<IpAddr> {
        self.nodes.iter().map(|e| *e.key()).collect()
    }
}
