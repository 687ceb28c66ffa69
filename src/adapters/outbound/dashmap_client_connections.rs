//! DashMap Client Connections
//!
//! Implements ClientConnections for a session node: per client IP, the
//! number of open connections and whether the IP is currently blocked.

use crate::domain::ports::ClientConnections;
use dashmap::DashMap;
use std::net::IpAddr;

#[derive(Debug, Default, Clone, Copy)]
struct ClientState {
    connections: usize,
    blocked: bool,
}

/// Client connection table of one session node.
pub struct DashMapClientConnections {
    clients: DashMap<IpAddr, ClientState>,
}

impl DashMapClientConnections {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
        }
    }

    /// Record a new client connection. Rejected when the IP is blocked.
    pub fn accept(&self, ip: IpAddr) -> bool {
        let mut state = self.clients.entry(ip).or_default();
        if state.blocked {
            tracing::debug!("rejecting blocked client {}", ip);
            return false;
        }
        state.connections += 1;
        true
    }

    /// Record a closed client connection.
    pub fn close(&self, ip: &IpAddr) {
        if let Some(mut state) = self.clients.get_mut(ip) {
            state.connections = state.connections.saturating_sub(1);
        }
    }

    pub fn is_blocked(&self, ip: &IpAddr) -> bool {
        self.clients.get(ip).map(|s| s.blocked).unwrap_or(false)
    }

    pub fn connection_count(&self, ip: &IpAddr) -> usize {
        self.clients.get(ip).map(|s| s.connections).unwrap_or(0)
    }
}

impl Default for DashMapClientConnections {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientConnections for DashMapClientConnections {
    fn client_off(&self, ips: &[IpAddr]) -> usize {
        let mut affected = 0;
        for ip in ips {
            let mut state = self.clients.entry(*ip).or_default();
            if !state.blocked {
                state.blocked = true;
                affected += state.connections;
                // Blocked clients are disconnected
                state.connections = 0;
            }
        }
        tracing::info!("client off ips={:?} closed {} connections", ips, affected);
        affected
    }

    fn client_on(&self, ips: &[IpAddr]) -> usize {
        let mut reopened = 0;
        for ip in ips {
            if let Some(mut state) = self.clients.get_mut(ip) {
                if state.blocked {
                    state.blocked = false;
                    reopened += 1;
                }
            }
        }
        tracing::info!("client on ips={:?} unblocked {}", ips, reopened);
        reopened
    }
}
