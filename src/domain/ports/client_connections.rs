//! Client Connections Port
//!
//! Local client connection management on a session node.

use std::net::IpAddr;

/// Blocks or re-opens client connections by client IP.
pub trait ClientConnections: Send + Sync {
    /// Stop serving the given client IPs. Returns the number of connections
    /// affected.
    fn client_off(&self, ips: &[IpAddr]) -> usize;

    /// Resume serving the given client IPs. Returns the number of connections
    /// affected.
    fn client_on(&self, ips: &[IpAddr]) -> usize;
}
