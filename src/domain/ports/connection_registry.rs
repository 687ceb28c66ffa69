//! Connection Registry Port
//!
//! Lists the live transport connections a role currently holds.

use std::net::SocketAddr;

/// Live physical connections, identified by remote address.
///
/// Connections may appear or disappear at any time; callers get a point in
/// time copy.
pub trait ConnectionRegistry: Send + Sync {
    fn live_connections(&self) -> Vec<SocketAddr>;
}
