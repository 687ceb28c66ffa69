//! Partition Membership Port
//!
//! Lists the logical nodes registered for a role, independent of transport
//! state.

use std::net::IpAddr;

/// Registered cluster members of one role.
pub trait PartitionMembership: Send + Sync {
    fn registered_node_addresses(&self) -> Vec<IpAddr>;
}
