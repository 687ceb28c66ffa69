//! Slot Registry Library
//!
//! Replication core of a partitioned multi-role service registry: slot
//! diff-sync between data authorities and their followers, and leader-gated
//! cluster broadcast from the coordinator.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod replication;

// Re-export commonly used types
pub use application::ZoneAdminService;
pub use config::load_config;
pub use domain::entities::{DiffResult, DigestSummary, EndpointRecord, EndpointRef, PartitionTable};
pub use domain::ports::{
    ClientConnections, ConnectionRegistry, LeadershipOracle, PartitionMembership,
    PartitionTableSource, RecordStore,
};
pub use domain::services::compute_diff;
pub use domain::value_objects::{NodeRole, PartitionId};
pub use replication::{
    Broadcaster, ClusterNotifier, DiffSyncHandler, ReplicationAgent, ReplicationConfig,
    RoleCapabilities,
};
