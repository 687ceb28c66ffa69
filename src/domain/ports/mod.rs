mod client_connections;
mod connection_registry;
mod leadership;
mod membership;
mod partition_table_source;
mod record_store;

pub use client_connections::ClientConnections;
pub use connection_registry::ConnectionRegistry;
pub use leadership::LeadershipOracle;
pub use membership::PartitionMembership;
pub use partition_table_source::PartitionTableSource;
pub use record_store::RecordStore;
