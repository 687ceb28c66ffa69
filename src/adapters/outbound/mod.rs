mod dashmap_client_connections;
mod dashmap_connection_registry;
mod dashmap_record_store;
mod in_process_exchanger;
mod lease_leadership;
mod memory_partition_table;

pub use dashmap_client_connections::DashMapClientConnections;
pub use dashmap_connection_registry::{DashMapConnectionRegistry, DashMapNodeRegistry};
pub use dashmap_record_store::DashMapRecordStore;
pub use in_process_exchanger::{InProcessExchanger, InProcessNetwork};
pub use lease_leadership::LeaseLeadership;
pub use memory_partition_table::MemoryPartitionTable;
