//! In-Memory Partition Table
//!
//! The meta role's authoritative partition table. Implements
//! PartitionTableSource so trackers on the same process can refresh from it.

use crate::domain::entities::PartitionTable;
use crate::domain::ports::PartitionTableSource;
use crate::domain::value_objects::PartitionId;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::net::SocketAddr;

/// Authoritative partition table held in memory.
pub struct MemoryPartitionTable {
    table: RwLock<PartitionTable>,
}

impl MemoryPartitionTable {
    pub fn new(table: PartitionTable) -> Self {
        Self {
            table: RwLock::new(table),
        }
    }

    /// Assign `partitions` round-robin across `authorities` at `epoch`.
    pub fn round_robin(epoch: u64, partitions: u32, authorities: &[SocketAddr]) -> Self {
        let mut owners = BTreeMap::new();
        if !authorities.is_empty() {
            for id in 0..partitions {
                owners.insert(PartitionId::new(id), authorities[id as usize % authorities.len()]);
            }
        }
        Self::new(PartitionTable::new(epoch, owners))
    }

    pub fn snapshot(&self) -> PartitionTable {
        self.table.read().clone()
    }

    pub fn epoch(&self) -> u64 {
        self.table.read().epoch
    }

    /// Move `partition` to `owner`, bumping the epoch. Returns the new table.
    pub fn reassign(&self, partition: PartitionId, owner: SocketAddr) -> PartitionTable {
        let mut table = self.table.write();
        table.owners.insert(partition, owner);
        table.epoch += 1;
        tracing::info!(
            "partition={} reassigned to {}, epoch={}",
            partition,
            owner,
            table.epoch
        );
        table.clone()
    }
}

#[async_trait]
impl PartitionTableSource for MemoryPartitionTable {
    async fn fetch_latest(&self) -> anyhow::Result<PartitionTable> {
        Ok(self.snapshot())
    }
}
