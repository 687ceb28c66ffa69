//! Partition Table Source Port
//!
//! Where a node fetches the latest partition table from when it learns that
//! its local copy is stale.

use crate::domain::entities::PartitionTable;
use async_trait::async_trait;

/// Source of the authoritative partition table (usually the meta leader).
#[async_trait]
pub trait PartitionTableSource: Send + Sync {
    /// Fetch the latest table known to the source.
    async fn fetch_latest(&self) -> anyhow::Result<PartitionTable>;
}
