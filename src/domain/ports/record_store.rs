//! Record Store Port
//!
//! Read access to the per-partition endpoint records held by a data node.
//! The registration subsystem mutates the store; the replication core only
//! reads it.

use crate::domain::entities::PartitionSnapshot;
use crate::domain::value_objects::PartitionId;

/// Per-partition store of registered endpoint records.
///
/// Implementations must tolerate concurrent mutation while a snapshot is
/// taken. Each logical key must be read atomically; the snapshot as a whole
/// does not need to be.
pub trait RecordStore: Send + Sync {
    /// Snapshot of every record in `partition`, keyed by logical key then
    /// endpoint id. Unknown partitions yield an empty snapshot.
    fn read_partition(&self, partition: PartitionId) -> PartitionSnapshot;
}
