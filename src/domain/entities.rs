//! Domain Entities - Core business objects
//!
//! These entities represent the core concepts of the registry replication
//! domain. They have no I/O dependencies and contain only business logic.

use crate::domain::value_objects::{NodeRole, PartitionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

/// Records of one partition: logical key -> endpoint id -> record.
///
/// Ordered maps so iteration order is stable across calls.
pub type PartitionSnapshot = BTreeMap<String, BTreeMap<String, EndpointRecord>>;

/// One registered service-endpoint instance.
///
/// Records are superseded by re-registration with a higher version; the
/// version is what peers compare during diff-sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRecord {
    /// Service identity this endpoint is registered under
    pub logical_key: String,
    /// Unique id of this registration
    pub endpoint_id: String,
    /// Monotonic per endpoint id
    pub version: u64,
    /// Opaque registration payload
    pub payload: Vec<u8>,
}

impl EndpointRecord {
    pub fn new(
        logical_key: impl Into<String>,
        endpoint_id: impl Into<String>,
        version: u64,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            logical_key: logical_key.into(),
            endpoint_id: endpoint_id.into(),
            version,
            payload: payload.into(),
        }
    }

    /// Reference to this record without its payload.
    pub fn to_ref(&self) -> EndpointRef {
        EndpointRef::new(self.logical_key.clone(), self.endpoint_id.clone())
    }
}

/// Identifies an endpoint without carrying its payload.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EndpointRef {
    pub logical_key: String,
    pub endpoint_id: String,
}

impl EndpointRef {
    pub fn new(logical_key: impl Into<String>, endpoint_id: impl Into<String>) -> Self {
        Self {
            logical_key: logical_key.into(),
            endpoint_id: endpoint_id.into(),
        }
    }
}

/// A peer's compact description of what it holds for one partition.
///
/// Maps logical key -> endpoint id -> version. Built per request and never
/// persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestSummary {
    pub entries: BTreeMap<String, BTreeMap<String, u64>>,
}

impl DigestSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Summarize a partition snapshot.
    pub fn of(snapshot: &PartitionSnapshot) -> Self {
        let entries = snapshot
            .iter()
            .map(|(key, endpoints)| {
                let versions = endpoints
                    .iter()
                    .map(|(id, record)| (id.clone(), record.version))
                    .collect();
                (key.clone(), versions)
            })
            .collect();
        Self { entries }
    }

    /// Record that the peer holds `endpoint_id` at `version` under `logical_key`.
    pub fn insert(
        &mut self,
        logical_key: impl Into<String>,
        endpoint_id: impl Into<String>,
        version: u64,
    ) {
        self.entries
            .entry(logical_key.into())
            .or_default()
            .insert(endpoint_id.into(), version);
    }

    /// Number of logical keys summarized.
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    /// Number of (endpoint id, version) pairs summarized.
    pub fn endpoint_count(&self) -> usize {
        self.entries.values().map(|ids| ids.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Output of one diff-sync exchange.
///
/// `added.len() + updated.len() + removed.len()` never exceeds the batch bound
/// the authority was configured with. When the full diff is larger the result
/// is cut and `truncated` is set so the peer re-requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    /// Endpoints the peer does not have at all
    pub added: Vec<EndpointRecord>,
    /// Endpoints the peer holds at an older version
    pub updated: Vec<EndpointRecord>,
    /// Endpoints the peer holds that no longer exist on the authority
    pub removed: Vec<EndpointRef>,
    /// The unbounded diff did not fit in the batch
    pub truncated: bool,
    /// Partition table epoch seen by the authority at computation time
    pub epoch: u64,
}

impl DiffResult {
    /// Total number of entries across add, update and remove.
    pub fn len(&self) -> usize {
        self.added.len() + self.updated.len() + self.removed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cluster-wide assignment of partitions to authority instances.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionTable {
    /// Monotonic version of this assignment
    pub epoch: u64,
    /// Authority holding each partition
    pub owners: BTreeMap<PartitionId, SocketAddr>,
}

impl PartitionTable {
    pub fn new(epoch: u64, owners: BTreeMap<PartitionId, SocketAddr>) -> Self {
        Self { epoch, owners }
    }

    pub fn owner_of(&self, partition: PartitionId) -> Option<SocketAddr> {
        self.owners.get(&partition).copied()
    }

    /// Partitions owned by `addr`.
    pub fn owned_by(&self, addr: SocketAddr) -> Vec<PartitionId> {
        self.owners
            .iter()
            .filter(|(_, owner)| **owner == addr)
            .map(|(partition, _)| *partition)
            .collect()
    }
}

/// A registered cluster member, identified by address and independent of any
/// live transport connection.
#[derive(Debug, Clone)]
pub struct LogicalNode {
    pub address: IpAddr,
    pub role: NodeRole,
    pub registered_at: Instant,
}

impl LogicalNode {
    pub fn new(address: IpAddr, role: NodeRole) -> Self {
        Self {
            address,
            role,
            registered_at: Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> PartitionSnapshot {
        let mut snap = PartitionSnapshot::new();
        snap.entry("svc-a".to_string())
            .or_default()
            .insert("id1".to_string(), EndpointRecord::new("svc-a", "id1", 2, b"x".to_vec()));
        snap.entry("svc-a".to_string())
            .or_default()
            .insert("id2".to_string(), EndpointRecord::new("svc-a", "id2", 5, Vec::<u8>::new()));
        snap.entry("svc-b".to_string())
            .or_default()
            .insert("id3".to_string(), EndpointRecord::new("svc-b", "id3", 1, Vec::<u8>::new()));
        snap
    }

    #[test]
    fn test_digest_summary_of_snapshot() {
        let summary = DigestSummary::of(&snapshot());

        assert_eq!(summary.key_count(), 2);
        assert_eq!(summary.endpoint_count(), 3);
        assert_eq!(summary.entries["svc-a"]["id2"], 5);
        assert_eq!(summary.entries["svc-b"]["id3"], 1);
    }

    #[test]
    fn test_digest_summary_insert() {
        let mut summary = DigestSummary::new();
        assert!(summary.is_empty());

        summary.insert("svc-a", "id1", 1);
        summary.insert("svc-a", "id1", 3);
        summary.insert("svc-a", "id2", 1);

        assert_eq!(summary.key_count(), 1);
        assert_eq!(summary.endpoint_count(), 2);
        assert_eq!(summary.entries["svc-a"]["id1"], 3);
    }

    #[test]
    fn test_diff_result_len() {
        let mut result = DiffResult::default();
        assert!(result.is_empty());

        result.added.push(EndpointRecord::new("k", "a", 1, Vec::<u8>::new()));
        result.removed.push(EndpointRef::new("k", "b"));
        assert_eq!(result.len(), 2);
        assert!(!result.is_empty());
    }

    #[test]
    fn test_endpoint_record_to_ref() {
        let record = EndpointRecord::new("svc", "id", 9, b"payload".to_vec());
        assert_eq!(record.to_ref(), EndpointRef::new("svc", "id"));
    }

    #[test]
    fn test_partition_table_owners() {
        let a: SocketAddr = "10.0.0.1:9600".parse().unwrap();
        let b: SocketAddr = "10.0.0.2:9600".parse().unwrap();
        let mut owners = BTreeMap::new();
        owners.insert(PartitionId::new(0), a);
        owners.insert(PartitionId::new(1), b);
        owners.insert(PartitionId::new(2), a);
        let table = PartitionTable::new(4, owners);

        assert_eq!(table.owner_of(PartitionId::new(1)), Some(b));
        assert_eq!(table.owner_of(PartitionId::new(9)), None);
        assert_eq!(table.owned_by(a), vec![PartitionId::new(0), PartitionId::new(2)]);
    }
}
