//! DashMap Record Store
//!
//! Implements RecordStore over nested DashMaps: partition -> logical key ->
//! endpoint records. Each logical key is read under its shard lock, so a
//! snapshot is consistent per key but not across keys.

use crate::domain::entities::{EndpointRecord, EndpointRef, PartitionSnapshot};
use crate::domain::ports::RecordStore;
use crate::domain::value_objects::PartitionId;
use dashmap::DashMap;
use std::collections::BTreeMap;

type KeyRecords = BTreeMap<String, EndpointRecord>;

/// In-memory endpoint records for every partition this node holds.
pub struct DashMapRecordStore {
    partitions: DashMap<PartitionId, DashMap<String, KeyRecords>>,
}

impl DashMapRecordStore {
    pub fn new() -> Self {
        Self {
            partitions: DashMap::new(),
        }
    }

    /// Insert or replace a record.
    ///
    /// A record older than the stored one is ignored. Returns whether the
    /// store changed.
    pub fn upsert(&self, partition: PartitionId, record: EndpointRecord) -> bool {
        let keys = self.partitions.entry(partition).or_default().downgrade();
        let mut records = keys.entry(record.logical_key.clone()).or_default();

        match records.get(&record.endpoint_id) {
            Some(existing) if existing.version >= record.version => false,
            _ => {
                records.insert(record.endpoint_id.clone(), record);
                true
            }
        }
    }

    /// Remove one endpoint. Returns whether it was present.
    pub fn remove(&self, partition: PartitionId, target: &EndpointRef) -> bool {
        let Some(keys) = self.partitions.get(&partition) else {
            return false;
        };

        let removed = match keys.get_mut(&target.logical_key) {
            Some(mut records) => records.remove(&target.endpoint_id).is_some(),
            None => false,
        };
        keys.remove_if(&target.logical_key, |_, records| records.is_empty());
        removed
    }

    /// Look up one endpoint.
    pub fn get(
        &self,
        partition: PartitionId,
        logical_key: &str,
        endpoint_id: &str,
    ) -> Option<EndpointRecord> {
        let keys = self.partitions.get(&partition)?;
        let records = keys.get(logical_key)?;
        records.get(endpoint_id).cloned()
    }

    /// Number of endpoints held for `partition`.
    pub fn record_count(&self, partition: PartitionId) -> usize {
        self.partitions
            .get(&partition)
            .map(|keys| keys.iter().map(|entry| entry.value().len()).sum::<usize>())
            .unwrap_or(0)
    }
}

impl Default for DashMapRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for DashMapRecordStore {
    fn read_partition(&self, partition: PartitionId) -> PartitionSnapshot {
        let Some(keys) = self.partitions.get(&partition) else {
            return PartitionSnapshot::new();
        };

        keys.iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &str, id: &str, version: u64) -> EndpointRecord {
        EndpointRecord::new(key, id, version, id.as_bytes().to_vec())
    }

    const P0: PartitionId = PartitionId::new(0);

    #[test]
    fn test_empty_partition_reads_empty() {
        let store = DashMapRecordStore::new();
        assert!(store.read_partition(P0).is_empty());
        assert_eq!(store.record_count(P0), 0);
    }

    #[test]
    fn test_upsert_keeps_newest_version() {
        let store = DashMapRecordStore::new();

        assert!(store.upsert(P0, record("svc", "id1", 2)));
        assert!(!store.upsert(P0, record("svc", "id1", 1)));
        assert!(!store.upsert(P0, record("svc", "id1", 2)));
        assert_eq!(store.get(P0, "svc", "id1").unwrap().version, 2);

        assert!(store.upsert(P0, record("svc", "id1", 3)));
        assert_eq!(store.get(P0, "svc", "id1").unwrap().version, 3);
    }

    #[test]
    fn test_read_partition_groups_by_key() {
        let store = DashMapRecordStore::new();
        store.upsert(P0, record("b", "id2", 1));
        store.upsert(P0, record("a", "id1", 1));
        store.upsert(P0, record("a", "id0", 4));
        store.upsert(PartitionId::new(1), record("c", "id9", 1));

        let snap = store.read_partition(P0);
        assert_eq!(snap.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(snap["a"].keys().collect::<Vec<_>>(), vec!["id0", "id1"]);
        assert_eq!(store.record_count(P0), 3);
        assert_eq!(store.record_count(PartitionId::new(1)), 1);
    }

    #[test]
    fn test_remove_drops_empty_keys() {
        let store = DashMapRecordStore::new();
        store.upsert(P0, record("svc", "id1", 1));

        assert!(store.remove(P0, &EndpointRef::new("svc", "id1")));
        assert!(!store.remove(P0, &EndpointRef::new("svc", "id1")));
        assert!(!store.remove(PartitionId::new(7), &EndpointRef::new("svc", "id1")));
        assert!(store.read_partition(P0).is_empty());
    }

    #[test]
    fn test_concurrent_upserts() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(DashMapRecordStore::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        let key = format!("k{}", i % 10);
                        store.upsert(P0, record(&key, &format!("id{}-{}", t, i), 1));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.record_count(P0), 800);
        assert_eq!(store.read_partition(P0).len(), 10);
    }
}
