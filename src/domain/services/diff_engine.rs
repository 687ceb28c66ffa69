//! Diff Engine
//!
//! Pure domain logic comparing a peer's digest summary of a partition with
//! the local records of that partition. This service has NO I/O - identical
//! inputs always produce identical results.

use crate::domain::entities::{
    DiffResult, DigestSummary, EndpointRecord, EndpointRef, PartitionSnapshot,
};
use crate::domain::value_objects::PartitionId;
use std::collections::BTreeMap;

/// An add or update candidate, borrowed from the local snapshot.
enum Upsert<'a> {
    Add(&'a EndpointRecord),
    Update(&'a EndpointRecord),
}

/// Compute what `remote` must change to match `local`, bounded to `max_batch`
/// entries.
///
/// Every logical key in either side is visited in key order, endpoint ids in
/// id order:
/// - key only local: every local endpoint is added
/// - key on both sides: remote missing -> add, local newer -> update,
///   local missing -> remove, otherwise nothing
/// - key only remote: every remote endpoint is removed
///
/// Adds and updates fill the batch first; removes get what is left. The
/// `epoch` of the result is left at zero for the caller to stamp.
pub fn compute_diff(
    target: PartitionId,
    remote: &DigestSummary,
    local: &PartitionSnapshot,
    max_batch: usize,
) -> DiffResult {
    let empty_local = BTreeMap::new();
    let empty_remote = BTreeMap::new();

    let mut upserts: Vec<Upsert<'_>> = Vec::new();
    let mut removes: Vec<(&str, &str)> = Vec::new();

    for key in merged_keys(remote.entries.keys(), local.keys()) {
        let local_endpoints = local.get(key).unwrap_or(&empty_local);
        let remote_endpoints = remote.entries.get(key).unwrap_or(&empty_remote);

        for id in merged_keys(remote_endpoints.keys(), local_endpoints.keys()) {
            match (local_endpoints.get(id), remote_endpoints.get(id)) {
                (Some(record), None) => upserts.push(Upsert::Add(record)),
                (Some(record), Some(remote_version)) if record.version > *remote_version => {
                    upserts.push(Upsert::Update(record))
                }
                (Some(_), Some(_)) => {}
                (None, _) => removes.push((key.as_str(), id.as_str())),
            }
        }
    }

    let total = upserts.len() + removes.len();
    let truncated = total > max_batch;
    let upsert_budget = upserts.len().min(max_batch);
    let remove_budget = (max_batch - upsert_budget).min(removes.len());

    if truncated {
        tracing::debug!(
            "diff for partition={} truncated: total={} max_batch={} upserts={} removes={}",
            target,
            total,
            max_batch,
            upserts.len(),
            removes.len()
        );
    }

    let mut result = DiffResult {
        truncated,
        ..Default::default()
    };

    for upsert in upserts.into_iter().take(upsert_budget) {
        match upsert {
            Upsert::Add(record) => result.added.push(record.clone()),
            Upsert::Update(record) => result.updated.push(record.clone()),
        }
    }

    result.removed = removes
        .into_iter()
        .take(remove_budget)
        .map(|(key, id)| EndpointRef::new(key, id))
        .collect();

    result
}

/// Sorted union of two sorted key sequences.
fn merged_keys<'a, A, B>(left: A, right: B) -> Vec<&'a String>
where
    A: Iterator<Item = &'a String>,
    B: Iterator<Item = &'a String>,
{
    let mut keys: Vec<&String> = left.chain(right).collect();
    keys.sort_unstable();
    keys.dedup();
    keys
}

/// Log a one-line summary of a diff result for `partition`.
pub fn log_diff_result(partition: PartitionId, result: &DiffResult) {
    if result.is_empty() {
        tracing::debug!("diff-sync partition={} epoch={} in sync", partition, result.epoch);
        return;
    }

    tracing::info!(
        "diff-sync partition={} epoch={} added={} updated={} removed={} truncated={}",
        partition,
        result.epoch,
        result.added.len(),
        result.updated.len(),
        result.removed.len(),
        result.truncated
    );
}
