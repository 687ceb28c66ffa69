//! Follower Sync
//!
//! Pulls partitions from their authorities with diff-sync: send a digest of
//! what is held locally, apply the returned adds, updates and removes, and
//! ask again while the authority reports the result as truncated.

use crate::adapters::outbound::DashMapRecordStore;
use crate::domain::entities::{DiffResult, DigestSummary};
use crate::domain::ports::RecordStore;
use crate::domain::value_objects::PartitionId;
use crate::infrastructure::shutdown::ShutdownController;
use crate::replication::config::ReplicationConfig;
use crate::replication::epoch::PartitionTableTracker;
use crate::replication::transport::{ExchangeError, NodeExchanger, OutboundRequest};
use crate::replication::types::{CodecError, DiffSyncRequest, DiffSyncResponse, ErrorClass, Message};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Result of syncing one partition.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Diff-sync exchanges performed
    pub rounds: usize,
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    /// The last result was not truncated
    pub complete: bool,
}

/// Why a partition could not be synced.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("partition {0} has no owner")]
    NoOwner(PartitionId),
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("{addr} returned no reply")]
    EmptyReply { addr: SocketAddr },
    #[error("{addr} replied with {kind}")]
    UnexpectedReply { addr: SocketAddr, kind: &'static str },
    #[error("{addr} rejected partition {partition} ({class:?}): {message}")]
    Rejected {
        addr: SocketAddr,
        partition: PartitionId,
        class: ErrorClass,
        message: String,
    },
}

/// Follower side of diff-sync.
pub struct DiffSyncClient {
    local: SocketAddr,
    store: Arc<DashMapRecordStore>,
    tracker: Arc<PartitionTableTracker>,
    exchanger: Arc<dyn NodeExchanger>,
    retry_times: u32,
    /// Deadline for one diff-sync exchange
    request_timeout: Duration,
    max_rounds: usize,
}

impl DiffSyncClient {
    pub fn new(
        store: Arc<DashMapRecordStore>,
        tracker: Arc<PartitionTableTracker>,
        exchanger: Arc<dyn NodeExchanger>,
        config: &ReplicationConfig,
    ) -> Self {
        Self {
            local: config.local_addr,
            store,
            tracker,
            exchanger,
            retry_times: config.retry_times,
            request_timeout: config.invoke_timeout,
            max_rounds: config.max_sync_rounds,
        }
    }

    /// Bring `partition` up to date with its authority.
    ///
    /// Partitions this node owns are skipped. At most `max_sync_rounds`
    /// exchanges are made; a still truncated result is picked up next pass.
    pub async fn sync_partition(&self, partition: PartitionId) -> Result<SyncOutcome, SyncError> {
        let owner = self
            .tracker
            .owner_of(partition)
            .ok_or(SyncError::NoOwner(partition))?;

        let mut outcome = SyncOutcome::default();
        if owner == self.local {
            outcome.complete = true;
            return Ok(outcome);
        }

        while outcome.rounds < self.max_rounds {
            let summary = DigestSummary::of(&self.store.read_partition(partition));
            let request = DiffSyncRequest {
                partition_id: i64::from(partition),
                summary,
                caller_epoch: self.tracker.current_epoch(),
            };
            let request = OutboundRequest::new(owner, &Message::from(request), self.retry_times)?;

            let reply = tokio::time::timeout(self.request_timeout, self.exchanger.request(request))
                .await
                .map_err(|_| ExchangeError::Timeout(owner))??
                .ok_or(SyncError::EmptyReply { addr: owner })?
                .open()?;
            let response =
                DiffSyncResponse::try_from(reply).map_err(|other| SyncError::UnexpectedReply {
                    addr: owner,
                    kind: other.type_name(),
                })?;
            outcome.rounds += 1;

            match response {
                DiffSyncResponse::Succeeded { diff, epoch } => {
                    self.tracker.observe_epoch(epoch);
                    self.apply(partition, &diff, &mut outcome);
                    if !diff.truncated {
                        outcome.complete = true;
                        break;
                    }
                }
                DiffSyncResponse::Failed { class, message } => {
                    return Err(SyncError::Rejected {
                        addr: owner,
                        partition,
                        class,
                        message,
                    });
                }
            }
        }

        if !outcome.complete {
            tracing::debug!(
                "partition={} still truncated after {} rounds",
                partition,
                outcome.rounds
            );
        }
        Ok(outcome)
    }

    fn apply(&self, partition: PartitionId, diff: &DiffResult, outcome: &mut SyncOutcome) {
        for record in diff.added.iter().cloned() {
            if self.store.upsert(partition, record) {
                outcome.added += 1;
            }
        }
        for record in diff.updated.iter().cloned() {
            if self.store.upsert(partition, record) {
                outcome.updated += 1;
            }
        }
        for target in &diff.removed {
            if self.store.remove(partition, target) {
                outcome.removed += 1;
            }
        }
    }

    /// Sync every partition owned by another node. Returns how many
    /// partitions finished in sync; failures are logged and skipped.
    pub async fn sync_all(&self) -> usize {
        let table = self.tracker.current_table();
        let mut in_sync = 0;

        for (partition, owner) in table.owners.iter() {
            if *owner == self.local {
                continue;
            }
            match self.sync_partition(*partition).await {
                Ok(outcome) => {
                    if outcome.added + outcome.updated + outcome.removed > 0 {
                        tracing::info!(
                            "partition={} synced from {}: added={} updated={} removed={} rounds={}",
                            partition,
                            owner,
                            outcome.added,
                            outcome.updated,
                            outcome.removed,
                            outcome.rounds
                        );
                    }
                    if outcome.complete {
                        in_sync += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!("partition={} sync from {} failed: {}", partition, owner, e);
                }
            }
        }
        in_sync
    }

    /// Run [`sync_all`](Self::sync_all) every `interval` plus up to 10%
    /// jitter until `shutdown` fires.
    pub fn spawn_loop(
        self: Arc<Self>,
        interval: Duration,
        shutdown: ShutdownController,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!("follower sync loop started, interval={:?}", interval);
            loop {
                let jitter_ms = (interval.as_millis() as u64 / 10).max(1);
                let delay = interval + Duration::from_millis(rand::random::<u64>() % jitter_ms);

                tokio::select! {
                    _ = shutdown.stopped() => break,
                    _ = tokio::time::sleep(delay) => {
                        self.sync_all().await;
                    }
                }
            }
            tracing::info!("follower sync loop stopped");
        })
    }
}
