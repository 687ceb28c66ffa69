//! Partition Table Tracker
//!
//! Holds this node's copy of the partition table. Observing a newer epoch
//! from a peer schedules a background refresh; it never blocks the caller
//! and never moves the local epoch by itself.

use crate::domain::entities::PartitionTable;
use crate::domain::ports::PartitionTableSource;
use crate::domain::value_objects::PartitionId;
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::Instrument;

/// Tracks the current partition table and refreshes it when peers report a
/// newer epoch.
pub struct PartitionTableTracker {
    /// Mirror of `table.epoch` for lock-free reads
    epoch: AtomicU64,
    table: RwLock<Arc<PartitionTable>>,
    /// Set while a refresh task is outstanding
    refreshing: AtomicBool,
    /// Highest epoch any peer has reported
    highest_observed: AtomicU64,
    /// Refresh tasks scheduled so far
    refreshes: AtomicU64,
    source: Arc<dyn PartitionTableSource>,
}

impl PartitionTableTracker {
    /// Create a tracker starting from an empty table at epoch 0.
    pub fn new(source: Arc<dyn PartitionTableSource>) -> Self {
        Self::with_table(source, PartitionTable::default())
    }

    /// Create a tracker starting from `table`.
    pub fn with_table(source: Arc<dyn PartitionTableSource>, table: PartitionTable) -> Self {
        Self {
            epoch: AtomicU64::new(table.epoch),
            highest_observed: AtomicU64::new(table.epoch),
            table: RwLock::new(Arc::new(table)),
            refreshing: AtomicBool::new(false),
            refreshes: AtomicU64::new(0),
            source,
        }
    }

    /// Epoch of the last installed table.
    pub fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// The last installed table.
    pub fn current_table(&self) -> Arc<PartitionTable> {
        self.table.read().clone()
    }

    /// Current owner of `partition`, if assigned.
    pub fn owner_of(&self, partition: PartitionId) -> Option<SocketAddr> {
        self.table.read().owner_of(partition)
    }

    /// Highest epoch reported by any peer so far.
    pub fn highest_observed(&self) -> u64 {
        self.highest_observed.load(Ordering::Acquire)
    }

    /// Number of refresh tasks scheduled since creation.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Acquire)
    }

    /// Whether a refresh task is outstanding.
    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::Acquire)
    }

    /// Note that a peer believes the table is at `remote`.
    ///
    /// When `remote` is ahead of the local epoch a refresh task is spawned,
    /// unless one is already outstanding. Errors are logged, never returned.
    pub fn observe_epoch(self: &Arc<Self>, remote: u64) {
        let local = self.current_epoch();
        if remote <= local {
            return;
        }
        self.highest_observed.fetch_max(remote, Ordering::AcqRel);

        if self
            .refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(
                "partition table refresh already pending, local={} remote={}",
                local,
                remote
            );
            return;
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!("cannot schedule partition table refresh: {}", e);
                self.refreshing.store(false, Ordering::Release);
                return;
            }
        };

        self.refreshes.fetch_add(1, Ordering::AcqRel);
        tracing::info!(
            "partition table behind, local={} remote={}, scheduling refresh",
            local,
            remote
        );

        let tracker = self.clone();
        handle.spawn(
            async move {
                tracker.refresh().await;
            }
            .in_current_span(),
        );
    }

    async fn refresh(&self) {
        // The fetch runs as its own task: a panicking source must still
        // clear `refreshing`.
        let source = self.source.clone();
        let fetch = tokio::spawn(async move { source.fetch_latest().await }.in_current_span());

        match fetch.await {
            Ok(Ok(table)) => {
                self.install_table(table);
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    "partition table refresh failed, local={}: {:?}",
                    self.current_epoch(),
                    e
                );
            }
            Err(e) => {
                tracing::error!(
                    "partition table refresh aborted, local={}: {}",
                    self.current_epoch(),
                    e
                );
            }
        }
        self.refreshing.store(false, Ordering::Release);
    }

    /// Install `table` if it is newer than the current one.
    ///
    /// Returns whether the table was installed. Older or equal epochs are
    /// ignored so the epoch never regresses.
    pub fn install_table(&self, table: PartitionTable) -> bool {
        let mut current = self.table.write();
        if table.epoch <= current.epoch {
            tracing::debug!(
                "ignoring partition table epoch={}, current={}",
                table.epoch,
                current.epoch
            );
            return false;
        }

        let previous = current.epoch;
        let epoch = table.epoch;
        *current = Arc::new(table);
        self.epoch.store(epoch, Ordering::Release);
        self.highest_observed.fetch_max(epoch, Ordering::AcqRel);
        tracing::info!("partition table updated, epoch {} -> {}", previous, epoch);
        true
    }
}
