//! Replication Agent
//!
//! Owns the replication state of one role instance (record store, partition
//! table tracker, diff-sync pool) and hands out the handlers and loops built
//! on it. Stopping the agent stops the loops and drains in-flight requests.

use crate::adapters::outbound::DashMapRecordStore;
use crate::domain::ports::PartitionTableSource;
use crate::infrastructure::shutdown::ShutdownController;
use crate::infrastructure::worker_pool::{WorkerPool, WorkerPoolConfig};
use crate::replication::config::ReplicationConfig;
use crate::replication::epoch::PartitionTableTracker;
use crate::replication::handler::{DiffSyncHandler, SlotTableChangeHandler};
use crate::replication::sync::DiffSyncClient;
use crate::replication::transport::NodeExchanger;
use crate::replication::types::NodeId;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Replication services of one role instance.
pub struct ReplicationAgent {
    config: ReplicationConfig,
    node_id: NodeId,
    store: Arc<DashMapRecordStore>,
    tracker: Arc<PartitionTableTracker>,
    pool: Arc<WorkerPool>,
    shutdown: ShutdownController,
    sync_task: Mutex<Option<JoinHandle<()>>>,
}

impl ReplicationAgent {
    /// Create a new replication agent.
    pub fn new(
        config: ReplicationConfig,
        store: Arc<DashMapRecordStore>,
        source: Arc<dyn PartitionTableSource>,
        shutdown: ShutdownController,
    ) -> anyhow::Result<Self> {
        config.validate()?;

        let node_id = NodeId::new(&config.node_id);
        let pool = Arc::new(WorkerPool::new(
            format!("{}-diff-sync", config.node_id),
            WorkerPoolConfig {
                workers: config.diff_workers,
                queue: config.diff_queue,
            },
        ));

        Ok(Self {
            tracker: Arc::new(PartitionTableTracker::new(source)),
            config,
            node_id,
            store,
            pool,
            shutdown,
            sync_task: Mutex::new(None),
        })
    }

    /// Get the node ID.
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<DashMapRecordStore> {
        &self.store
    }

    pub fn tracker(&self) -> &Arc<PartitionTableTracker> {
        &self.tracker
    }

    /// Check if the agent is running.
    pub fn is_running(&self) -> bool {
        !self.shutdown.is_shutdown()
    }

    /// Handler serving diff-sync requests for partitions this node owns.
    pub fn diff_sync_handler(&self) -> DiffSyncHandler {
        DiffSyncHandler::new(
            self.store.clone(),
            self.tracker.clone(),
            self.pool.clone(),
            self.config.max_batch,
            self.shutdown.clone(),
        )
    }

    /// Handler applying partition table change notifications.
    pub fn slot_table_handler(&self) -> SlotTableChangeHandler {
        SlotTableChangeHandler::new(self.tracker.clone())
    }

    /// Follower client pulling partitions through `exchanger`.
    pub fn sync_client(&self, exchanger: Arc<dyn NodeExchanger>) -> DiffSyncClient {
        DiffSyncClient::new(self.store.clone(), self.tracker.clone(), exchanger, &self.config)
    }

    /// Start the periodic follower sync loop. A second call is ignored.
    pub fn start_follower(&self, exchanger: Arc<dyn NodeExchanger>) {
        let mut task = self.sync_task.lock();
        if task.is_some() {
            tracing::warn!("follower sync loop already running node_id={}", self.node_id);
            return;
        }

        let client = Arc::new(self.sync_client(exchanger));
        *task = Some(client.spawn_loop(self.config.sync_interval, self.shutdown.clone()));
        tracing::info!(
            "replication agent node_id={} role={} following from {}",
            self.node_id,
            self.config.role,
            self.config.local_addr
        );
    }

    /// Stop loops, reject new diff-sync work, and wait up to `drain` for
    /// in-flight requests. Returns whether everything drained.
    pub async fn stop(&self, drain: Duration) -> bool {
        tracing::info!("stopping replication agent node_id={}", self.node_id);
        self.shutdown.shutdown();
        self.pool.close();

        let drained = self.shutdown.wait_for_drain(drain).await;

        let task = self.sync_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!("follower sync loop ended abnormally: {}", e);
            }
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::outbound::MemoryPartitionTable;
    use crate::domain::entities::{DigestSummary, EndpointRecord, PartitionTable};
    use crate::domain::value_objects::PartitionId;
    use crate::replication::types::{DiffSyncRequest, DiffSyncResponse, ErrorClass};
    use std::collections::BTreeMap;

    fn agent(node_id: &str) -> ReplicationAgent {
        ReplicationAgent::new(
            ReplicationConfig::new(node_id),
            Arc::new(DashMapRecordStore::new()),
            Arc::new(MemoryPartitionTable::new(PartitionTable::new(1, BTreeMap::new()))),
            ShutdownController::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_agent_creation() {
        let agent = agent("data-1");
        assert_eq!(agent.node_id().as_str(), "data-1");
        assert_eq!(agent.config().max_batch, 512);
        assert!(agent.is_running());
    }

    #[test]
    fn test_agent_validation_fails_without_node_id() {
        let result = ReplicationAgent::new(
            ReplicationConfig::default(),
            Arc::new(DashMapRecordStore::new()),
            Arc::new(MemoryPartitionTable::new(PartitionTable::default())),
            ShutdownController::new(),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_handler_serves_agent_store() {
        let agent = agent("data-1");
        agent
            .store()
            .upsert(PartitionId::new(3), EndpointRecord::new("svc", "id1", 1, b"x".to_vec()));

        let response = agent
            .diff_sync_handler()
            .handle_request(DiffSyncRequest {
                partition_id: 3,
                summary: DigestSummary::new(),
                caller_epoch: 0,
            })
            .await;

        match response {
            DiffSyncResponse::Succeeded { diff, .. } => assert_eq!(diff.added.len(), 1),
            other => panic!("unexpected response {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stop_rejects_new_requests() {
        let agent = agent("data-1");
        let handler = agent.diff_sync_handler();

        assert!(agent.stop(Duration::from_millis(100)).await);
        assert!(!agent.is_running());

        let response = handler
            .handle_request(DiffSyncRequest {
                partition_id: 0,
                summary: DigestSummary::new(),
                caller_epoch: 0,
            })
            .await;
        assert!(matches!(
            response,
            DiffSyncResponse::Failed {
                class: ErrorClass::Backpressure,
                ..
            }
        ));
    }
}
