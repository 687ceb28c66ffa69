//! Diff-Sync Handler
//!
//! Serves follower diff-sync requests on the authority: validates the
//! request, notes the follower's partition table epoch, and computes the
//! bounded diff on a dedicated worker pool.

use crate::domain::entities::DiffResult;
use crate::domain::ports::RecordStore;
use crate::domain::services::{compute_diff, log_diff_result};
use crate::domain::value_objects::{InvalidPartitionId, PartitionId};
use crate::infrastructure::shutdown::ShutdownController;
use crate::infrastructure::worker_pool::{PoolError, WorkerPool};
use crate::replication::epoch::PartitionTableTracker;
use crate::replication::transport::{HandlerType, MessageHandler};
use crate::replication::types::{
    CommonResponse, DiffSyncRequest, DiffSyncResponse, ErrorClass, Message,
};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;

/// Why a diff-sync request failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiffSyncError {
    #[error(transparent)]
    InvalidPartition(#[from] InvalidPartitionId),
    #[error("diff computation failed for partition {partition}: {cause}")]
    Computation { partition: PartitionId, cause: String },
    #[error("diff-sync pool saturated")]
    Backpressure,
    #[error("node is shutting down")]
    ShuttingDown,
}

impl DiffSyncError {
    /// How the caller should treat this failure.
    pub fn class(&self) -> ErrorClass {
        match self {
            DiffSyncError::InvalidPartition(_) => ErrorClass::Client,
            DiffSyncError::Computation { .. } => ErrorClass::Server,
            DiffSyncError::Backpressure | DiffSyncError::ShuttingDown => ErrorClass::Backpressure,
        }
    }
}

/// Authority-side diff-sync endpoint.
pub struct DiffSyncHandler {
    store: Arc<dyn RecordStore>,
    tracker: Arc<PartitionTableTracker>,
    pool: Arc<WorkerPool>,
    max_batch: usize,
    shutdown: ShutdownController,
}

impl DiffSyncHandler {
    /// Create a new diff-sync handler.
    pub fn new(
        store: Arc<dyn RecordStore>,
        tracker: Arc<PartitionTableTracker>,
        pool: Arc<WorkerPool>,
        max_batch: usize,
        shutdown: ShutdownController,
    ) -> Self {
        Self {
            store,
            tracker,
            pool,
            max_batch,
            shutdown,
        }
    }

    /// Reject requests that cannot be served before doing any work.
    pub fn check_param(&self, request: &DiffSyncRequest) -> Result<PartitionId, DiffSyncError> {
        Ok(PartitionId::try_from(request.partition_id)?)
    }

    /// Serve one request. Failures become a `Failed` response, never a drop.
    pub async fn handle_request(&self, request: DiffSyncRequest) -> DiffSyncResponse {
        match self.process(request).await {
            Ok(diff) => {
                let epoch = diff.epoch;
                DiffSyncResponse::Succeeded { diff, epoch }
            }
            Err(e) => DiffSyncResponse::failed(e.class(), e.to_string()),
        }
    }

    async fn process(&self, request: DiffSyncRequest) -> Result<DiffResult, DiffSyncError> {
        let partition = self.check_param(&request).inspect_err(|e| {
            tracing::warn!("rejecting diff-sync request: {}", e);
        })?;

        if self.shutdown.is_shutdown() {
            return Err(DiffSyncError::ShuttingDown);
        }
        let _in_flight = self.shutdown.track();

        self.tracker.observe_epoch(request.caller_epoch);

        let store = self.store.clone();
        let summary = request.summary;
        let max_batch = self.max_batch;
        let outcome = self
            .pool
            .run(move || {
                let local = store.read_partition(partition);
                compute_diff(partition, &summary, &local, max_batch)
            })
            .await;

        let mut diff = match outcome {
            Ok(diff) => diff,
            Err(PoolError::Saturated) => {
                tracing::warn!("diff-sync partition={} rejected: pool saturated", partition);
                return Err(DiffSyncError::Backpressure);
            }
            Err(PoolError::Closed) => return Err(DiffSyncError::ShuttingDown),
            Err(e) => {
                tracing::error!("diff-sync request error for partition={}: {}", partition, e);
                return Err(DiffSyncError::Computation {
                    partition,
                    cause: e.to_string(),
                });
            }
        };

        diff.epoch = self.tracker.current_epoch();
        log_diff_result(partition, &diff);
        Ok(diff)
    }
}

#[async_trait]
impl MessageHandler for DiffSyncHandler {
    fn interest(&self, msg: &Message) -> bool {
        matches!(msg, Message::DiffSyncRequest(_))
    }

    fn handler_type(&self) -> HandlerType {
        HandlerType::Processor
    }

    async fn handle(&self, from: SocketAddr, msg: Message) -> anyhow::Result<Option<Message>> {
        match msg {
            Message::DiffSyncRequest(request) => {
                tracing::debug!(
                    "diff-sync request from {} partition={} caller_epoch={}",
                    from,
                    request.partition_id,
                    request.caller_epoch
                );
                let response = self.handle_request(request).await;
                Ok(Some(Message::DiffSyncResponse(response)))
            }
            other => anyhow::bail!("unexpected {} for diff-sync handler", other.type_name()),
        }
    }
}

/// Applies partition-table-change notifications from the meta leader.
pub struct SlotTableChangeHandler {
    tracker: Arc<PartitionTableTracker>,
}

impl SlotTableChangeHandler {
    pub fn new(tracker: Arc<PartitionTableTracker>) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl MessageHandler for SlotTableChangeHandler {
    fn interest(&self, msg: &Message) -> bool {
        matches!(msg, Message::SlotTableChange(_))
    }

    async fn handle(&self, from: SocketAddr, msg: Message) -> anyhow::Result<Option<Message>> {
        match msg {
            Message::SlotTableChange(event) => {
                tracing::debug!("slot table change from {} epoch={}", from, event.epoch);
                self.tracker.observe_epoch(event.epoch);
                Ok(Some(Message::Common(CommonResponse::success())))
            }
            other => anyhow::bail!("unexpected {} for slot table handler", other.type_name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{
        DigestSummary, EndpointRecord, EndpointRef, PartitionSnapshot, PartitionTable,
    };
    use crate::domain::ports::PartitionTableSource;
    use crate::infrastructure::worker_pool::WorkerPoolConfig;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tracing_test::traced_test;

    struct FixedStore(PartitionSnapshot);

    impl RecordStore for FixedStore {
        fn read_partition(&self, partition: PartitionId) -> PartitionSnapshot {
            if partition.get() == 1 {
                self.0.clone()
            } else {
                PartitionSnapshot::new()
            }
        }
    }

    struct PanickingStore;

    impl RecordStore for PanickingStore {
        fn read_partition(&self, _partition: PartitionId) -> PartitionSnapshot {
            panic!("storage corrupted");
        }
    }

    /// Blocks every read until released, signalling when a read starts.
    struct BlockingStore {
        started: parking_lot::Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
        release: parking_lot::Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl RecordStore for BlockingStore {
        fn read_partition(&self, _partition: PartitionId) -> PartitionSnapshot {
            if let Some(started) = self.started.lock().take() {
                let _ = started.send(());
            }
            let _ = self.release.lock().recv();
            PartitionSnapshot::new()
        }
    }

    struct FixedSource(u64);

    #[async_trait]
    impl PartitionTableSource for FixedSource {
        async fn fetch_latest(&self) -> anyhow::Result<PartitionTable> {
            Ok(PartitionTable::new(self.0, BTreeMap::new()))
        }
    }

    fn local_records() -> PartitionSnapshot {
        let mut snap = PartitionSnapshot::new();
        snap.entry("A".to_string())
            .or_default()
            .insert("id1".to_string(), EndpointRecord::new("A", "id1", 2, Vec::<u8>::new()));
        snap
    }

    fn handler_with(store: Arc<dyn RecordStore>, workers: usize, queue: usize) -> DiffSyncHandler {
        let tracker = Arc::new(PartitionTableTracker::with_table(
            Arc::new(FixedSource(8)),
            PartitionTable::new(5, BTreeMap::new()),
        ));
        let pool = Arc::new(WorkerPool::new(
            "diff-sync",
            WorkerPoolConfig { workers, queue },
        ));
        DiffSyncHandler::new(store, tracker, pool, 100, ShutdownController::new())
    }

    fn handler() -> DiffSyncHandler {
        handler_with(Arc::new(FixedStore(local_records())), 2, 4)
    }

    fn request(partition_id: i64, caller_epoch: u64) -> DiffSyncRequest {
        let mut summary = DigestSummary::new();
        summary.insert("A", "id1", 1);
        summary.insert("B", "id2", 1);
        DiffSyncRequest {
            partition_id,
            summary,
            caller_epoch,
        }
    }

    #[tokio::test]
    async fn test_success_carries_diff_and_epoch() {
        let handler = handler();

        match handler.handle_request(request(1, 5)).await {
            DiffSyncResponse::Succeeded { diff, epoch } => {
                assert_eq!(epoch, 5);
                assert_eq!(diff.epoch, 5);
                let updated = EndpointRecord::new("A", "id1", 2, Vec::<u8>::new());
                assert_eq!(diff.updated, vec![updated]);
                assert_eq!(diff.removed, vec![EndpointRef::new("B", "id2")]);
                assert!(diff.added.is_empty());
            }
            other => panic!("unexpected response {:?}", other),
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn test_negative_partition_is_client_error() {
        let handler = handler();

        match handler.handle_request(request(-1, 5)).await {
            DiffSyncResponse::Failed { class, message } => {
                assert_eq!(class, ErrorClass::Client);
                assert!(message.contains("-1"));
            }
            other => panic!("unexpected response {:?}", other),
        }
        assert!(logs_contain("rejecting diff-sync request"));
    }

    #[tokio::test]
    async fn test_invalid_partition_skips_epoch_observation() {
        let handler = handler();
        let _ = handler.handle_request(request(-3, 99)).await;

        assert_eq!(handler.tracker.refresh_count(), 0);
        assert_eq!(handler.tracker.highest_observed(), 5);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_computation_failure_is_server_error() {
        let handler = handler_with(Arc::new(PanickingStore), 1, 0);

        match handler.handle_request(request(4, 5)).await {
            DiffSyncResponse::Failed { class, message } => {
                assert_eq!(class, ErrorClass::Server);
                assert!(message.contains("partition 4"));
                assert!(message.contains("storage corrupted"));
            }
            other => panic!("unexpected response {:?}", other),
        }
        assert!(logs_contain("diff-sync request error for partition=4"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[traced_test]
    async fn test_saturated_pool_is_backpressure() {
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let store = Arc::new(BlockingStore {
            started: parking_lot::Mutex::new(Some(started_tx)),
            release: parking_lot::Mutex::new(release_rx),
        });
        let handler = Arc::new(handler_with(store, 1, 0));

        let busy = {
            let handler = handler.clone();
            tokio::spawn(async move { handler.handle_request(request(1, 5)).await })
        };
        started_rx.await.unwrap();

        match handler.handle_request(request(2, 5)).await {
            DiffSyncResponse::Failed { class, .. } => assert_eq!(class, ErrorClass::Backpressure),
            other => panic!("unexpected response {:?}", other),
        }
        assert!(logs_contain("pool saturated"));

        release_tx.send(()).unwrap();
        assert!(busy.await.unwrap().is_success());
    }

    #[tokio::test]
    async fn test_newer_caller_epoch_schedules_refresh() {
        let handler = handler();

        let response = handler.handle_request(request(1, 8)).await;
        assert!(response.is_success());
        assert_eq!(handler.tracker.refresh_count(), 1);

        for _ in 0..100 {
            if handler.tracker.current_epoch() == 8 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(handler.tracker.current_epoch(), 8);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_with_backpressure() {
        let handler = handler();
        handler.shutdown.shutdown();

        match handler.handle_request(request(1, 5)).await {
            DiffSyncResponse::Failed { class, .. } => assert_eq!(class, ErrorClass::Backpressure),
            other => panic!("unexpected response {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_message_handler_routes_request() {
        let handler = handler();
        let from: SocketAddr = "10.0.0.9:9600".parse().unwrap();
        let msg = Message::DiffSyncRequest(request(2, 5));

        assert!(handler.interest(&msg));
        assert_eq!(handler.handler_type(), HandlerType::Processor);

        let reply = handler.handle(from, msg).await.unwrap();
        match reply {
            Some(Message::DiffSyncResponse(DiffSyncResponse::Succeeded { diff, .. })) => {
                // Partition 2 is empty locally, so everything the peer has is stale
                assert_eq!(diff.removed.len(), 2);
            }
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn test_error_classes() {
        assert_eq!(
            DiffSyncError::InvalidPartition(InvalidPartitionId(-1)).class(),
            ErrorClass::Client
        );
        assert_eq!(
            DiffSyncError::Computation {
                partition: PartitionId::new(1),
                cause: "x".to_string()
            }
            .class(),
            ErrorClass::Server
        );
        assert_eq!(DiffSyncError::Backpressure.class(), ErrorClass::Backpressure);
    }

    #[tokio::test]
    async fn test_slot_table_change_handler_observes_epoch() {
        let tracker = Arc::new(PartitionTableTracker::new(Arc::new(FixedSource(3))));
        let handler = SlotTableChangeHandler::new(tracker.clone());
        let event = crate::replication::types::SlotTableChangeEvent { epoch: 3 };
        let msg = Message::SlotTableChange(event);

        assert!(handler.interest(&msg));
        assert_eq!(handler.handler_type(), HandlerType::Listener);

        let reply = handler.handle("10.0.0.1:9610".parse().unwrap(), msg).await.unwrap();
        assert_eq!(reply, Some(Message::Common(CommonResponse::success())));
        assert_eq!(tracker.refresh_count(), 1);
    }
}
