//! Cluster Notifier
//!
//! Meta-side entry point for pushing cluster events to a role. Partition
//! table changes only go out from a stable leader.

use crate::domain::entities::PartitionTable;
use crate::domain::ports::LeadershipOracle;
use crate::replication::broadcast::Broadcaster;
use crate::replication::types::{ConfigChangeEvent, Message, SlotTableChangeEvent};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// Pushes cluster events to the members of one role.
pub struct ClusterNotifier {
    broadcaster: Arc<Broadcaster>,
    leadership: Arc<dyn LeadershipOracle>,
}

impl ClusterNotifier {
    pub fn new(broadcaster: Arc<Broadcaster>, leadership: Arc<dyn LeadershipOracle>) -> Self {
        Self {
            broadcaster,
            leadership,
        }
    }

    /// Tell the role the partition table moved to `table.epoch`.
    ///
    /// Skipped unless this node is a stable leader. Returns the number of
    /// dispatches.
    pub fn notify_slot_table_change(&self, table: &PartitionTable) -> usize {
        if !self.leadership.is_stable_leader() {
            tracing::info!(
                "not a stable leader, skipping slot table change epoch={} to {} nodes",
                table.epoch,
                self.broadcaster.role()
            );
            return 0;
        }
        self.broadcaster
            .notify(&Message::from(SlotTableChangeEvent { epoch: table.epoch }))
    }

    /// Tell the role a shared configuration entry changed.
    ///
    /// Sent regardless of leadership state; followers tolerate duplicates.
    pub fn notify_config_change(&self, event: ConfigChangeEvent) -> usize {
        tracing::debug!(
            "config change data_id={} version={} to {} nodes",
            event.data_id,
            event.version,
            self.broadcaster.role()
        );
        self.broadcaster.notify(&Message::from(event))
    }

    /// Invoke `request` on every member and collect typed replies.
    pub async fn broadcast_invoke<R>(
        &self,
        request: &Message,
        timeout: Duration,
    ) -> HashMap<IpAddr, R>
    where
        R: TryFrom<Message, Error = Message> + Send + 'static,
    {
        self.broadcaster.invoke(request, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{ConnectionRegistry, PartitionMembership};
    use crate::domain::value_objects::NodeRole;
    use crate::replication::broadcast::RoleCapabilities;
    use crate::replication::transport::{ExchangeError, NodeExchanger, OutboundRequest};
    use crate::replication::types::{CommonResponse, Envelope};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tracing_test::traced_test;

    struct Toggle(AtomicBool);

    impl LeadershipOracle for Toggle {
        fn is_stable_leader(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    struct Peers(Vec<SocketAddr>);

    impl ConnectionRegistry for Peers {
        fn live_connections(&self) -> Vec<SocketAddr> {
            self.0.clone()
        }
    }

    impl PartitionMembership for Peers {
        fn registered_node_addresses(&self) -> Vec<IpAddr> {
            self.0.iter().map(|a| a.ip()).collect()
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Message>>);

    #[async_trait]
    impl NodeExchanger for Recorder {
        async fn request(
            &self,
            request: OutboundRequest,
        ) -> Result<Option<Envelope>, ExchangeError> {
            self.0.lock().push(request.envelope.open()?);
            Ok(Some(Envelope::seal(&Message::Common(CommonResponse::success()))?))
        }
    }

    fn notifier(leader: bool) -> (ClusterNotifier, Arc<Recorder>, Arc<Toggle>) {
        let recorder = Arc::new(Recorder::default());
        let peers = Arc::new(Peers(vec![
            "10.0.1.1:9600".parse().unwrap(),
            "10.0.1.2:9600".parse().unwrap(),
        ]));
        let caps = RoleCapabilities {
            exchanger: recorder.clone(),
            nodes: peers.clone(),
            connections: peers,
        };
        let broadcaster = Arc::new(Broadcaster::new(NodeRole::Data, caps, 2, 3));
        let toggle = Arc::new(Toggle(AtomicBool::new(leader)));
        (ClusterNotifier::new(broadcaster, toggle.clone()), recorder, toggle)
    }

    async fn wait_for(recorder: &Recorder, n: usize) {
        for _ in 0..200 {
            if recorder.0.lock().len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {} messages", n);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_slot_table_change_gated_on_leadership() {
        let (notifier, recorder, toggle) = notifier(false);
        let table = PartitionTable::new(12, BTreeMap::new());

        assert_eq!(notifier.notify_slot_table_change(&table), 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(recorder.0.lock().is_empty());
        assert!(logs_contain("skipping slot table change epoch=12"));

        toggle.0.store(true, Ordering::SeqCst);
        assert_eq!(notifier.notify_slot_table_change(&table), 2);
        wait_for(&recorder, 2).await;
        assert!(recorder
            .0
            .lock()
            .iter()
            .all(|m| *m == Message::SlotTableChange(SlotTableChangeEvent { epoch: 12 })));
    }

    #[tokio::test]
    async fn test_config_change_is_not_gated() {
        let (notifier, recorder, _) = notifier(false);
        let event = ConfigChangeEvent {
            data_id: "blacklist".to_string(),
            version: 3,
        };

        assert_eq!(notifier.notify_config_change(event.clone()), 2);
        wait_for(&recorder, 2).await;
        assert_eq!(recorder.0.lock()[0], Message::ConfigChange(event));
    }

    #[tokio::test]
    async fn test_broadcast_invoke_passes_through() {
        let (notifier, _, _) = notifier(false);
        let request = Message::ConfigChange(ConfigChangeEvent {
            data_id: "switch".to_string(),
            version: 1,
        });

        let replies: HashMap<IpAddr, CommonResponse> =
            notifier.broadcast_invoke(&request, Duration::from_secs(1)).await;
        assert_eq!(replies.len(), 2);
    }
}
