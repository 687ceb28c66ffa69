//! Zone Admin Service - Client connection administration
//!
//! Blocks or re-opens client IPs on this session node and, for the zone
//! variants, on every other session node in the zone.

use crate::domain::ports::ClientConnections;
use crate::replication::{Broadcaster, ReplicationConfig};
use crate::replication::types::{ClientOffRequest, ClientOnRequest, CommonResponse, Message};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// Deadline for zone-wide client administration.
pub const ZONE_TIMEOUT: Duration = Duration::from_millis(3000);

/// Client administration for one session node and its zone peers.
pub struct ZoneAdminService {
    connections: Arc<dyn ClientConnections>,
    /// Broadcaster over the session role
    peers: Arc<Broadcaster>,
    /// This node's address; excluded from zone fan-out
    local: IpAddr,
    timeout: Duration,
}

impl ZoneAdminService {
    /// Create a new zone admin service.
    pub fn new(
        connections: Arc<dyn ClientConnections>,
        peers: Arc<Broadcaster>,
        local: IpAddr,
    ) -> Self {
        Self {
            connections,
            peers,
            local,
            timeout: ZONE_TIMEOUT,
        }
    }

    /// Service for the node described by `config`, with its invoke timeout
    /// as the zone deadline.
    pub fn from_config(
        connections: Arc<dyn ClientConnections>,
        peers: Arc<Broadcaster>,
        config: &ReplicationConfig,
    ) -> Self {
        Self::new(connections, peers, config.local_addr.ip()).with_timeout(config.invoke_timeout)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Override the zone deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Block `ips` on this node only.
    pub fn client_off(&self, ips: &[IpAddr]) -> CommonResponse {
        if ips.is_empty() {
            return CommonResponse::failed("ips is empty");
        }
        let closed = self.connections.client_off(ips);
        tracing::info!("client off {:?}, closed={}", ips, closed);
        CommonResponse::success()
    }

    /// Re-open `ips` on this node only.
    pub fn client_on(&self, ips: &[IpAddr]) -> CommonResponse {
        if ips.is_empty() {
            return CommonResponse::failed("ips is empty");
        }
        let reopened = self.connections.client_on(ips);
        tracing::info!("client on {:?}, reopened={}", ips, reopened);
        CommonResponse::success()
    }

    /// Block `ips` on this node, then on every peer session node.
    ///
    /// Fails if any peer did not confirm within the deadline.
    pub async fn client_off_in_zone(&self, ips: Vec<IpAddr>) -> CommonResponse {
        let local = self.client_off(&ips);
        if !local.success {
            return local;
        }
        self.fan_out(Message::ClientOff(ClientOffRequest { ips })).await
    }

    /// Re-open `ips` on this node, then on every peer session node.
    ///
    /// Fails if any peer did not confirm within the deadline.
    pub async fn client_on_in_zone(&self, ips: Vec<IpAddr>) -> CommonResponse {
        let local = self.client_on(&ips);
        if !local.success {
            return local;
        }
        self.fan_out(Message::ClientOn(ClientOnRequest { ips })).await
    }

    async fn fan_out(&self, request: Message) -> CommonResponse {
        let targets: Vec<_> = self
            .peers
            .resolve_targets()
            .into_iter()
            .filter(|addr| addr.ip() != self.local)
            .collect();
        if targets.is_empty() {
            return CommonResponse::success();
        }

        let responses: HashMap<IpAddr, CommonResponse> =
            self.peers.invoke_on(&targets, &request, self.timeout).await;

        let mut failed: Vec<String> = Vec::new();
        for addr in &targets {
            match responses.get(&addr.ip()) {
                Some(resp) if resp.success => {}
                Some(resp) => failed.push(format!("{}: {}", addr.ip(), resp.message)),
                None => failed.push(format!("{}: no response", addr.ip())),
            }
        }

        if failed.is_empty() {
            CommonResponse::success()
        } else {
            tracing::error!(
                "{} in zone failed on {} of {} peers: {}",
                request.type_name(),
                failed.len(),
                targets.len(),
                failed.join(", ")
            );
            CommonResponse::failed(failed.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::outbound::{
        DashMapClientConnections, DashMapConnectionRegistry, DashMapNodeRegistry, InProcessNetwork,
    };
    use crate::adapters::inbound::ClientAdminHandler;
    use crate::domain::value_objects::NodeRole;
    use crate::replication::RoleCapabilities;
    use crate::replication::transport::MessageHandler;
    use async_trait::async_trait;
    use std::net::SocketAddr;

    /// Peer that never confirms.
    struct Refuse;

    #[async_trait]
    impl MessageHandler for Refuse {
        fn interest(&self, msg: &Message) -> bool {
            matches!(msg, Message::ClientOff(_) | Message::ClientOn(_))
        }

        async fn handle(
            &self,
            _from: SocketAddr,
            _msg: Message,
        ) -> anyhow::Result<Option<Message>> {
            Ok(Some(Message::Common(CommonResponse::failed("read only"))))
        }
    }

    struct Zone {
        network: Arc<InProcessNetwork>,
        service: ZoneAdminService,
        local: Arc<DashMapClientConnections>,
        peer: Arc<DashMapClientConnections>,
    }

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    fn zone(third_peer: Option<Arc<dyn MessageHandler>>) -> Zone {
        let network = InProcessNetwork::new();
        let connections = Arc::new(DashMapConnectionRegistry::new());
        let nodes = Arc::new(DashMapNodeRegistry::new(NodeRole::Session));

        let local_addr = addr("10.0.2.1:9603");
        let peer_addr = addr("10.0.2.2:9603");
        let peer = Arc::new(DashMapClientConnections::new());
        network.register(peer_addr, Arc::new(ClientAdminHandler::new(peer.clone())));

        let mut members = vec![local_addr, peer_addr];
        if let Some(handler) = third_peer {
            let third = addr("10.0.2.3:9603");
            network.register(third, handler);
            members.push(third);
        }
        for member in members {
            connections.connect(member);
            nodes.register(member.ip());
        }

        let caps = RoleCapabilities {
            exchanger: Arc::new(network.exchanger(local_addr)),
            nodes,
            connections,
        };
        let broadcaster = Arc::new(Broadcaster::new(NodeRole::Session, caps, 2, 3));
        let local = Arc::new(DashMapClientConnections::new());
        let service = ZoneAdminService::new(local.clone(), broadcaster, local_addr.ip())
            .with_timeout(Duration::from_millis(500));

        Zone {
            network,
            service,
            local,
            peer,
        }
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_from_config_uses_invoke_timeout() {
        let network = InProcessNetwork::new();
        let local_addr = addr("10.0.2.1:9603");
        let caps = RoleCapabilities {
            exchanger: Arc::new(network.exchanger(local_addr)),
            nodes: Arc::new(DashMapNodeRegistry::new(NodeRole::Session)),
            connections: Arc::new(DashMapConnectionRegistry::new()),
        };
        let config = ReplicationConfig::new("session-1")
            .local_addr(local_addr)
            .invoke_timeout(Duration::from_millis(50));
        let service = ZoneAdminService::from_config(
            Arc::new(DashMapClientConnections::new()),
            Arc::new(Broadcaster::from_config(NodeRole::Session, caps, &config)),
            &config,
        );

        assert_eq!(service.timeout(), Duration::from_millis(50));
        assert_eq!(service.local, local_addr.ip());
        let default = ZoneAdminService::new(
            Arc::new(DashMapClientConnections::new()),
            service.peers.clone(),
            local_addr.ip(),
        );
        assert_eq!(default.timeout(), ZONE_TIMEOUT);
    }

    #[tokio::test]
    async fn test_client_off_in_zone_applies_everywhere() {
        let z = zone(None);

        let resp = z.service.client_off_in_zone(vec![ip("192.168.1.5")]).await;

        assert!(resp.success, "{}", resp.message);
        assert!(z.local.is_blocked(&ip("192.168.1.5")));
        assert!(z.peer.is_blocked(&ip("192.168.1.5")));
    }

    #[tokio::test]
    async fn test_client_on_in_zone_reopens_everywhere() {
        let z = zone(None);
        z.service.client_off_in_zone(vec![ip("192.168.1.5")]).await;

        let resp = z.service.client_on_in_zone(vec![ip("192.168.1.5")]).await;

        assert!(resp.success);
        assert!(!z.local.is_blocked(&ip("192.168.1.5")));
        assert!(!z.peer.is_blocked(&ip("192.168.1.5")));
    }

    #[tokio::test]
    async fn test_empty_ips_rejected() {
        let z = zone(None);
        let resp = z.service.client_off_in_zone(Vec::new()).await;
        assert!(!resp.success);
        assert_eq!(resp.message, "ips is empty");
        assert!(!z.service.client_on(&[]).success);
    }

    #[tokio::test]
    async fn test_failed_peer_fails_zone_request() {
        let z = zone(Some(Arc::new(Refuse)));

        let resp = z.service.client_off_in_zone(vec![ip("192.168.1.5")]).await;

        assert!(!resp.success);
        assert!(resp.message.contains("10.0.2.3: read only"));
        // The local node and healthy peers are still applied
        assert!(z.local.is_blocked(&ip("192.168.1.5")));
        assert!(z.peer.is_blocked(&ip("192.168.1.5")));
    }

    #[tokio::test]
    async fn test_unreachable_peer_counts_as_missing() {
        let z = zone(Some(Arc::new(Refuse)));
        z.network.unregister(&addr("10.0.2.3:9603"));

        let resp = z.service.client_on_in_zone(vec![ip("192.168.1.6")]).await;

        assert!(!resp.success);
        assert!(resp.message.contains("10.0.2.3: no response"));
    }
}
