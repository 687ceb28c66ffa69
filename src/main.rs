//! slot-registry - Partitioned service registry replication core
//!
//! This is the composition root that wires together all the components.
//! It runs a standalone cluster in one process: a meta leader, data
//! authorities owning partitions, and session followers pulling them.

use slot_registry::adapters::inbound::ClientAdminHandler;
use slot_registry::adapters::outbound::{
    DashMapClientConnections, DashMapConnectionRegistry, DashMapNodeRegistry, DashMapRecordStore,
    InProcessNetwork, LeaseLeadership, MemoryPartitionTable,
};
use slot_registry::application::ZoneAdminService;
use slot_registry::config::{load_config, Config};
use slot_registry::domain::entities::EndpointRecord;
use slot_registry::domain::value_objects::NodeRole;
use slot_registry::infrastructure::{shutdown_signal, ShutdownController};
use slot_registry::replication::{Broadcaster, ClusterNotifier, ReplicationAgent, RoleCapabilities};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

const DATA_PORT: u16 = 9601;
const SESSION_PORT: u16 = 9602;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment
    let cfg = load_config()?;

    // Setup logging
    let log_level = if cfg.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt().with_max_level(log_level).init();

    tracing::info!(
        "starting slot-registry node_id={} role={} addr={} partitions={}",
        cfg.node_id,
        cfg.role,
        cfg.local_addr,
        cfg.partitions
    );

    // ===== COMPOSITION ROOT =====

    // Settings of the meta node itself; every agent validates its own copy
    let replication = cfg.replication();
    replication.validate()?;

    let shutdown = ShutdownController::new();
    let network = InProcessNetwork::new();

    let data_addrs = member_addrs(10, cfg.data_nodes, DATA_PORT);
    let session_addrs = member_addrs(20, cfg.session_nodes, SESSION_PORT);

    // 1. Authoritative partition table on the meta node
    let table = Arc::new(MemoryPartitionTable::round_robin(1, cfg.partitions, &data_addrs));

    // 2. Data authorities
    let mut agents = Vec::new();
    for (i, addr) in data_addrs.iter().enumerate() {
        let node_id = format!("data-{}", i + 1);
        let agent = role_agent(&cfg, NodeRole::Data, node_id, *addr, &table, &shutdown)?;
        network.register(*addr, Arc::new(agent.diff_sync_handler()));
        network.register(*addr, Arc::new(agent.slot_table_handler()));
        agent.tracker().install_table(table.snapshot());
        seed_records(&agent, *addr, &table);
        agents.push(agent);
    }

    // 3. Session followers
    let mut admin_services = Vec::new();
    let session_connections = Arc::new(DashMapConnectionRegistry::new());
    let session_nodes = Arc::new(DashMapNodeRegistry::new(NodeRole::Session));
    for addr in &session_addrs {
        session_connections.connect(*addr);
        session_nodes.register(addr.ip());
    }

    for (i, addr) in session_addrs.iter().enumerate() {
        let node_id = format!("session-{}", i + 1);
        let agent = role_agent(&cfg, NodeRole::Session, node_id, *addr, &table, &shutdown)?;
        let clients = Arc::new(DashMapClientConnections::new());
        network.register(*addr, Arc::new(agent.slot_table_handler()));
        network.register(*addr, Arc::new(ClientAdminHandler::new(clients.clone())));

        let peers = Arc::new(Broadcaster::from_config(
            NodeRole::Session,
            RoleCapabilities {
                exchanger: Arc::new(network.exchanger(*addr)),
                nodes: session_nodes.clone(),
                connections: session_connections.clone(),
            },
            agent.config(),
        ));
        admin_services.push(ZoneAdminService::from_config(clients, peers, agent.config()));

        agent.start_follower(Arc::new(network.exchanger(*addr)));
        agents.push(agent);
    }

    // 4. Meta leader and its notifiers
    let leadership = Arc::new(LeaseLeadership::new(replication.leader_grace));
    leadership.become_leader();

    let meta_exchanger = Arc::new(network.exchanger(cfg.local_addr));
    let data_connections = Arc::new(DashMapConnectionRegistry::new());
    let data_nodes = Arc::new(DashMapNodeRegistry::new(NodeRole::Data));
    for addr in &data_addrs {
        data_connections.connect(*addr);
        data_nodes.register(addr.ip());
    }

    let notifiers = [
        ClusterNotifier::new(
            Arc::new(Broadcaster::from_config(
                NodeRole::Data,
                RoleCapabilities {
                    exchanger: meta_exchanger.clone(),
                    nodes: data_nodes,
                    connections: data_connections,
                },
                &replication,
            )),
            leadership.clone(),
        ),
        ClusterNotifier::new(
            Arc::new(Broadcaster::from_config(
                NodeRole::Session,
                RoleCapabilities {
                    exchanger: meta_exchanger,
                    nodes: session_nodes,
                    connections: session_connections,
                },
                &replication,
            )),
            leadership.clone(),
        ),
    ];

    // Push the table once the leader is stable, and again on every epoch change
    let announcer = {
        let table = table.clone();
        let shutdown = shutdown.clone();
        let interval = replication.sync_interval;
        tokio::spawn(async move {
            let mut announced = 0;
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown.stopped() => break,
                    _ = ticker.tick() => {
                        let snapshot = table.snapshot();
                        if snapshot.epoch <= announced {
                            continue;
                        }
                        let sent: usize = notifiers
                            .iter()
                            .map(|n| n.notify_slot_table_change(&snapshot))
                            .sum();
                        if sent > 0 {
                            announced = snapshot.epoch;
                        }
                    }
                }
            }
        })
    };

    tracing::info!(
        "cluster up: {} data nodes, {} session nodes, {} zone admin services",
        data_addrs.len(),
        session_addrs.len(),
        admin_services.len()
    );

    // ===== RUN UNTIL SIGNAL =====
    shutdown_signal(shutdown.clone()).await;

    let drain = Duration::from_secs(cfg.drain_timeout_secs);
    for agent in &agents {
        if !agent.stop(drain).await {
            tracing::warn!("node {} did not drain in time", agent.node_id());
        }
    }
    if let Err(e) = announcer.await {
        tracing::warn!("announcer ended abnormally: {}", e);
    }

    tracing::info!("shutdown complete");
    Ok(())
}

/// Addresses `127.0.0.{base+1}..` for `count` members of one role.
fn member_addrs(base: u8, count: usize, port: u16) -> Vec<SocketAddr> {
    (1..=count)
        .filter_map(|i| u8::try_from(i).ok())
        .map(|i| {
            let ip = Ipv4Addr::new(127, 0, 0, base.saturating_add(i));
            SocketAddr::new(IpAddr::V4(ip), port)
        })
        .collect()
}

fn role_agent(
    cfg: &Config,
    role: NodeRole,
    node_id: String,
    addr: SocketAddr,
    table: &Arc<MemoryPartitionTable>,
    shutdown: &ShutdownController,
) -> anyhow::Result<ReplicationAgent> {
    let mut config = cfg.replication().role(role).local_addr(addr);
    config.node_id = node_id;
    ReplicationAgent::new(
        config,
        Arc::new(DashMapRecordStore::new()),
        table.clone(),
        shutdown.clone(),
    )
}

/// Give each authority a few endpoints per owned partition so followers
/// have something to pull.
fn seed_records(agent: &ReplicationAgent, addr: SocketAddr, table: &MemoryPartitionTable) {
    for partition in table.snapshot().owned_by(addr) {
        for n in 0..3 {
            let record = EndpointRecord::new(
                format!("svc-{}", partition),
                format!("{}-{}", addr.ip(), n),
                1,
                format!("{}:{}", addr.ip(), 8000 + n).into_bytes(),
            );
            agent.store().upsert(partition, record);
        }
    }
}
