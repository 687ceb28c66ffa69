use crate::domain::value_objects::NodeRole;
use crate::replication::ReplicationConfig;
use anyhow::Context;
use serde::Deserialize;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    // Node identity
    pub node_id: String,
    pub role: NodeRole,
    pub local_addr: SocketAddr,
    pub debug: bool,

    // Cluster shape for the standalone runtime
    pub partitions: u32,
    pub data_nodes: usize,
    pub session_nodes: usize,

    // Diff-sync settings
    pub max_batch: usize,
    pub diff_workers: usize,
    pub diff_queue: usize,
    pub sync_interval_ms: u64,
    pub max_sync_rounds: usize,

    // Broadcast settings
    pub dispatch_pool_size: Option<usize>,
    pub retry_times: u32,
    pub invoke_timeout_ms: u64,
    pub leader_grace_secs: u64,

    // Lifecycle
    pub drain_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: "registry-1".to_string(),
            role: NodeRole::Meta,
            local_addr: SocketAddr::from(([127, 0, 0, 1], 9600)),
            debug: false,
            partitions: 16,
            data_nodes: 2,
            session_nodes: 2,
            max_batch: 512,
            diff_workers: 8,
            diff_queue: 1000,
            sync_interval_ms: 5000,
            max_sync_rounds: 8,
            dispatch_pool_size: None,
            retry_times: 3,
            invoke_timeout_ms: 3000,
            leader_grace_secs: 30,
            drain_timeout_secs: 10,
        }
    }
}

impl Config {
    /// Replication settings for this node.
    pub fn replication(&self) -> ReplicationConfig {
        let mut config = ReplicationConfig::new(self.node_id.clone())
            .role(self.role)
            .local_addr(self.local_addr)
            .max_batch(self.max_batch)
            .diff_pool(self.diff_workers, self.diff_queue)
            .retry_times(self.retry_times)
            .invoke_timeout(Duration::from_millis(self.invoke_timeout_ms))
            .leader_grace(Duration::from_secs(self.leader_grace_secs))
            .sync_interval(Duration::from_millis(self.sync_interval_ms))
            .max_sync_rounds(self.max_sync_rounds);
        if let Some(size) = self.dispatch_pool_size {
            config = config.dispatch_pool_size(size);
        }
        config
    }
}

/// Read `key` and parse it, falling back to `default` when unset or invalid.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub fn parse_role(value: &str) -> anyhow::Result<NodeRole> {
    NodeRole::parse(value)
        .with_context(|| format!("unknown role {:?}, expected data|meta|session", value))
}

pub fn load_config() -> anyhow::Result<Config> {
    let defaults = Config::default();

    let node_id = std::env::var("REGISTRY_NODE_ID").unwrap_or(defaults.node_id);

    let role = match std::env::var("REGISTRY_ROLE") {
        Ok(v) => parse_role(&v)?,
        Err(_) => defaults.role,
    };

    let local_addr = match std::env::var("REGISTRY_LOCAL_ADDR") {
        Ok(v) => v
            .parse()
            .with_context(|| format!("invalid REGISTRY_LOCAL_ADDR {:?}", v))?,
        Err(_) => defaults.local_addr,
    };

    let debug = std::env::var("DEBUG").is_ok();

    let partitions = env_or("REGISTRY_PARTITIONS", defaults.partitions);
    let data_nodes = env_or("REGISTRY_DATA_NODES", defaults.data_nodes);
    let session_nodes = env_or("REGISTRY_SESSION_NODES", defaults.session_nodes);

    // Diff-sync settings
    let max_batch = env_or("REGISTRY_MAX_BATCH", defaults.max_batch);
    let diff_workers = env_or("REGISTRY_DIFF_WORKERS", defaults.diff_workers);
    let diff_queue = env_or("REGISTRY_DIFF_QUEUE", defaults.diff_queue);
    let sync_interval_ms = env_or("REGISTRY_SYNC_INTERVAL_MS", defaults.sync_interval_ms);
    let max_sync_rounds = env_or("REGISTRY_MAX_SYNC_ROUNDS", defaults.max_sync_rounds);

    // Broadcast settings
    let dispatch_pool_size = std::env::var("REGISTRY_DISPATCH_POOL_SIZE")
        .ok()
        .and_then(|v| v.parse().ok());
    let retry_times = env_or("REGISTRY_RETRY_TIMES", defaults.retry_times);
    let invoke_timeout_ms = env_or("REGISTRY_INVOKE_TIMEOUT_MS", defaults.invoke_timeout_ms);
    let leader_grace_secs = env_or("REGISTRY_LEADER_GRACE_SECS", defaults.leader_grace_secs);

    let drain_timeout_secs = env_or("REGISTRY_DRAIN_TIMEOUT_SECS", defaults.drain_timeout_secs);

    Ok(Config {
        node_id,
        role,
        local_addr,
        debug,
        partitions,
        data_nodes,
        session_nodes,
        max_batch,
        diff_workers,
        diff_queue,
        sync_interval_ms,
        max_sync_rounds,
        dispatch_pool_size,
        retry_times,
        invoke_timeout_ms,
        leader_grace_secs,
        drain_timeout_secs,
    })
}
