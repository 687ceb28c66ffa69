//! Replication Configuration
//!
//! Configuration for diff-sync and cluster broadcast of one role instance.

use crate::domain::value_objects::NodeRole;
use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for the replication services of one process.
#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    /// Unique identifier for this node (e.g., "data-1")
    pub node_id: String,

    /// Role this process plays
    pub role: NodeRole,

    /// Address peers reach this node at (default: 127.0.0.1:9600)
    pub local_addr: SocketAddr,

    /// Maximum add + update + remove entries per diff-sync result (default: 512)
    pub max_batch: usize,

    /// Diff-sync worker threads (default: 8)
    pub diff_workers: usize,

    /// Diff-sync requests allowed to wait for a worker (default: 1000)
    pub diff_queue: usize,

    /// Concurrent broadcast dispatches per role (default: min(4, cpus))
    pub dispatch_pool_size: usize,

    /// Retry hint attached to every broadcast request (default: 3)
    pub retry_times: u32,

    /// Deadline for invoke-mode broadcasts (default: 3s)
    pub invoke_timeout: Duration,

    /// Time a new leader waits before it counts as stable (default: 30s)
    pub leader_grace: Duration,

    /// Interval between follower diff-sync passes (default: 5s)
    pub sync_interval: Duration,

    /// Truncated results re-requested per partition per pass (default: 8)
    pub max_sync_rounds: usize,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            node_id: String::new(),
            role: NodeRole::Data,
            local_addr: SocketAddr::from(([127, 0, 0, 1], 9600)),
            max_batch: 512,
            diff_workers: 8,
            diff_queue: 1000,
            dispatch_pool_size: cpus.min(4),
            retry_times: 3,
            invoke_timeout: Duration::from_millis(3000),
            leader_grace: Duration::from_secs(30),
            sync_interval: Duration::from_secs(5),
            max_sync_rounds: 8,
        }
    }
}

impl ReplicationConfig {
    /// Create a new configuration with node ID.
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            ..Default::default()
        }
    }

    /// Set the role.
    pub fn role(mut self, role: NodeRole) -> Self {
        self.role = role;
        self
    }

    /// Set the local address.
    pub fn local_addr(mut self, addr: SocketAddr) -> Self {
        self.local_addr = addr;
        self
    }

    /// Set the diff-sync batch bound.
    pub fn max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch;
        self
    }

    /// Set the diff-sync pool shape.
    pub fn diff_pool(mut self, workers: usize, queue: usize) -> Self {
        self.diff_workers = workers;
        self.diff_queue = queue;
        self
    }

    /// Set the broadcast dispatch pool size.
    pub fn dispatch_pool_size(mut self, size: usize) -> Self {
        self.dispatch_pool_size = size;
        self
    }

    /// Set the retry hint for broadcast requests.
    pub fn retry_times(mut self, retry_times: u32) -> Self {
        self.retry_times = retry_times;
        self
    }

    /// Set the invoke-mode deadline.
    pub fn invoke_timeout(mut self, timeout: Duration) -> Self {
        self.invoke_timeout = timeout;
        self
    }

    /// Set the leader grace window.
    pub fn leader_grace(mut self, grace: Duration) -> Self {
        self.leader_grace = grace;
        self
    }

    /// Set the follower sync interval.
    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Set the truncated-result re-request bound.
    pub fn max_sync_rounds(mut self, rounds: usize) -> Self {
        self.max_sync_rounds = rounds;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_id.is_empty() {
            return Err(ConfigError::MissingNodeId);
        }
        if self.max_batch == 0 {
            return Err(ConfigError::InvalidMaxBatch);
        }
        if self.diff_workers == 0 {
            return Err(ConfigError::InvalidPoolSize("diff_workers"));
        }
        if self.dispatch_pool_size == 0 {
            return Err(ConfigError::InvalidPoolSize("dispatch_pool_size"));
        }
        if self.max_sync_rounds == 0 {
            return Err(ConfigError::InvalidSyncRounds);
        }
        if self.sync_interval.is_zero() {
            return Err(ConfigError::InvalidSyncInterval);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("node_id is required")]
    MissingNodeId,
    #[error("max_batch must be greater than zero")]
    InvalidMaxBatch,
    #[error("{0} must be greater than zero")]
    InvalidPoolSize(&'static str),
    #[error("max_sync_rounds must be greater than zero")]
    InvalidSyncRounds,
    #[error("sync_interval must be greater than zero")]
    InvalidSyncInterval,
}
