//! Lease Leadership
//!
//! Implements LeadershipOracle from an externally driven leader flag. A node
//! that just won the election is not stable until its grace window passes.

use crate::domain::ports::LeadershipOracle;
use parking_lot::RwLock;
use std::time::{Duration, Instant};

/// Leader state fed by the election component.
pub struct LeaseLeadership {
    /// When leadership was acquired, `None` while not leader
    elected_at: RwLock<Option<Instant>>,
    grace: Duration,
}

impl LeaseLeadership {
    pub fn new(grace: Duration) -> Self {
        Self {
            elected_at: RwLock::new(None),
            grace,
        }
    }

    /// Mark this node as leader. Already being leader keeps the original
    /// election time.
    pub fn become_leader(&self) {
        let mut elected_at = self.elected_at.write();
        if elected_at.is_none() {
            *elected_at = Some(Instant::now());
            tracing::info!("became leader, stable after {:?}", self.grace);
        }
    }

    /// Give up leadership.
    pub fn step_down(&self) {
        if self.elected_at.write().take().is_some() {
            tracing::info!("stepped down as leader");
        }
    }

    /// Whether this node holds leadership, stable or not.
    pub fn is_leader(&self) -> bool {
        self.elected_at.read().is_some()
    }
}

impl LeadershipOracle for LeaseLeadership {
    fn is_stable_leader(&self) -> bool {
        match *self.elected_at.read() {
            Some(at) => at.elapsed() >= self.grace,
            None => false,
        }
    }
}
