//! Value Objects - Immutable domain primitives
//!
//! Value objects are identified by their value rather than identity.
//! They are immutable and can be freely shared.

use serde::{Deserialize, Serialize};

/// Identifier of a partition (slot) of the registry key space.
///
/// Partition ids are non-negative. Peers send them as signed integers on the
/// wire, so construction from `i64` is fallible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionId(u32);

impl PartitionId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl TryFrom<i64> for PartitionId {
    type Error = InvalidPartitionId;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        u32::try_from(raw).map(Self).map_err(|_| InvalidPartitionId(raw))
    }
}

impl From<PartitionId> for i64 {
    fn from(id: PartitionId) -> Self {
        i64::from(id.0)
    }
}

impl std::fmt::Display for PartitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A partition id that is negative or out of range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("partition id {0} out of range 0..={max}", max = u32::MAX)]
pub struct InvalidPartitionId(pub i64);

/// Server role a cluster member plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRole {
    /// Holds partitioned endpoint records
    Data,
    /// Coordinator: partition table owner and leader election
    Meta,
    /// Client-facing gateway
    Session,
}

impl NodeRole {
    /// Parse a role from a string, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "data" => Some(Self::Data),
            "meta" => Some(Self::Meta),
            "session" => Some(Self::Session),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Meta => "meta",
            Self::Session => "session",
        }
    }
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
