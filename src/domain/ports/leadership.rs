//! Leadership Oracle Port

/// Reports whether this process is the coordinating leader.
pub trait LeadershipOracle: Send + Sync {
    /// True only once leadership is confirmed and past any grace window.
    /// A transient or ambiguous state reports false.
    fn is_stable_leader(&self) -> bool;
}
