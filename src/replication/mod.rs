//! Replication Module
//!
//! Keeps partitioned endpoint records consistent across registry roles and
//! pushes cluster events from the coordinator.
//!
//! ## Architecture
//!
//! - **Diff-sync**: followers send a digest of a partition, the authority
//!   answers with a bounded add/update/remove diff
//! - **Epoch tracking**: every exchange carries the partition table epoch;
//!   a node that learns it is behind refreshes in the background
//! - **Broadcast**: leader-gated notify and deadline-bounded invoke to every
//!   registered, connected member of a role
//! - **Agent**: owns the per-role state and lifecycle
//!
//! ## How It Works
//!
//! 1. A follower builds a digest of what it holds for a partition
//! 2. The partition owner diffs it against its own records on a bounded pool
//! 3. The follower applies the result and asks again while it is truncated
//! 4. The meta leader pushes partition table changes so followers re-route
//!
//! Transport is behind [`NodeExchanger`]; wire frames use the Sans-IO codec in
//! [`transport`].

mod agent;
mod broadcast;
mod config;
mod epoch;
mod handler;
mod notifier;
mod sync;
pub mod transport;
pub mod types;

pub use agent::ReplicationAgent;
pub use broadcast::{Broadcaster, RoleCapabilities};
pub use config::{ConfigError, ReplicationConfig};
pub use epoch::PartitionTableTracker;
pub use handler::{DiffSyncError, DiffSyncHandler, SlotTableChangeHandler};
pub use notifier::ClusterNotifier;
pub use sync::{DiffSyncClient, SyncError, SyncOutcome};
pub use transport::{
    decode_frame, encode_frame, ExchangeError, HandlerType, MessageHandler, NodeExchanger,
    OutboundRequest,
};
pub use types::{
    ClientOffRequest, ClientOnRequest, CodecError, CommonResponse, ConfigChangeEvent,
    DiffSyncRequest, DiffSyncResponse, Envelope, ErrorClass, Message, NodeId,
    SlotTableChangeEvent,
};
