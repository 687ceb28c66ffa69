//! Replication Types
//!
//! Wire messages exchanged between registry roles, and the checksummed
//! envelope they travel in.

use crate::domain::entities::{DiffResult, DigestSummary};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Unique identifier for a node in the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Follower -> authority request to reconcile one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSyncRequest {
    /// Signed on the wire; negative ids are rejected by the handler
    pub partition_id: i64,
    /// What the follower currently holds for the partition
    pub summary: DigestSummary,
    /// Partition table epoch the follower believes in
    pub caller_epoch: u64,
}

/// Classification of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Bad request; retrying it unchanged will fail again
    Client,
    /// Unexpected failure on the serving side
    Server,
    /// The serving pool is saturated; retry later
    Backpressure,
}

/// Authority -> follower reply to a [`DiffSyncRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffSyncResponse {
    Succeeded { diff: DiffResult, epoch: u64 },
    Failed { class: ErrorClass, message: String },
}

impl DiffSyncResponse {
    pub fn failed(class: ErrorClass, message: impl Into<String>) -> Self {
        Self::Failed {
            class,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// The partition table changed; receivers refresh if they are behind `epoch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotTableChangeEvent {
    pub epoch: u64,
}

/// A shared configuration entry changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigChangeEvent {
    pub data_id: String,
    pub version: u64,
}

/// Stop serving the listed client IPs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientOffRequest {
    pub ips: Vec<IpAddr>,
}

/// Resume serving the listed client IPs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientOnRequest {
    pub ips: Vec<IpAddr>,
}

/// Generic success/failure reply used by administrative requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonResponse {
    pub success: bool,
    pub message: String,
}

impl CommonResponse {
    pub fn success() -> Self {
        Self {
            success: true,
            message: String::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Message types for peer communication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    DiffSyncRequest(DiffSyncRequest),
    DiffSyncResponse(DiffSyncResponse),
    SlotTableChange(SlotTableChangeEvent),
    ConfigChange(ConfigChangeEvent),
    ClientOff(ClientOffRequest),
    ClientOn(ClientOnRequest),
    Common(CommonResponse),
}

impl Message {
    /// Message type as a string, for logs.
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::DiffSyncRequest(_) => "DiffSyncRequest",
            Message::DiffSyncResponse(_) => "DiffSyncResponse",
            Message::SlotTableChange(_) => "SlotTableChange",
            Message::ConfigChange(_) => "ConfigChange",
            Message::ClientOff(_) => "ClientOff",
            Message::ClientOn(_) => "ClientOn",
            Message::Common(_) => "Common",
        }
    }
}

impl From<SlotTableChangeEvent> for Message {
    fn from(event: SlotTableChangeEvent) -> Self {
        Message::SlotTableChange(event)
    }
}

impl From<ConfigChangeEvent> for Message {
    fn from(event: ConfigChangeEvent) -> Self {
        Message::ConfigChange(event)
    }
}

impl From<DiffSyncRequest> for Message {
    fn from(request: DiffSyncRequest) -> Self {
        Message::DiffSyncRequest(request)
    }
}

impl TryFrom<Message> for DiffSyncResponse {
    type Error = Message;

    fn try_from(msg: Message) -> Result<Self, Self::Error> {
        match msg {
            Message::DiffSyncResponse(resp) => Ok(resp),
            other => Err(other),
        }
    }
}

impl TryFrom<Message> for CommonResponse {
    type Error = Message;

    fn try_from(msg: Message) -> Result<Self, Self::Error> {
        match msg {
            Message::Common(resp) => Ok(resp),
            other => Err(other),
        }
    }
}

/// Encoded message plus a CRC32 of its bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub body: Vec<u8>,
    pub checksum: u32,
}

impl Envelope {
    /// Encode `msg` and checksum the result.
    pub fn seal(msg: &Message) -> Result<Self, CodecError> {
        let body = bincode::serialize(msg).map_err(|e| CodecError::Encode(e.to_string()))?;
        let checksum = crc32fast::hash(&body);
        Ok(Self { body, checksum })
    }

    /// Verify the checksum.
    pub fn verify(&self) -> bool {
        self.checksum == crc32fast::hash(&self.body)
    }

    /// Verify and decode the carried message.
    pub fn open(&self) -> Result<Message, CodecError> {
        if !self.verify() {
            return Err(CodecError::Checksum);
        }
        bincode::deserialize(&self.body).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

/// Wire encoding errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("envelope checksum verification failed")]
    Checksum,
    #[error("failed to encode message: {0}")]
    Encode(String),
    #[error("failed to decode message: {0}")]
    Decode(String),
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),
}
