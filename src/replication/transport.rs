//! Transport Seams
//!
//! The replication core does not own sockets. It talks to peers through a
//! [`NodeExchanger`] and receives requests through [`MessageHandler`]s that an
//! exchanger routes to.
//!
//! Uses Sans-IO pattern: frame encoding/decoding is separated from I/O for testability.

use crate::replication::types::{CodecError, Envelope, Message};
use async_trait::async_trait;
use std::net::SocketAddr;

/// Largest frame accepted by [`decode_frame`].
pub const MAX_FRAME_LEN: usize = 10 * 1024 * 1024;

// ==================== Sans-IO Functions ====================

/// Encode a message for transport (Sans-IO pattern).
/// Returns length-prefixed binary data ready for sending.
pub fn encode_frame(msg: &Message) -> Result<Vec<u8>, CodecError> {
    let envelope = Envelope::seal(msg)?;
    let data = bincode::serialize(&envelope).map_err(|e| CodecError::Encode(e.to_string()))?;
    if data.len() > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge(data.len()));
    }
    let len = data.len() as u32;

    let mut result = Vec::with_capacity(4 + data.len());
    result.extend_from_slice(&len.to_be_bytes());
    result.extend_from_slice(&data);

    Ok(result)
}

/// Decode a length from the first 4 bytes.
pub fn decode_length(buf: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*buf)
}

/// Decode a message from a length-prefixed frame (Sans-IO pattern).
pub fn decode_frame(frame: &[u8]) -> Result<Message, CodecError> {
    let Some((len_bytes, data)) = frame.split_first_chunk::<4>() else {
        return Err(CodecError::Decode("frame shorter than length prefix".to_string()));
    };
    let len = decode_length(len_bytes) as usize;
    if len > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge(len));
    }
    if data.len() != len {
        return Err(CodecError::Decode(format!(
            "length prefix {} does not match payload {}",
            len,
            data.len()
        )));
    }
    let envelope: Envelope =
        bincode::deserialize(data).map_err(|e| CodecError::Decode(e.to_string()))?;
    envelope.open()
}

/// An outbound request to one peer.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub target: SocketAddr,
    pub envelope: Envelope,
    /// Retry budget hint. Enforcement, if any, belongs to the exchanger.
    pub retry_times: u32,
}

impl OutboundRequest {
    pub fn new(target: SocketAddr, msg: &Message, retry_times: u32) -> Result<Self, CodecError> {
        Ok(Self {
            target,
            envelope: Envelope::seal(msg)?,
            retry_times,
        })
    }
}

/// Errors from an exchanger.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExchangeError {
    #[error("peer {0} unreachable")]
    Unreachable(SocketAddr),
    #[error("request to {0} timed out")]
    Timeout(SocketAddr),
    #[error("peer {addr} failed the request: {reason}")]
    Remote { addr: SocketAddr, reason: String },
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Request/response transport to peer nodes.
#[async_trait]
pub trait NodeExchanger: Send + Sync {
    /// Send `request` and wait for the peer's reply. `Ok(None)` means the peer
    /// accepted the request without replying.
    async fn request(&self, request: OutboundRequest) -> Result<Option<Envelope>, ExchangeError>;
}

/// How an inbound handler is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerType {
    /// Cheap work, run inline on the I/O path
    Listener,
    /// Heavy work, run on a dedicated pool
    Processor,
}

/// Inbound request handler an exchanger routes messages to.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Whether this handler serves `msg`.
    fn interest(&self, msg: &Message) -> bool;

    fn handler_type(&self) -> HandlerType {
        HandlerType::Listener
    }

    /// Serve `msg` received from `from`.
    async fn handle(&self, from: SocketAddr, msg: Message) -> anyhow::Result<Option<Message>>;
}
