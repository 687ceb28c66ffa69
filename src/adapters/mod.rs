//! Adapters Layer
//!
//! Implementations of the domain ports (outbound) and of the message
//! handlers peers call into (inbound).

pub mod inbound;
pub mod outbound;
