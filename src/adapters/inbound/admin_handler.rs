//! Client Admin Handler
//!
//! Inbound side of zone client administration: applies ClientOff/ClientOn
//! requests from a peer session node to the local client table.

use crate::domain::ports::ClientConnections;
use crate::replication::transport::MessageHandler;
use crate::replication::types::{CommonResponse, Message};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;

/// Serves ClientOff and ClientOn requests.
pub struct ClientAdminHandler {
    connections: Arc<dyn ClientConnections>,
}

impl ClientAdminHandler {
    pub fn new(connections: Arc<dyn ClientConnections>) -> Self {
        Self { connections }
    }
}

#[async_trait]
impl MessageHandler for ClientAdminHandler {
    fn interest(&self, msg: &Message) -> bool {
        matches!(msg, Message::ClientOff(_) | Message::ClientOn(_))
    }

    async fn handle(&self, from: SocketAddr, msg: Message) -> anyhow::Result<Option<Message>> {
        let response = match msg {
            Message::ClientOff(req) if req.ips.is_empty() => CommonResponse::failed("ips is empty"),
            Message::ClientOn(req) if req.ips.is_empty() => CommonResponse::failed("ips is empty"),
            Message::ClientOff(req) => {
                let closed = self.connections.client_off(&req.ips);
                tracing::info!("client off {:?} from {}, closed={}", req.ips, from, closed);
                CommonResponse::success()
            }
            Message::ClientOn(req) => {
                let reopened = self.connections.client_on(&req.ips);
                tracing::info!("client on {:?} from {}, reopened={}", req.ips, from, reopened);
                CommonResponse::success()
            }
            other => anyhow::bail!("unexpected {} for client admin handler", other.type_name()),
        };
        Ok(Some(Message::Common(response)))
    }
}
