//! DISCOVER/REQUEST handling.
//!
//! The handler keeps no per-exchange state. Each request is classified on
//! its own: DISCOVER becomes an OFFER, REQUEST becomes an ACK, and anything
//! else is dropped. Both replies go through the idempotent
//! [`Allocator::allocate`], which is what makes the ACK carry the address the
//! earlier OFFER promised.

use std::net::Ipv4Addr;
use std::sync::Arc;

use tracing::{debug, info};

use crate::allocator::Allocator;
use crate::config::{Config, ExhaustionPolicy};
use crate::error::{Error, Result};
use crate::lease::ClientId;
use crate::options::{DhcpOption, MessageType};
use crate::packet::{BOOTREQUEST, DhcpPacket};

#[derive(Debug, Clone)]
pub struct DoraHandler {
    config: Arc<Config>,
    allocator: Allocator,
}

impl DoraHandler {
    pub fn new(config: Arc<Config>, allocator: Allocator) -> Self {
        Self { config, allocator }
    }

    /// Produces the reply for one request, or `None` when nothing should be
    /// sent back.
    ///
    /// # Errors
    ///
    /// Propagates allocation failures other than pool exhaustion, which is
    /// resolved here according to [`Config::on_pool_exhausted`].
    pub async fn handle(&self, request: &DhcpPacket) -> Result<Option<DhcpPacket>> {
        if request.op != BOOTREQUEST {
            debug!("Dropping non-request opcode {}", request.op);
            return Ok(None);
        }

        let client_id = request.client_id();

        match request.message_type() {
            Some(MessageType::Discover) => {
                self.lease_reply(request, &client_id, MessageType::Offer)
                    .await
            }
            Some(MessageType::Request) => {
                self.lease_reply(request, &client_id, MessageType::Ack)
                    .await
            }
            Some(message_type) => {
                info!("Ignoring {} from {}", message_type, client_id);
                Ok(None)
            }
            None => {
                info!("Ignoring BOOTP request from {}", client_id);
                Ok(None)
            }
        }
    }

    async fn lease_reply(
        &self,
        request: &DhcpPacket,
        client_id: &ClientId,
        reply_type: MessageType,
    ) -> Result<Option<DhcpPacket>> {
        let assigned = match self.allocator.allocate(client_id).await {
            Ok(ip) => ip,
            Err(Error::PoolExhausted) => {
                return Ok(self.exhausted_reply(request, reply_type));
            }
            Err(error) => return Err(error),
        };

        let reply = DhcpPacket::create_reply(
            request,
            reply_type,
            assigned,
            self.config.server_ip,
            self.lease_options(),
        );

        Ok(Some(reply))
    }

    /// Only a REQUEST may be NAKed; an unanswerable DISCOVER is always dropped.
    fn exhausted_reply(
        &self,
        request: &DhcpPacket,
        reply_type: MessageType,
    ) -> Option<DhcpPacket> {
        match (self.config.on_pool_exhausted, reply_type) {
            (ExhaustionPolicy::Nak, MessageType::Ack) => Some(DhcpPacket::create_reply(
                request,
                MessageType::Nak,
                Ipv4Addr::UNSPECIFIED,
                self.config.server_ip,
                vec![DhcpOption::ServerIdentifier(self.config.server_ip)],
            )),
            _ => None,
        }
    }

    /// OFFER and ACK carry the same set: this host is router, resolver and
    /// server identifier all at once.
    fn lease_options(&self) -> Vec<DhcpOption> {
        let server_ip = self.config.server_ip;
        vec![
            DhcpOption::SubnetMask(self.config.subnet_mask),
            DhcpOption::Router(vec![server_ip]),
            DhcpOption::DnsServer(vec![server_ip]),
            DhcpOption::LeaseTime(self.config.lease_duration_seconds),
            DhcpOption::ServerIdentifier(server_ip),
        ]
    }
}
