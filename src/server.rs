use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::allocator::Allocator;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::handler::DoraHandler;
use crate::lease::LeaseTable;
use crate::packet::DhcpPacket;

const DHCP_SERVER_PORT: u16 = 67;
const DHCP_CLIENT_PORT: u16 = 68;
const RECV_BUFFER_SIZE: usize = 1500;

/// Replies always go out as broadcasts: the client has no address yet.
const REPLY_DESTINATION: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::BROADCAST, DHCP_CLIENT_PORT);

pub struct DhcpServer {
    config: Arc<Config>,
    leases: Arc<LeaseTable>,
    handler: DoraHandler,
    socket: Arc<UdpSocket>,
    reply_to: SocketAddr,
}

impl DhcpServer {
    /// Binds UDP/67 on `interface` and prepares an empty lease table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Socket`] if the socket cannot be created or bound,
    /// which usually means missing privileges or another DHCP server.
    pub fn new(config: Arc<Config>, interface: &str) -> Result<Self> {
        let socket = Self::create_socket(interface)?;

        info!(
            "DHCP server starting on {}:{} ({})",
            config.server_ip, DHCP_SERVER_PORT, interface
        );

        Ok(Self::with_socket(config, socket))
    }

    /// Builds a server around an already bound socket.
    pub fn with_socket(config: Arc<Config>, socket: UdpSocket) -> Self {
        let leases = Arc::new(LeaseTable::new(Arc::clone(&config)));
        let handler = DoraHandler::new(Arc::clone(&config), Allocator::new(Arc::clone(&leases)));

        info!(
            "IP pool: {} - {} ({} addresses)",
            config.pool_address(config.pool_start),
            config.pool_address(config.pool_end),
            config.pool_size()
        );

        Self {
            config,
            leases,
            handler,
            socket: Arc::new(socket),
            reply_to: SocketAddr::V4(REPLY_DESTINATION),
        }
    }

    fn create_socket(interface: &str) -> Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|error| Error::Socket(format!("Failed to create socket: {}", error)))?;

        socket
            .set_reuse_address(true)
            .map_err(|error| Error::Socket(format!("Failed to set SO_REUSEADDR: {}", error)))?;

        socket
            .set_broadcast(true)
            .map_err(|error| Error::Socket(format!("Failed to set SO_BROADCAST: {}", error)))?;

        socket
            .set_nonblocking(true)
            .map_err(|error| Error::Socket(format!("Failed to set non-blocking: {}", error)))?;

        #[cfg(any(target_os = "linux", target_os = "android"))]
        socket.bind_device(Some(interface.as_bytes())).map_err(|error| {
            Error::Socket(format!("Failed to bind to device {}: {}", interface, error))
        })?;

        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        warn!(
            "Binding to {} is only supported on Linux; listening on all interfaces",
            interface
        );

        let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DHCP_SERVER_PORT);
        socket.bind(&bind_addr.into()).map_err(|error| {
            Error::Socket(format!("Failed to bind to {}: {}", bind_addr, error))
        })?;

        let std_socket: std::net::UdpSocket = socket.into();
        UdpSocket::from_std(std_socket).map_err(|error| {
            Error::Socket(format!("Failed to convert to tokio socket: {}", error))
        })
    }

    /// Serves until `shutdown` resolves.
    ///
    /// Every datagram is handled on its own task. A bad datagram, a failed
    /// allocation or a failed send is logged and dropped; none of them stops
    /// the loop. Requests already in flight when `shutdown` fires are allowed
    /// to finish.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let mut buffer = [0u8; RECV_BUFFER_SIZE];
        let mut in_flight = JoinSet::new();
        tokio::pin!(shutdown);

        info!("DHCP server ready and listening");

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
                received = self.socket.recv_from(&mut buffer) => match received {
                    Ok((size, source)) => {
                        let data = buffer[..size].to_vec();
                        let handler = self.packet_handler();

                        in_flight.spawn(async move {
                            if let Err(error) = handler.handle_packet(&data, source).await {
                                warn!("Error handling packet from {}: {}", source, error);
                            }
                        });
                    }
                    Err(error) => {
                        error!("Error receiving packet: {}", error);
                    }
                },
            }
        }

        debug!("Waiting for {} in-flight request(s)", in_flight.len());
        while in_flight.join_next().await.is_some() {}

        info!("DHCP server stopped");
        Ok(())
    }

    /// Writes the current lease table to the log.
    pub async fn log_leases(&self) {
        let leases = self.leases.list_leases().await;
        info!(
            "{} lease(s) granted, {} of {} address(es) left",
            leases.len(),
            self.leases.remaining().await,
            self.config.pool_size()
        );
        for lease in leases {
            info!(
                "  {} -> {} (since {})",
                lease.client_id,
                lease.ip_address,
                lease.granted_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
    }

    fn packet_handler(&self) -> PacketHandler {
        PacketHandler {
            handler: self.handler.clone(),
            socket: Arc::clone(&self.socket),
            reply_to: self.reply_to,
        }
    }

    pub fn leases(&self) -> &LeaseTable {
        &self.leases
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

struct PacketHandler {
    handler: DoraHandler,
    socket: Arc<UdpSocket>,
    reply_to: SocketAddr,
}

impl PacketHandler {
    async fn handle_packet(&self, data: &[u8], source: SocketAddr) -> Result<()> {
        let Some(reply) = self.process(data, source).await? else {
            return Ok(());
        };

        let encoded = reply.encode()?;
        self.socket.send_to(&encoded, self.reply_to).await?;

        if let Some(message_type) = reply.message_type() {
            info!(
                "Sent {} to {} -> {}",
                message_type,
                reply.client_id(),
                reply.yiaddr
            );
        }

        Ok(())
    }

    /// Decodes one datagram and runs it through the DORA handler.
    async fn process(&self, data: &[u8], source: SocketAddr) -> Result<Option<DhcpPacket>> {
        let packet = DhcpPacket::parse(data)?;

        match packet.message_type() {
            Some(message_type) => info!(
                "Received {} from {} ({})",
                message_type,
                packet.client_id(),
                source
            ),
            None => debug!("Received BOOTP from {} ({})", packet.client_id(), source),
        }

        self.handler.handle(&packet).await
    }
}
