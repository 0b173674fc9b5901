//! BOOTP/DHCP message framing per RFC 2131.
//!
//! A message is a fixed 236-byte header, the 4-byte magic cookie and a run of
//! TLV options closed by an End marker:
//!
//! ```text
//! offset  size  field
//!      0     1  op        1 = BOOTREQUEST, 2 = BOOTREPLY
//!      1     1  htype
//!      2     1  hlen
//!      3     1  hops
//!      4     4  xid
//!      8     2  secs
//!     10     2  flags     bit 15 = broadcast
//!     12     4  ciaddr
//!     16     4  yiaddr
//!     20     4  siaddr
//!     24     4  giaddr
//!     28    16  chaddr
//!     44    64  sname
//!    108   128  file
//!    236     4  magic cookie 99.130.83.99
//!    240     -  options
//! ```
//!
//! This is the codec boundary of the responder: the lease engine only ever
//! sees [`DhcpPacket`] values.

use std::net::Ipv4Addr;

use crate::error::{Error, Result};
use crate::lease::ClientId;
use crate::options::{DhcpOption, MessageType, OptionCode};

const DHCP_MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];

const CHADDR_OFFSET: usize = 28;
const CHADDR_SIZE: usize = 16;
const SNAME_OFFSET: usize = CHADDR_OFFSET + CHADDR_SIZE;
const SNAME_SIZE: usize = 64;
const FILE_OFFSET: usize = SNAME_OFFSET + SNAME_SIZE;
const FILE_SIZE: usize = 128;
const MAGIC_COOKIE_OFFSET: usize = FILE_OFFSET + FILE_SIZE;
const OPTIONS_OFFSET: usize = MAGIC_COOKIE_OFFSET + DHCP_MAGIC_COOKIE.len();

/// BOOTP relay agents expect at least 300 bytes (RFC 1542).
const DHCP_MIN_PACKET_SIZE: usize = 300;

/// Largest reply every client must accept when it sent no Option 57.
const DHCP_MAX_REPLY_SIZE: usize = 576;

/// Relay loop guard (RFC 2131 §4.1).
const MAX_HOPS: u8 = 16;

const BROADCAST_FLAG: u16 = 0x8000;

pub const BOOTREQUEST: u8 = 1;
pub const BOOTREPLY: u8 = 2;
pub const HTYPE_ETHERNET: u8 = 1;
pub const HLEN_ETHERNET: u8 = 6;

/// A decoded DHCP message, request or reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpPacket {
    pub op: u8,
    pub htype: u8,
    pub hlen: u8,
    pub hops: u8,
    /// Transaction ID chosen by the client, echoed in replies.
    pub xid: u32,
    pub secs: u16,
    pub flags: u16,
    pub ciaddr: Ipv4Addr,
    /// The address being handed to the client.
    pub yiaddr: Ipv4Addr,
    pub siaddr: Ipv4Addr,
    pub giaddr: Ipv4Addr,
    pub chaddr: [u8; CHADDR_SIZE],
    pub options: Vec<DhcpOption>,
}

fn ipv4_at(data: &[u8], offset: usize) -> Ipv4Addr {
    Ipv4Addr::new(
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    )
}

impl DhcpPacket {
    /// Client-side builder: a BOOTREQUEST carrying only option 53, with the
    /// broadcast flag set, as a fresh client sends it.
    ///
    /// The server never calls this. It exists for clients and test
    /// harnesses that drive a [`DoraHandler`](crate::DoraHandler) or a
    /// running server. `hardware_address` longer than 16 bytes is truncated.
    ///
    /// ```
    /// use lanprov::{DhcpPacket, MessageType};
    ///
    /// let mac = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff];
    /// let discover = DhcpPacket::request(MessageType::Discover, &mac, 7);
    /// assert_eq!(discover.message_type(), Some(MessageType::Discover));
    /// assert_eq!(discover.client_id().to_string(), "aa:bb:cc:dd:ee:ff");
    /// ```
    pub fn request(message_type: MessageType, hardware_address: &[u8], xid: u32) -> Self {
        let hlen = hardware_address.len().min(CHADDR_SIZE);
        let mut chaddr = [0u8; CHADDR_SIZE];
        chaddr[..hlen].copy_from_slice(&hardware_address[..hlen]);

        Self {
            op: BOOTREQUEST,
            htype: HTYPE_ETHERNET,
            hlen: hlen as u8,
            hops: 0,
            xid,
            secs: 0,
            flags: BROADCAST_FLAG,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr,
            options: vec![DhcpOption::MessageType(message_type)],
        }
    }

    /// Decodes a DHCP message from a received datagram.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPacket`] if the datagram is shorter than the
    /// fixed header plus cookie, the magic cookie is wrong, the hop count
    /// exceeds 16, an Ethernet `hlen` is not 6, or an option is truncated.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < OPTIONS_OFFSET {
            return Err(Error::InvalidPacket(format!(
                "Packet too short: {} bytes (minimum {})",
                data.len(),
                OPTIONS_OFFSET
            )));
        }

        if data[MAGIC_COOKIE_OFFSET..OPTIONS_OFFSET] != DHCP_MAGIC_COOKIE {
            return Err(Error::InvalidPacket("Invalid magic cookie".to_string()));
        }

        let (op, htype, hlen, hops) = (data[0], data[1], data[2], data[3]);

        if hops > MAX_HOPS {
            return Err(Error::InvalidPacket(format!(
                "Hop count {} exceeds maximum {}",
                hops, MAX_HOPS
            )));
        }

        if htype == HTYPE_ETHERNET && hlen != HLEN_ETHERNET {
            return Err(Error::InvalidPacket(format!(
                "Invalid hlen {} for Ethernet (expected {})",
                hlen, HLEN_ETHERNET
            )));
        }

        let mut chaddr = [0u8; CHADDR_SIZE];
        chaddr.copy_from_slice(&data[CHADDR_OFFSET..SNAME_OFFSET]);

        Ok(Self {
            op,
            htype,
            hlen,
            hops,
            xid: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            secs: u16::from_be_bytes([data[8], data[9]]),
            flags: u16::from_be_bytes([data[10], data[11]]),
            ciaddr: ipv4_at(data, 12),
            yiaddr: ipv4_at(data, 16),
            siaddr: ipv4_at(data, 20),
            giaddr: ipv4_at(data, 24),
            chaddr,
            options: Self::parse_options(&data[OPTIONS_OFFSET..])?,
        })
    }

    fn parse_options(mut data: &[u8]) -> Result<Vec<DhcpOption>> {
        let mut options = Vec::new();

        while let Some((&code, rest)) = data.split_first() {
            if code == OptionCode::End as u8 {
                break;
            }
            if code == OptionCode::Pad as u8 {
                data = rest;
                continue;
            }

            let Some((&length, rest)) = rest.split_first() else {
                return Err(Error::InvalidPacket("Option length missing".to_string()));
            };
            let length = length as usize;
            if length > rest.len() {
                return Err(Error::InvalidPacket(format!(
                    "Option {} data truncated ({} of {} bytes)",
                    code,
                    rest.len(),
                    length
                )));
            }

            options.push(DhcpOption::parse(code, &rest[..length])?);
            data = &rest[length..];
        }

        Ok(options)
    }

    /// Encodes the message for transmission, padded to at least 300 bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encoding`] if the options push the message past the
    /// 576 bytes a client is guaranteed to accept.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut packet = Vec::with_capacity(DHCP_MAX_REPLY_SIZE);

        packet.extend_from_slice(&[self.op, self.htype, self.hlen, self.hops]);
        packet.extend_from_slice(&self.xid.to_be_bytes());
        packet.extend_from_slice(&self.secs.to_be_bytes());
        packet.extend_from_slice(&self.flags.to_be_bytes());
        for addr in [self.ciaddr, self.yiaddr, self.siaddr, self.giaddr] {
            packet.extend_from_slice(&addr.octets());
        }
        packet.extend_from_slice(&self.chaddr);
        packet.resize(MAGIC_COOKIE_OFFSET, 0);
        packet.extend_from_slice(&DHCP_MAGIC_COOKIE);

        for option in &self.options {
            packet.extend_from_slice(&option.encode());
        }
        packet.push(OptionCode::End as u8);

        if packet.len() > DHCP_MAX_REPLY_SIZE {
            return Err(Error::Encoding(format!(
                "message is {} bytes, limit is {}",
                packet.len(),
                DHCP_MAX_REPLY_SIZE
            )));
        }

        if packet.len() < DHCP_MIN_PACKET_SIZE {
            packet.resize(DHCP_MIN_PACKET_SIZE, 0);
        }

        Ok(packet)
    }

    fn find_option<'a, T>(&'a self, pick: impl Fn(&'a DhcpOption) -> Option<T>) -> Option<T> {
        self.options.iter().find_map(pick)
    }

    /// Option 53. Plain BOOTP requests carry none.
    pub fn message_type(&self) -> Option<MessageType> {
        self.find_option(|option| {
            let DhcpOption::MessageType(message_type) = option else { return None };
            Some(*message_type)
        })
    }

    pub fn subnet_mask(&self) -> Option<Ipv4Addr> {
        self.find_option(|option| {
            let DhcpOption::SubnetMask(mask) = option else { return None };
            Some(*mask)
        })
    }

    pub fn routers(&self) -> &[Ipv4Addr] {
        self.find_option(|option| {
            let DhcpOption::Router(routers) = option else { return None };
            Some(routers.as_slice())
        })
        .unwrap_or_default()
    }

    pub fn dns_servers(&self) -> &[Ipv4Addr] {
        self.find_option(|option| {
            let DhcpOption::DnsServer(servers) = option else { return None };
            Some(servers.as_slice())
        })
        .unwrap_or_default()
    }

    pub fn lease_time(&self) -> Option<u32> {
        self.find_option(|option| {
            let DhcpOption::LeaseTime(seconds) = option else { return None };
            Some(*seconds)
        })
    }

    pub fn server_identifier(&self) -> Option<Ipv4Addr> {
        self.find_option(|option| {
            let DhcpOption::ServerIdentifier(ip) = option else { return None };
            Some(*ip)
        })
    }

    /// Client hardware address bytes, `hlen` long (capped at 16).
    pub fn chaddr_bytes(&self) -> &[u8] {
        let len = (self.hlen as usize).min(CHADDR_SIZE);
        &self.chaddr[..len]
    }

    /// The identity leases are keyed by: the client hardware address.
    pub fn client_id(&self) -> ClientId {
        ClientId::from(self.chaddr_bytes())
    }

    /// Creates a reply to `request`.
    ///
    /// The message type goes in as the first option. `xid`, `flags`,
    /// `giaddr`, `chaddr`, `htype` and `hlen` are copied from the request;
    /// `siaddr` is the answering server.
    pub fn create_reply(
        request: &DhcpPacket,
        message_type: MessageType,
        your_ip: Ipv4Addr,
        server_ip: Ipv4Addr,
        options: Vec<DhcpOption>,
    ) -> Self {
        let mut all_options = Vec::with_capacity(options.len() + 1);
        all_options.push(DhcpOption::MessageType(message_type));
        all_options.extend(options);

        Self {
            op: BOOTREPLY,
            htype: request.htype,
            hlen: request.hlen,
            hops: 0,
            xid: request.xid,
            secs: 0,
            flags: request.flags,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: your_ip,
            siaddr: server_ip,
            giaddr: request.giaddr,
            chaddr: request.chaddr,
            options: all_options,
        }
    }
}
