//! DHCP options (RFC 2132) understood by the responder.
//!
//! Only the options the lease engine reads or writes get their own variant.
//! Everything else a client sends is kept as [`DhcpOption::Unknown`] so the
//! decoder never rejects a packet just for carrying vendor extensions.

use std::net::Ipv4Addr;

use crate::error::{Error, Result};

/// An option's data field holds at most 255 bytes, i.e. 63 IPv4 addresses.
const MAX_ADDRESSES_PER_OPTION: usize = 63;

/// Option codes with a dedicated variant, plus the two framing codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OptionCode {
    Pad = 0,
    SubnetMask = 1,
    Router = 3,
    DnsServer = 6,
    LeaseTime = 51,
    MessageType = 53,
    ServerIdentifier = 54,
    End = 255,
}

impl TryFrom<u8> for OptionCode {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Pad),
            1 => Ok(Self::SubnetMask),
            3 => Ok(Self::Router),
            6 => Ok(Self::DnsServer),
            51 => Ok(Self::LeaseTime),
            53 => Ok(Self::MessageType),
            54 => Ok(Self::ServerIdentifier),
            255 => Ok(Self::End),
            other => Err(other),
        }
    }
}

/// DHCP message types (Option 53), RFC 2132 §9.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Discover = 1,
    Offer = 2,
    Request = 3,
    Decline = 4,
    Ack = 5,
    Nak = 6,
    Release = 7,
    Inform = 8,
}

impl TryFrom<u8> for MessageType {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Discover),
            2 => Ok(Self::Offer),
            3 => Ok(Self::Request),
            4 => Ok(Self::Decline),
            5 => Ok(Self::Ack),
            6 => Ok(Self::Nak),
            7 => Ok(Self::Release),
            8 => Ok(Self::Inform),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Discover => "DISCOVER",
            Self::Offer => "OFFER",
            Self::Request => "REQUEST",
            Self::Decline => "DECLINE",
            Self::Ack => "ACK",
            Self::Nak => "NAK",
            Self::Release => "RELEASE",
            Self::Inform => "INFORM",
        };
        f.write_str(name)
    }
}

/// A decoded DHCP option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DhcpOption {
    /// Subnet mask (Option 1).
    SubnetMask(Ipv4Addr),
    /// Router addresses (Option 3); the first one is the default gateway.
    Router(Vec<Ipv4Addr>),
    /// DNS server addresses (Option 6).
    DnsServer(Vec<Ipv4Addr>),
    /// Lease time in seconds (Option 51).
    LeaseTime(u32),
    /// DHCP message type (Option 53).
    MessageType(MessageType),
    /// Address of the answering server (Option 54).
    ServerIdentifier(Ipv4Addr),
    /// Any other option, kept verbatim.
    Unknown(u8, Vec<u8>),
}

fn single_address(data: &[u8], what: &str) -> Result<Ipv4Addr> {
    let octets: [u8; 4] = data
        .try_into()
        .map_err(|_| Error::InvalidPacket(format!("Invalid {} length {}", what, data.len())))?;
    Ok(Ipv4Addr::from(octets))
}

fn address_list(data: &[u8], what: &str) -> Result<Vec<Ipv4Addr>> {
    if data.is_empty() || !data.len().is_multiple_of(4) {
        return Err(Error::InvalidPacket(format!(
            "Invalid {} length {}",
            what,
            data.len()
        )));
    }
    Ok(data
        .chunks_exact(4)
        .map(|chunk| Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]))
        .collect())
}

fn tlv(code: u8, data: &[u8]) -> Vec<u8> {
    let len = data.len().min(u8::MAX as usize);
    let mut encoded = Vec::with_capacity(len + 2);
    encoded.push(code);
    encoded.push(len as u8);
    encoded.extend_from_slice(&data[..len]);
    encoded
}

fn flatten(addrs: &[Ipv4Addr]) -> Vec<u8> {
    addrs
        .iter()
        .take(MAX_ADDRESSES_PER_OPTION)
        .flat_map(|addr| addr.octets())
        .collect()
}

impl DhcpOption {
    /// Returns the RFC 2132 option code for this option.
    pub fn option_code(&self) -> u8 {
        match self {
            Self::SubnetMask(_) => OptionCode::SubnetMask as u8,
            Self::Router(_) => OptionCode::Router as u8,
            Self::DnsServer(_) => OptionCode::DnsServer as u8,
            Self::LeaseTime(_) => OptionCode::LeaseTime as u8,
            Self::MessageType(_) => OptionCode::MessageType as u8,
            Self::ServerIdentifier(_) => OptionCode::ServerIdentifier as u8,
            Self::Unknown(code, _) => *code,
        }
    }

    /// Decodes one option from its code and data bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPacket`] when the data length does not fit
    /// the option, or when the message type value is out of range.
    pub fn parse(code: u8, data: &[u8]) -> Result<Self> {
        match OptionCode::try_from(code) {
            Ok(OptionCode::SubnetMask) => Ok(Self::SubnetMask(single_address(data, "subnet mask")?)),
            Ok(OptionCode::Router) => Ok(Self::Router(address_list(data, "router option")?)),
            Ok(OptionCode::DnsServer) => {
                Ok(Self::DnsServer(address_list(data, "DNS server option")?))
            }
            Ok(OptionCode::LeaseTime) => {
                let bytes: [u8; 4] = data.try_into().map_err(|_| {
                    Error::InvalidPacket(format!("Invalid lease time length {}", data.len()))
                })?;
                Ok(Self::LeaseTime(u32::from_be_bytes(bytes)))
            }
            Ok(OptionCode::MessageType) => match data {
                [value] => MessageType::try_from(*value)
                    .map(Self::MessageType)
                    .map_err(|value| {
                        Error::InvalidPacket(format!("Unknown message type: {}", value))
                    }),
                _ => Err(Error::InvalidPacket(
                    "Invalid message type length".to_string(),
                )),
            },
            Ok(OptionCode::ServerIdentifier) => Ok(Self::ServerIdentifier(single_address(
                data,
                "server identifier",
            )?)),
            Ok(OptionCode::Pad) | Ok(OptionCode::End) => Err(Error::InvalidPacket(
                "Pad/End carry no data".to_string(),
            )),
            Err(unknown_code) => Ok(Self::Unknown(unknown_code, data.to_vec())),
        }
    }

    /// Encodes the option as code, length and data.
    pub fn encode(&self) -> Vec<u8> {
        let code = self.option_code();
        match self {
            Self::SubnetMask(addr) | Self::ServerIdentifier(addr) => tlv(code, &addr.octets()),
            Self::Router(addrs) | Self::DnsServer(addrs) => tlv(code, &flatten(addrs)),
            Self::LeaseTime(seconds) => tlv(code, &seconds.to_be_bytes()),
            Self::MessageType(message_type) => tlv(code, &[*message_type as u8]),
            Self::Unknown(_, data) => tlv(code, data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_conversions() {
        for value in 1..=8u8 {
            let msg_type = MessageType::try_from(value).unwrap();
            assert_eq!(msg_type as u8, value);
        }
        assert!(MessageType::try_from(0).is_err());
        assert!(MessageType::try_from(9).is_err());
    }

    #[test]
    fn test_reply_options_wire_layout() {
        let server = Ipv4Addr::new(10, 0, 0, 1);
        assert_eq!(
            DhcpOption::ServerIdentifier(server).encode(),
            vec![54, 4, 10, 0, 0, 1]
        );
        assert_eq!(
            DhcpOption::LeaseTime(3600).encode(),
            vec![51, 4, 0, 0, 0x0e, 0x10]
        );
        assert_eq!(
            DhcpOption::MessageType(MessageType::Offer).encode(),
            vec![53, 1, 2]
        );
        assert_eq!(
            DhcpOption::Router(vec![server, Ipv4Addr::new(10, 0, 0, 2)]).encode(),
            vec![3, 8, 10, 0, 0, 1, 10, 0, 0, 2]
        );
    }

    #[test]
    fn test_parse_reads_back_encoded_options() {
        let options = [
            DhcpOption::SubnetMask(Ipv4Addr::new(255, 255, 255, 0)),
            DhcpOption::DnsServer(vec![Ipv4Addr::new(10, 0, 0, 1)]),
            DhcpOption::LeaseTime(3600),
            DhcpOption::MessageType(MessageType::Request),
        ];

        for original in options {
            let encoded = original.encode();
            let decoded = DhcpOption::parse(encoded[0], &encoded[2..]).unwrap();
            assert_eq!(decoded, original);
        }
    }

    #[test]
    fn test_option_invalid_lengths() {
        assert!(DhcpOption::parse(1, &[255, 255, 255]).is_err());
        assert!(DhcpOption::parse(3, &[]).is_err());
        assert!(DhcpOption::parse(6, &[10, 0, 0, 1, 10]).is_err());
        assert!(DhcpOption::parse(51, &[0, 0, 0]).is_err());
        assert!(DhcpOption::parse(53, &[1, 1]).is_err());
        assert!(DhcpOption::parse(54, &[]).is_err());
    }

    #[test]
    fn test_out_of_range_message_type_rejected() {
        assert!(DhcpOption::parse(53, &[0]).is_err());
        assert!(DhcpOption::parse(53, &[42]).is_err());
    }

    #[test]
    fn test_unknown_option_preserved() {
        let decoded = DhcpOption::parse(61, &[1, 0xaa, 0xbb]).unwrap();
        assert_eq!(decoded, DhcpOption::Unknown(61, vec![1, 0xaa, 0xbb]));
        assert_eq!(decoded.encode(), vec![61, 3, 1, 0xaa, 0xbb]);
    }

    #[test]
    fn test_message_type_display() {
        assert_eq!(format!("{}", MessageType::Discover), "DISCOVER");
        assert_eq!(format!("{}", MessageType::Offer), "OFFER");
        assert_eq!(format!("{}", MessageType::Request), "REQUEST");
        assert_eq!(format!("{}", MessageType::Ack), "ACK");
        assert_eq!(format!("{}", MessageType::Release), "RELEASE");
    }
}
