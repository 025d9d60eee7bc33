//! The Address Resolution Protocol, rfc826, restricted to Ethernet and IPv4.
use byteorder::{ByteOrder, NetworkEndian};

use super::{ethernet, ip, Error, Result};

enum_with_unknown! {
    /// The operation field of an ARP packet.
    pub enum Operation(u16) {
        /// Who-has, asking for the hardware address of a protocol address.
        Request = 1,
        /// Is-at, announcing the hardware address of the sender.
        Reply = 2,
    }
}

/// The length of an Ethernet/IPv4 ARP packet.
pub const PACKET_LEN: usize = 28;

const HTYPE_ETHERNET: u16 = 1;
const PTYPE_IPV4: u16 = 0x0800;

mod field {
    use core::ops::Range;

    pub(super) const HTYPE: Range<usize> = 0..2;
    pub(super) const PTYPE: Range<usize> = 2..4;
    pub(super) const HLEN: usize = 4;
    pub(super) const PLEN: usize = 5;
    pub(super) const OPER: Range<usize> = 6..8;
    pub(super) const SHA: Range<usize> = 8..14;
    pub(super) const SPA: Range<usize> = 14..18;
    pub(super) const THA: Range<usize> = 18..24;
    pub(super) const TPA: Range<usize> = 24..28;
}

/// A high-level representation of an Ethernet/IPv4 ARP packet.
///
/// Other hardware or protocol types are rejected while parsing, there is no use for them in this
/// stack.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    /// Request or reply.
    pub operation: Operation,
    /// The hardware address of the sender.
    pub source_hardware_addr: ethernet::Address,
    /// The protocol address of the sender.
    pub source_protocol_addr: ip::Address,
    /// The hardware address asked for, zero in requests.
    pub target_hardware_addr: ethernet::Address,
    /// The protocol address asked for.
    pub target_protocol_addr: ip::Address,
}

impl Repr {
    /// Parse an ARP packet.
    pub fn parse(packet: &[u8]) -> Result<Repr> {
        if packet.len() < PACKET_LEN {
            return Err(Error::Truncated);
        }

        if NetworkEndian::read_u16(&packet[field::HTYPE]) != HTYPE_ETHERNET
            || NetworkEndian::read_u16(&packet[field::PTYPE]) != PTYPE_IPV4
            || packet[field::HLEN] != 6
            || packet[field::PLEN] != 4
        {
            return Err(Error::Malformed);
        }

        Ok(Repr {
            operation: NetworkEndian::read_u16(&packet[field::OPER]).into(),
            source_hardware_addr: ethernet::Address::from_bytes(&packet[field::SHA]),
            source_protocol_addr: ip::Address::from_bytes(&packet[field::SPA]),
            target_hardware_addr: ethernet::Address::from_bytes(&packet[field::THA]),
            target_protocol_addr: ip::Address::from_bytes(&packet[field::TPA]),
        })
    }

    /// The buffer size required to emit this packet.
    pub fn buffer_len(&self) -> usize {
        PACKET_LEN
    }

    /// Emit the packet into a buffer.
    ///
    /// # Panics
    /// The buffer must hold at least [`PACKET_LEN`] octets.
    pub fn emit(&self, packet: &mut [u8]) {
        NetworkEndian::write_u16(&mut packet[field::HTYPE], HTYPE_ETHERNET);
        NetworkEndian::write_u16(&mut packet[field::PTYPE], PTYPE_IPV4);
        packet[field::HLEN] = 6;
        packet[field::PLEN] = 4;
        NetworkEndian::write_u16(&mut packet[field::OPER], self.operation.into());
        packet[field::SHA].copy_from_slice(self.source_hardware_addr.as_bytes());
        packet[field::SPA].copy_from_slice(self.source_protocol_addr.as_bytes());
        packet[field::THA].copy_from_slice(self.target_hardware_addr.as_bytes());
        packet[field::TPA].copy_from_slice(self.target_protocol_addr.as_bytes());
    }
}
