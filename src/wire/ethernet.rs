//! Ethernet II framing.
use core::fmt;

use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, Result};

enum_with_unknown! {
    /// The type field of an Ethernet II frame.
    pub enum EtherType(u16) {
        /// An IPv4 packet.
        Ipv4 = 0x0800,
        /// An ARP packet.
        Arp = 0x0806,
    }
}

impl fmt::Display for EtherType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EtherType::Ipv4 => write!(f, "IPv4"),
            EtherType::Arp => write!(f, "ARP"),
            EtherType::Unknown(value) => write!(f, "0x{:04x}", value),
        }
    }
}

/// A six-octet Ethernet (MAC) address.
#[derive(Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub struct Address(pub [u8; 6]);

impl Address {
    /// The broadcast address `ff:ff:ff:ff:ff:ff`.
    pub const BROADCAST: Address = Address([0xff; 6]);

    /// Construct an address from the first six octets of a slice.
    ///
    /// # Panics
    /// The slice must be at least six octets long.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut bytes = [0; 6];
        bytes.copy_from_slice(&data[..6]);
        Address(bytes)
    }

    /// View the address as a byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Query whether this is the broadcast address.
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Query whether the group bit is set.
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    /// Query whether the address is a meaningful single-station address.
    pub fn is_unicast(&self) -> bool {
        !(self.is_broadcast() || self.is_multicast())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// The length of an Ethernet II header.
pub const HEADER_LEN: usize = 14;

mod field {
    use core::ops::Range;

    pub(super) const DESTINATION: Range<usize> = 0..6;
    pub(super) const SOURCE: Range<usize> = 6..12;
    pub(super) const ETHERTYPE: Range<usize> = 12..14;
}

/// A high-level representation of an Ethernet II header.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    /// The destination station.
    pub dst_addr: Address,
    /// The sending station.
    pub src_addr: Address,
    /// The type of the carried payload.
    pub ethertype: EtherType,
}

impl Repr {
    /// Parse a frame header, validating the buffer length.
    pub fn parse(frame: &[u8]) -> Result<Repr> {
        if frame.len() < HEADER_LEN {
            return Err(Error::Truncated);
        }

        Ok(Repr {
            dst_addr: Address::from_bytes(&frame[field::DESTINATION]),
            src_addr: Address::from_bytes(&frame[field::SOURCE]),
            ethertype: NetworkEndian::read_u16(&frame[field::ETHERTYPE]).into(),
        })
    }

    /// The buffer size required to emit this header.
    pub fn buffer_len(&self) -> usize {
        HEADER_LEN
    }

    /// Emit the header into the front of a buffer.
    ///
    /// # Panics
    /// The buffer must hold at least [`HEADER_LEN`] octets.
    pub fn emit(&self, frame: &mut [u8]) {
        frame[field::DESTINATION].copy_from_slice(self.dst_addr.as_bytes());
        frame[field::SOURCE].copy_from_slice(self.src_addr.as_bytes());
        NetworkEndian::write_u16(&mut frame[field::ETHERTYPE], self.ethertype.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_emit_roundtrip() {
        let repr = Repr {
            dst_addr: Address([0, 1, 2, 3, 4, 5]),
            src_addr: Address([6, 5, 4, 3, 2, 1]),
            ethertype: EtherType::Arp,
        };

        let mut buffer = vec![0; HEADER_LEN];
        repr.emit(&mut buffer);
        assert_eq!(Repr::parse(&buffer), Ok(repr));
    }

    #[test]
    fn parse_truncated() {
        assert_eq!(Repr::parse(&[0; 13]), Err(Error::Truncated));
    }

    #[test]
    fn address_classes() {
        assert!(Address::BROADCAST.is_broadcast());
        assert!(Address([0x01, 0, 0x5e, 0, 0, 1]).is_multicast());
        assert!(Address([2, 0, 0, 0, 0, 1]).is_unicast());
    }
}
