//! IPv4 addressing and the shared internet checksum.
//!
//! The address and protocol types here are used by every layer above Ethernet. The checksum
//! helpers at the bottom implement the RFC 1071 one's-complement sum that IPv4, ICMP, UDP and TCP
//! all build on; the upper protocols combine it with the pseudo header over the enclosing
//! addresses.
use core::fmt;

use byteorder::{ByteOrder, NetworkEndian};

enum_with_unknown! {
    /// The protocol field of an IPv4 header.
    pub enum Protocol(u8) {
        /// Internet Control Message Protocol.
        Icmp = 0x01,
        /// Transmission Control Protocol.
        Tcp = 0x06,
        /// User Datagram Protocol.
        Udp = 0x11,
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Protocol::Icmp => write!(f, "ICMP"),
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
            Protocol::Unknown(value) => write!(f, "0x{:02x}", value),
        }
    }
}

/// A four-octet IPv4 address.
#[derive(Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub struct Address(pub [u8; 4]);

impl Address {
    /// The address everything and nothing, `0.0.0.0`.
    ///
    /// Valid as a source before an address was assigned and as the wildcard in socket bindings.
    pub const UNSPECIFIED: Address = Address([0; 4]);

    /// The limited broadcast address `255.255.255.255`.
    pub const BROADCAST: Address = Address([255; 4]);

    /// Construct an address from its four octets.
    pub const fn new(a0: u8, a1: u8, a2: u8, a3: u8) -> Self {
        Address([a0, a1, a2, a3])
    }

    /// Construct an address from the first four octets of a slice.
    ///
    /// # Panics
    /// The slice must be at least four octets long.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut bytes = [0; 4];
        bytes.copy_from_slice(&data[..4]);
        Address(bytes)
    }

    /// View the address as a byte slice, in network order.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Query whether this is the wildcard `0.0.0.0`.
    pub fn is_unspecified(&self) -> bool {
        self.0 == [0; 4]
    }

    /// Query whether this is the limited broadcast address.
    pub fn is_broadcast(&self) -> bool {
        self.0 == [255; 4]
    }

    /// Query whether the address is in the multicast block `224.0.0.0/4`.
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0xf0 == 0xe0
    }
}

impl From<[u8; 4]> for Address {
    fn from(bytes: [u8; 4]) -> Self {
        Address(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

/// An IPv4 address prefix, relevant rfc1519, rfc4632.
#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy)]
pub struct Cidr {
    address: Address,
    prefix: u8,
}

impl Cidr {
    /// Create a network prefix from an address and prefix length.
    ///
    /// # Panics
    /// The prefix length must not be larger than 32.
    pub fn new(address: Address, prefix: u8) -> Self {
        assert!(prefix <= 32, "invalid prefix length");
        Cidr { address, prefix }
    }

    /// The host address this prefix was created with.
    pub fn address(&self) -> Address {
        self.address
    }

    /// The prefix length in bits.
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    fn mask(&self) -> u32 {
        if self.prefix == 0 {
            0
        } else {
            !0u32 << (32 - self.prefix)
        }
    }

    /// The network part of the address, all host bits cleared.
    pub fn network(&self) -> Address {
        let bits = NetworkEndian::read_u32(self.address.as_bytes()) & self.mask();
        let mut out = [0; 4];
        NetworkEndian::write_u32(&mut out, bits);
        Address(out)
    }

    /// The directed broadcast address of the network, all host bits set.
    pub fn broadcast(&self) -> Address {
        let bits = NetworkEndian::read_u32(self.address.as_bytes()) | !self.mask();
        let mut out = [0; 4];
        NetworkEndian::write_u32(&mut out, bits);
        Address(out)
    }

    /// Query whether the prefix contains the given address.
    pub fn contains(&self, addr: Address) -> bool {
        let masked = NetworkEndian::read_u32(addr.as_bytes()) & self.mask();
        masked == NetworkEndian::read_u32(self.network().as_bytes())
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix)
    }
}

pub(crate) mod checksum {
    use byteorder::{ByteOrder, NetworkEndian};

    use super::{Address, Protocol};

    fn propagate_carries(word: u32) -> u16 {
        let sum = (word >> 16) + (word & 0xffff);
        ((sum >> 16) as u16) + (sum as u16)
    }

    /// Compute an RFC 1071 compliant checksum (without the final complement).
    pub(crate) fn data(mut data: &[u8]) -> u16 {
        let mut accum: u32 = 0;

        while data.len() >= 2 {
            accum += u32::from(NetworkEndian::read_u16(data));
            data = &data[2..];
        }

        // The last remaining odd byte is padded with zeros on the right.
        if let Some(&value) = data.first() {
            accum += u32::from(value) << 8;
        }

        propagate_carries(accum)
    }

    /// Combine several RFC 1071 compliant checksums.
    pub(crate) fn combine(checksums: &[u16]) -> u16 {
        let mut accum: u32 = 0;
        for &word in checksums {
            accum += u32::from(word);
        }
        propagate_carries(accum)
    }

    /// Compute the IPv4 pseudo header checksum for an upper protocol.
    pub(crate) fn pseudo_header(
        src_addr: Address,
        dst_addr: Address,
        protocol: Protocol,
        length: u32,
    ) -> u16 {
        let mut proto_len = [0u8; 4];
        proto_len[1] = protocol.into();
        NetworkEndian::write_u16(&mut proto_len[2..4], length as u16);

        combine(&[
            data(src_addr.as_bytes()),
            data(dst_addr.as_bytes()),
            data(&proto_len[..]),
        ])
    }
}
