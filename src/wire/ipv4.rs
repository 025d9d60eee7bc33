//! The IPv4 header, rfc791.
//!
//! Fragmented packets are rejected while parsing since the stack performs no reassembly; the
//! layer above records them as a decode drop.
use byteorder::{ByteOrder, NetworkEndian};

use super::ip::{checksum, Address, Protocol};
use super::{Checksum, Error, Result};

/// The length of an IPv4 header without options.
pub const HEADER_LEN: usize = 20;

mod field {
    use core::ops::Range;

    pub(super) const VER_IHL: usize = 0;
    pub(super) const TOTAL_LEN: Range<usize> = 2..4;
    pub(super) const FLG_OFF: Range<usize> = 6..8;
    pub(super) const TTL: usize = 8;
    pub(super) const PROTOCOL: usize = 9;
    pub(super) const CHECKSUM: Range<usize> = 10..12;
    pub(super) const SRC_ADDR: Range<usize> = 12..16;
    pub(super) const DST_ADDR: Range<usize> = 16..20;
}

/// A high-level representation of an IPv4 header.
///
/// Options are accepted on ingress but dropped from the representation, and never emitted.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    /// The sender.
    pub src_addr: Address,
    /// The receiver.
    pub dst_addr: Address,
    /// The upper protocol carried as payload.
    pub protocol: Protocol,
    /// The length of the payload, excluding the header.
    pub payload_len: usize,
    /// The time-to-live.
    pub hop_limit: u8,
}

impl Repr {
    /// Parse a packet header and borrow the payload it frames.
    ///
    /// The payload slice is bounded by the total-length field, discarding any trailing padding
    /// the link layer may have added. With `Checksum::Manual` the header checksum is verified,
    /// with `Checksum::Ignored` the device has already done so.
    pub fn parse<'a>(packet: &'a [u8], checksum: Checksum) -> Result<(Repr, &'a [u8])> {
        if packet.len() < HEADER_LEN {
            return Err(Error::Truncated);
        }

        let version = packet[field::VER_IHL] >> 4;
        let header_len = usize::from(packet[field::VER_IHL] & 0x0f) * 4;
        if version != 4 || header_len < HEADER_LEN {
            return Err(Error::Malformed);
        }

        let total_len = usize::from(NetworkEndian::read_u16(&packet[field::TOTAL_LEN]));
        if total_len < header_len || total_len > packet.len() {
            return Err(Error::Malformed);
        }

        // More-fragments set or a nonzero offset: no reassembly here.
        if NetworkEndian::read_u16(&packet[field::FLG_OFF]) & 0x3fff != 0 {
            return Err(Error::Malformed);
        }

        if checksum == Checksum::Manual
            && checksum::data(&packet[..header_len]) != 0xffff
        {
            return Err(Error::Malformed);
        }

        let repr = Repr {
            src_addr: Address::from_bytes(&packet[field::SRC_ADDR]),
            dst_addr: Address::from_bytes(&packet[field::DST_ADDR]),
            protocol: packet[field::PROTOCOL].into(),
            payload_len: total_len - header_len,
            hop_limit: packet[field::TTL],
        };

        Ok((repr, &packet[header_len..total_len]))
    }

    /// The buffer size required to emit this header.
    pub fn buffer_len(&self) -> usize {
        HEADER_LEN
    }

    /// The total length of the packet that this header describes.
    pub fn total_len(&self) -> usize {
        HEADER_LEN + self.payload_len
    }

    /// Emit the header into the front of a buffer.
    ///
    /// The checksum field is filled with `Checksum::Manual` and left zero otherwise, for devices
    /// that insert it on transmit.
    ///
    /// # Panics
    /// The buffer must hold at least [`HEADER_LEN`] octets.
    pub fn emit(&self, packet: &mut [u8], checksum_mode: Checksum) {
        packet[..HEADER_LEN].iter_mut().for_each(|b| *b = 0);
        packet[field::VER_IHL] = 0x45;
        NetworkEndian::write_u16(&mut packet[field::TOTAL_LEN], self.total_len() as u16);
        packet[field::TTL] = self.hop_limit;
        packet[field::PROTOCOL] = self.protocol.into();
        packet[field::SRC_ADDR].copy_from_slice(self.src_addr.as_bytes());
        packet[field::DST_ADDR].copy_from_slice(self.dst_addr.as_bytes());

        if checksum_mode == Checksum::Manual {
            let value = !checksum::data(&packet[..HEADER_LEN]);
            NetworkEndian::write_u16(&mut packet[field::CHECKSUM], value);
        }
    }
}
