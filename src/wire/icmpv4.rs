//! The Internet Control Message Protocol for IPv4, rfc792.
//!
//! Only the message kinds the stack produces or answers are represented: echo in both directions
//! and destination-unreachable. Everything else parses to `Malformed` and is counted as a decode
//! drop by the layer above.
use byteorder::{ByteOrder, NetworkEndian};

use super::ip::checksum;
use super::{Checksum, Error, Result};

enum_with_unknown! {
    /// The message type of an ICMPv4 packet.
    pub enum Message(u8) {
        /// An answer to an echo request.
        EchoReply = 0,
        /// A delivery failure report.
        DstUnreachable = 3,
        /// A request to be answered with an echo reply.
        EchoRequest = 8,
    }
}

/// The code signalling an unreachable port in a `DstUnreachable` message.
pub const CODE_PORT_UNREACHABLE: u8 = 3;

/// The length of the fixed ICMPv4 header.
pub const HEADER_LEN: usize = 8;

mod field {
    use core::ops::Range;

    pub(super) const TYPE: usize = 0;
    pub(super) const CODE: usize = 1;
    pub(super) const CHECKSUM: Range<usize> = 2..4;
    pub(super) const IDENT: Range<usize> = 4..6;
    pub(super) const SEQ_NO: Range<usize> = 6..8;
}

/// A high-level representation of an ICMPv4 packet.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Repr<'a> {
    /// An echo request carrying opaque data to be mirrored back.
    EchoRequest {
        /// An identifier chosen by the sender.
        ident: u16,
        /// A sequence number chosen by the sender.
        seq_no: u16,
        /// The data to mirror.
        payload: &'a [u8],
    },
    /// An echo reply mirroring a request.
    EchoReply {
        /// The identifier of the mirrored request.
        ident: u16,
        /// The sequence number of the mirrored request.
        seq_no: u16,
        /// The mirrored data.
        payload: &'a [u8],
    },
    /// A delivery failure, quoting the offending packet.
    DstUnreachable {
        /// The failure class, e.g. [`CODE_PORT_UNREACHABLE`].
        code: u8,
        /// The quoted IP header plus the first octets of its payload.
        original: &'a [u8],
    },
}

impl<'a> Repr<'a> {
    /// Parse an ICMPv4 packet.
    ///
    /// With `Checksum::Manual` the message checksum is verified first.
    pub fn parse(packet: &'a [u8], checksum_mode: Checksum) -> Result<Repr<'a>> {
        if packet.len() < HEADER_LEN {
            return Err(Error::Truncated);
        }

        if checksum_mode == Checksum::Manual && checksum::data(packet) != 0xffff {
            return Err(Error::Malformed);
        }

        let ident = NetworkEndian::read_u16(&packet[field::IDENT]);
        let seq_no = NetworkEndian::read_u16(&packet[field::SEQ_NO]);

        match (packet[field::TYPE].into(), packet[field::CODE]) {
            (Message::EchoRequest, 0) => Ok(Repr::EchoRequest {
                ident,
                seq_no,
                payload: &packet[HEADER_LEN..],
            }),
            (Message::EchoReply, 0) => Ok(Repr::EchoReply {
                ident,
                seq_no,
                payload: &packet[HEADER_LEN..],
            }),
            (Message::DstUnreachable, code) => Ok(Repr::DstUnreachable {
                code,
                original: &packet[HEADER_LEN..],
            }),
            _ => Err(Error::Malformed),
        }
    }

    /// The buffer size required to emit this packet.
    pub fn buffer_len(&self) -> usize {
        match self {
            Repr::EchoRequest { payload, .. } | Repr::EchoReply { payload, .. } => {
                HEADER_LEN + payload.len()
            }
            Repr::DstUnreachable { original, .. } => HEADER_LEN + original.len(),
        }
    }

    /// Emit the packet into a buffer.
    ///
    /// # Panics
    /// The buffer must hold at least [`Repr::buffer_len`] octets.
    pub fn emit(&self, packet: &mut [u8], checksum_mode: Checksum) {
        let len = self.buffer_len();
        packet[..HEADER_LEN].iter_mut().for_each(|b| *b = 0);

        match *self {
            Repr::EchoRequest { ident, seq_no, payload } => {
                packet[field::TYPE] = Message::EchoRequest.into();
                NetworkEndian::write_u16(&mut packet[field::IDENT], ident);
                NetworkEndian::write_u16(&mut packet[field::SEQ_NO], seq_no);
                packet[HEADER_LEN..len].copy_from_slice(payload);
            }
            Repr::EchoReply { ident, seq_no, payload } => {
                packet[field::TYPE] = Message::EchoReply.into();
                NetworkEndian::write_u16(&mut packet[field::IDENT], ident);
                NetworkEndian::write_u16(&mut packet[field::SEQ_NO], seq_no);
                packet[HEADER_LEN..len].copy_from_slice(payload);
            }
            Repr::DstUnreachable { code, original } => {
                packet[field::TYPE] = Message::DstUnreachable.into();
                packet[field::CODE] = code;
                packet[HEADER_LEN..len].copy_from_slice(original);
            }
        }

        if checksum_mode == Checksum::Manual {
            let value = !checksum::data(&packet[..len]);
            NetworkEndian::write_u16(&mut packet[field::CHECKSUM], value);
        }
    }
}
