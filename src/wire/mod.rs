/*! Low-level packet access and construction.

The `wire` module deals with the packet *representation*. Each protocol submodule provides a
compact, high-level representation of header data, the `Repr` family of structs and enums, that
can be created by parsing a received byte slice and emitted back into an outgoing buffer. Parsing
validates lengths and structure up front; as long as `parse` returned `Ok`, no later field access
can fail.

Checksums are handled through the [`Checksum`] setting. A network card that verifies or fills
checksums in hardware lets the stack skip the arithmetic entirely; the setting is derived per
device from its personality and threaded through `parse` and `emit` where a protocol carries a
checksum. UDP additionally needs the addresses of the enclosing IP packet for its pseudo header,
captured in [`udp::UdpChecksum`].

# Examples

To emit a UDP datagram into an octet buffer, and then parse it back:

```rust
use lamina::wire::{ip, udp};

let src = ip::Address::new(10, 0, 0, 1);
let dst = ip::Address::new(10, 0, 0, 2);
let repr = udp::Repr { src_port: 4096, dst_port: 53, length: 8 + 4 };

let mut buffer = vec![0; repr.length as usize];
repr.emit(&mut buffer, udp::UdpChecksum::Ignored);
buffer[8..].copy_from_slice(b"ping");
repr.emit(&mut buffer, udp::UdpChecksum::Manual { src_addr: src, dst_addr: dst });

assert!(udp::verify_checksum(&buffer, src, dst));
let (parsed, payload) = udp::Repr::parse(&buffer).unwrap();
assert_eq!(parsed, repr);
assert_eq!(payload, b"ping");
```
*/
use thiserror::Error;

pub mod arp;
pub mod ethernet;
pub mod icmpv4;
pub mod ip;
pub mod ipv4;
pub mod udp;

/// An error returned when parsing malformed input.
///
/// The distinction matters for statistics attribution: a buffer that ends before the fixed header
/// does is `Truncated`, anything structurally wrong beyond that is `Malformed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// The input ended before the fixed header did.
    #[error("truncated packet")]
    Truncated,
    /// A field contradicts the buffer or the protocol definition.
    #[error("malformed packet")]
    Malformed,
}

/// The result type of all parsing operations in this module.
pub type Result<T> = core::result::Result<T, Error>;

/// Controls whether checksums are computed in software.
///
/// A device personality translates its offload capabilities into this setting, see
/// [`Protocol::rx_checksum`](../nic/struct.Protocol.html).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checksum {
    /// Compute and verify the checksum in the stack.
    Manual,
    /// The checksum has been or will be handled by the device.
    Ignored,
}
