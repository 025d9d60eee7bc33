/*! A user-space network protocol stack built from message-passing layer processes.

Every protocol layer (ethernet, ARP, IPv4, ICMPv4, UDP, TCP, DNS) runs as an independent
process owning its own state; layers interact exclusively by posting typed messages to each
other's mailboxes. [`NetworkStack::new`] wires and starts all of them in dependency order and
returns an addressable handle bundle that applications drive directly.

The complex collaborators the stack does not implement itself, the TCP state machine, name
resolution and datagram forwarding, plug in through the traits in [`layer::tcp`],
[`layer::dns`] and [`layer::udp`] via [`Config`].

# Examples

Bring up a stack on one device and bind a UDP port:

```rust,no_run
use lamina::NetworkStack;
use lamina::nic::{Device, Personality};
use lamina::wire::{ethernet, ip};

# fn main() -> Result<(), Box<dyn std::error::Error>> {
let stack = NetworkStack::new()?;

let mac = ethernet::Address([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
let (device, _tx_frames) = Device::new("eth0", mac, Personality::baseline());
stack.add_device(device.clone());
stack.device_up("eth0");
stack.add_address(device, ip::Cidr::new(ip::Address::new(10, 0, 0, 1), 24), 1500);

let socket = stack.udp_bind(ip::Address::new(10, 0, 0, 1), 53)?;
let datagram = socket.recv()?;
println!("{} octets from {}", datagram.payload.len(), datagram.remote_addr);
# Ok(()) }
```
*/
#![warn(missing_docs)]

#[macro_use]
mod macros;

pub mod layer;
pub mod nic;
pub mod wire;

mod stack;

pub use stack::{Config, NetworkStack};
