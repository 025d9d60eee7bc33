//! The UDP layer.
//!
//! Owns the socket registry mapping (local address, port) to receiving applications and runs the
//! ingress pipeline over every datagram the IP layer hands up: checksum verification, header
//! decode, local delivery, forwarding fallback. A datagram that finds neither a socket nor a
//! forwarding rule is answered with a port-unreachable report through the ICMP layer.
use std::sync::Arc;

use crossbeam_channel as channel;

use crate::nic::Device;
use crate::wire::ip::Address;
use crate::wire::udp::{Repr, UdpChecksum, HEADER_LEN};

use super::{await_reply, icmp, ip, reply_slot, Error, Mailbox, Reply, Result, Sender};

mod endpoint;
#[cfg(test)]
mod tests;

use endpoint::Endpoint;

/// A stack exposing the UDP layer.
pub trait Provider {
    /// The handle of the UDP layer.
    fn udp(&self) -> &Handle;
}

/// One received datagram, tagged with the flow it belongs to.
#[derive(Debug)]
pub struct Datagram {
    /// The device it arrived on.
    pub device: Arc<Device>,
    /// The sending address.
    pub remote_addr: Address,
    /// The sending port.
    pub remote_port: u16,
    /// The local address it was delivered to.
    pub local_addr: Address,
    /// The local port it was delivered to.
    pub local_port: u16,
    /// The payload, truncated to the declared length.
    pub payload: Vec<u8>,
}

/// The receiving end of a bound UDP port.
///
/// Obtained from [`NetworkStack::udp_bind`](../../struct.NetworkStack.html#method.udp_bind).
/// Dropping the socket removes its registry entry.
pub struct Socket {
    handle: Handle,
    local_addr: Address,
    local_port: u16,
    rx: channel::Receiver<Datagram>,
}

impl Socket {
    /// The local binding of this socket.
    pub fn local(&self) -> (Address, u16) {
        (self.local_addr, self.local_port)
    }

    /// Receive the next datagram, blocking until one arrives.
    pub fn recv(&self) -> Result<Datagram> {
        self.rx.recv().map_err(|_| Error::Closed)
    }

    /// Receive the next datagram if one is already buffered.
    pub fn try_recv(&self) -> Option<Datagram> {
        self.rx.try_recv().ok()
    }

    /// Receive the next datagram, giving up after `timeout`.
    pub fn recv_timeout(&self, timeout: std::time::Duration) -> Option<Datagram> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Send a datagram from this socket's port.
    pub fn send_to(&self, dst_addr: Address, dst_port: u16, payload: Vec<u8>) {
        self.handle.send(dst_addr, Some(self.local_port), dst_port, payload);
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        self.handle.tx.send(Message::Unbind {
            addr: self.local_addr,
            port: self.local_port,
        });
    }
}

/// A forwarding decision for a datagram nobody claimed locally.
pub struct Forward {
    /// The rewritten destination address.
    pub dst_addr: Address,
    /// The rewritten header.
    pub header: Repr,
    /// The route to re-inject on; resolved from the routing table when absent.
    pub route: Option<ip::RouteInfo>,
}

/// The NAT/forwarding collaborator consulted when no local socket claims a datagram.
///
/// Rule evaluation is outside this stack; implementations translate the flow however they see
/// fit and hand back the rewritten coordinates for re-injection into the send path.
pub trait Forwarder: Send {
    /// Decide whether and where to forward a datagram.
    fn try_forward(
        &mut self,
        local_addr: Address,
        remote_addr: Address,
        header: &Repr,
    ) -> Option<Forward>;
}

/// The default collaborator: nothing is ever forwarded.
pub struct NoForward;

impl Forwarder for NoForward {
    fn try_forward(&mut self, _: Address, _: Address, _: &Repr) -> Option<Forward> {
        None
    }
}

/// The message vocabulary of the UDP layer.
pub enum Message {
    /// A datagram arriving through the IP layer.
    Ingress(ip::Ingress),
    /// A raw datagram injected below the socket surface, for tests and forwarders.
    Inject {
        /// The nominal receiving device.
        device: Arc<Device>,
        /// The sender address of the enclosing packet.
        src_addr: Address,
        /// The destination address of the enclosing packet.
        dst_addr: Address,
        /// The raw datagram, header included.
        datagram: Vec<u8>,
    },
    /// Claim a (local address, port) pair for a receiving buffer.
    Bind {
        /// The local address, the unspecified address for a wildcard binding.
        addr: Address,
        /// The local port.
        port: u16,
        /// The buffer to deliver into.
        buffer: channel::Sender<Datagram>,
        /// Answered once the registry was updated.
        reply: Reply<Result<()>>,
    },
    /// Release a (local address, port) pair.
    Unbind {
        /// The bound local address.
        addr: Address,
        /// The bound local port.
        port: u16,
    },
    /// Send a datagram.
    Send {
        /// The destination address.
        dst_addr: Address,
        /// The source port, an ephemeral one is assigned when absent.
        src_port: Option<u16>,
        /// The destination port.
        dst_port: u16,
        /// The payload.
        payload: Vec<u8>,
    },
}

/// The addressable reference to the UDP layer.
#[derive(Clone)]
pub struct Handle {
    tx: Sender<Message>,
}

impl Handle {
    pub(crate) fn new() -> (Handle, Mailbox<Message>) {
        let mailbox = Mailbox::new();
        let handle = Handle { tx: mailbox.sender() };
        (handle, mailbox)
    }

    /// Claim a (local address, port) pair, delivering into `buffer`.
    ///
    /// Fails with [`Error::InUse`] when the pair is already claimed.
    pub(crate) fn bind(
        &self,
        addr: Address,
        port: u16,
        buffer: channel::Sender<Datagram>,
    ) -> Result<()> {
        let (reply, answer) = reply_slot();
        self.tx.send(Message::Bind { addr, port, buffer, reply });
        await_reply(answer)?
    }

    /// Bind and wrap the receiving end into a [`Socket`].
    pub fn socket(&self, addr: Address, port: u16, capacity: usize) -> Result<Socket> {
        let (buffer, rx) = channel::bounded(capacity);
        self.bind(addr, port, buffer)?;
        Ok(Socket {
            handle: self.clone(),
            local_addr: addr,
            local_port: port,
            rx,
        })
    }

    /// Send a datagram to (address, port), optionally from a fixed source port.
    pub fn send(&self, dst_addr: Address, src_port: Option<u16>, dst_port: u16, payload: Vec<u8>) {
        self.tx.send(Message::Send { dst_addr, src_port, dst_port, payload });
    }

    /// Inject a raw datagram below the socket surface, for tests and forwarders.
    pub fn inject(
        &self,
        device: Arc<Device>,
        src_addr: Address,
        dst_addr: Address,
        datagram: Vec<u8>,
    ) {
        self.tx.send(Message::Inject { device, src_addr, dst_addr, datagram });
    }
}

/// Emit a header over a payload and queue the datagram on a resolved route.
///
/// The re-injection seam of the forwarding path, also used by the ordinary send path once it
/// resolved its route. The checksum is computed in software unless the egress device offloads
/// UDP transmit checksums.
pub(crate) fn send_queued(
    ip: &ip::Handle,
    route: ip::RouteInfo,
    dst_addr: Address,
    header: Repr,
    payload: &[u8],
) {
    use crate::wire::Checksum;

    let mut datagram = vec![0; HEADER_LEN + payload.len()];
    datagram[HEADER_LEN..].copy_from_slice(payload);

    let checksum = match route.device.personality().capabilities().udp().tx_checksum() {
        Checksum::Manual => UdpChecksum::Manual { src_addr: route.source, dst_addr },
        Checksum::Ignored => UdpChecksum::Ignored,
    };
    header.emit(&mut datagram, checksum);

    ip.send(Some(route), dst_addr, crate::wire::ip::Protocol::Udp, datagram);
}

/// Start the UDP layer process and claim IP protocol 17 below it.
pub(crate) fn start<S>(
    mailbox: Mailbox<Message>,
    stack: &S,
    forward: Box<dyn Forwarder>,
) -> std::io::Result<()>
where
    S: ip::Provider + icmp::Provider,
{
    let ingress = mailbox.sender();
    stack.ip().register(crate::wire::ip::Protocol::Udp, move |packet: ip::Ingress| {
        ingress.send(Message::Ingress(packet))
    });

    let endpoint = Endpoint::new(stack.ip().clone(), stack.icmp().clone(), forward);
    super::spawn("udp", mailbox, endpoint)
}
