//! The ICMPv4 layer.
//!
//! Answers echo requests and produces port-unreachable reports on behalf of the UDP layer. Both
//! answers travel back towards the station the offending packet came from, so this layer sits on
//! the ethernet and resolution layers only: the reply route is known without consulting the
//! routing table, the remote is assumed reachable where its packet arrived.
use std::io;
use std::sync::Arc;

use log::{debug, trace};

use crate::nic::Device;
use crate::wire::icmpv4::{Repr, CODE_PORT_UNREACHABLE};
use crate::wire::ip::{Address, Protocol};
use crate::wire::ipv4;

use super::{arp, eth, ip, Mailbox, Process, Sender};

/// A stack exposing the ICMPv4 layer.
pub trait Provider {
    /// The handle of the ICMPv4 layer.
    fn icmp(&self) -> &Handle;
}

/// The message vocabulary of the ICMPv4 layer.
pub enum Message {
    /// An ICMP packet arriving through the IP layer.
    Ingress(ip::Ingress),
    /// Report an undeliverable UDP datagram back to its sender.
    PortUnreachable {
        /// The device the datagram arrived on.
        device: Arc<Device>,
        /// The sender of the datagram.
        src_addr: Address,
        /// The local address it was sent to.
        dst_addr: Address,
        /// The start of the datagram, quoted in the report.
        datagram: Vec<u8>,
    },
    /// Control whether echo requests are answered.
    ///
    /// Answering is on by default, as required in RFC1812, but can be disabled to keep a node
    /// quiet.
    DenyEcho(bool),
}

/// The addressable reference to the ICMPv4 layer.
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

    pub(crate) fn ingress(&self, ingress: ip::Ingress) {
        self.tx.send(Message::Ingress(ingress));
    }

    /// Report an undeliverable UDP datagram back to its sender.
    pub(crate) fn port_unreachable(
        &self,
        device: Arc<Device>,
        src_addr: Address,
        dst_addr: Address,
        datagram: Vec<u8>,
    ) {
        self.tx.send(Message::PortUnreachable { device, src_addr, dst_addr, datagram });
    }

    /// Control whether echo requests are answered.
    pub fn deny_echo(&self, deny: bool) {
        self.tx.send(Message::DenyEcho(deny));
    }
}

/// The ICMP state, touched only by its process loop.
struct Endpoint {
    eth: eth::Handle,
    arp: arp::Handle,
    deny_echo: bool,
}

impl Endpoint {
    /// The reply route back to the requesting station: out the same device, to the remote
    /// directly.
    fn return_route(&self, device: Arc<Device>, local: Address, remote: Address) -> ip::RouteInfo {
        ip::RouteInfo {
            device,
            source: local,
            next_hop: remote,
            mtu: 1500,
        }
    }

    fn ingress(&mut self, ingress: ip::Ingress) {
        let checksum = ingress.device.personality().capabilities().icmpv4().rx_checksum();
        let repr = match Repr::parse(&ingress.payload, checksum) {
            Ok(repr) => repr,
            Err(err) => {
                ingress.device.stats().note_decode_dropped();
                debug!("undecodable icmp packet: {}", err);
                return;
            }
        };

        match repr {
            Repr::EchoRequest { ident, seq_no, payload } if !self.deny_echo => {
                let answer = Repr::EchoReply { ident, seq_no, payload };
                let mut packet = vec![0; answer.buffer_len()];
                answer.emit(
                    &mut packet,
                    ingress.device.personality().capabilities().icmpv4().tx_checksum(),
                );

                let route =
                    self.return_route(ingress.device.clone(), ingress.dst_addr, ingress.src_addr);
                ip::transmit(
                    &self.eth,
                    &self.arp,
                    &route,
                    ingress.src_addr,
                    Protocol::Icmp,
                    packet,
                );
            }
            other => trace!("icmp message ignored: {:?}", other),
        }
    }

    fn port_unreachable(
        &mut self,
        device: Arc<Device>,
        src_addr: Address,
        dst_addr: Address,
        datagram: Vec<u8>,
    ) {
        // Quote the offending IP header plus the leading octets of the datagram, rfc792.
        let quoted_len = datagram.len().min(8);
        let header = ipv4::Repr {
            src_addr,
            dst_addr,
            protocol: Protocol::Udp,
            payload_len: datagram.len(),
            hop_limit: 64,
        };
        let mut original = vec![0; ipv4::HEADER_LEN + quoted_len];
        header.emit(&mut original, crate::wire::Checksum::Manual);
        original[ipv4::HEADER_LEN..].copy_from_slice(&datagram[..quoted_len]);

        let report = Repr::DstUnreachable { code: CODE_PORT_UNREACHABLE, original: &original };
        let mut packet = vec![0; report.buffer_len()];
        report.emit(&mut packet, device.personality().capabilities().icmpv4().tx_checksum());

        let route = self.return_route(device, dst_addr, src_addr);
        ip::transmit(&self.eth, &self.arp, &route, src_addr, Protocol::Icmp, packet);
    }
}

impl Process for Endpoint {
    type Message = Message;

    fn process(&mut self, message: Message) {
        match message {
            Message::Ingress(ingress) => self.ingress(ingress),
            Message::PortUnreachable { device, src_addr, dst_addr, datagram } => {
                self.port_unreachable(device, src_addr, dst_addr, datagram)
            }
            Message::DenyEcho(deny) => self.deny_echo = deny,
        }
    }
}

/// Start the ICMPv4 layer process.
///
/// The ingress registration with the IP layer happens during stack composition: this layer
/// starts before IP in the dependency order and thus can not register itself the way UDP and TCP
/// do.
pub(crate) fn start<S>(mailbox: Mailbox<Message>, stack: &S) -> io::Result<()>
where
    S: eth::Provider + arp::Provider,
{
    let endpoint = Endpoint {
        eth: stack.ethernet().clone(),
        arp: stack.arp().clone(),
        deny_echo: false,
    };
    super::spawn("icmp", mailbox, endpoint)
}

#[cfg(test)]
mod tests;
