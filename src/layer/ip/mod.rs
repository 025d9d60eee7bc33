//! The IPv4 layer.
//!
//! Validates and demultiplexes ingress packets to the upper protocol that claimed their protocol
//! number, owns the routing table, and answers route queries for the senders above. The actual
//! transmit path is the free function [`transmit`]: it only needs the ethernet and resolution
//! layers, so upper layers that already resolved a route (ICMP answering an echo, the forwarding
//! re-injection) can emit packets without a detour through this layer's mailbox.
use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use log::{debug, trace};

use crate::nic::Device;
use crate::wire::ethernet::EtherType;
use crate::wire::ip::{Address, Cidr, Protocol};
use crate::wire::{ethernet, ipv4};

use super::{arp, await_reply, eth, reply_slot, Mailbox, Process, Reply, Result, Sender};

mod route;

pub use route::RouteInfo;

use route::Routes;

/// A stack exposing the IPv4 layer.
pub trait Provider {
    /// The handle of the IPv4 layer.
    fn ip(&self) -> &Handle;
}

/// A packet payload on its way up, after IPv4 processing.
pub struct Ingress {
    /// The device the packet arrived on.
    pub device: Arc<Device>,
    /// The sender of the packet.
    pub src_addr: Address,
    /// The local address it was sent to.
    pub dst_addr: Address,
    /// The packet payload, IP header stripped and padding cut.
    pub payload: Vec<u8>,
}

/// A handler for one IP protocol number, registered by an upper layer.
pub(crate) type Handler = Box<dyn FnMut(Ingress) + Send>;

/// The message vocabulary of the IPv4 layer.
pub enum Message {
    /// A packet arriving from the ethernet layer.
    Ingress(eth::Ingress),
    /// Transmit a payload as an IPv4 packet.
    Send {
        /// A previously resolved route; looked up from the table when absent.
        route: Option<RouteInfo>,
        /// The destination address.
        dst_addr: Address,
        /// The protocol number of the payload.
        protocol: Protocol,
        /// The packet payload.
        payload: Vec<u8>,
    },
    /// Bind a local address on a device, creating a direct route.
    AddAddress {
        /// The device the address lives on.
        device: Arc<Device>,
        /// The address and its network prefix.
        cidr: Cidr,
        /// The maximum transmission unit for the created route.
        mtu: usize,
    },
    /// Add an indirect route through a gateway.
    AddRoute {
        /// The routed network.
        net: Cidr,
        /// The gateway to send through, must be on-link.
        gateway: Address,
        /// Answered once the table was updated.
        reply: Reply<Result<()>>,
    },
    /// Resolve the route a destination would take.
    Route {
        /// The destination to resolve.
        dst_addr: Address,
        /// Answered with the best match, if any.
        reply: Reply<Option<RouteInfo>>,
    },
    /// Register the handler of an upper layer for a protocol number.
    Register {
        /// The protocol number to claim.
        protocol: Protocol,
        /// The receiving handler.
        handler: Handler,
    },
    /// Remove the handler for a protocol number.
    Unregister(Protocol),
}

/// The addressable reference to the IPv4 layer.
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

    /// Transmit a payload as an IPv4 packet.
    ///
    /// The route is looked up when the caller has none; an unroutable destination is a counted
    /// drop, matching the fate of any other undeliverable packet.
    pub fn send(
        &self,
        route: Option<RouteInfo>,
        dst_addr: Address,
        protocol: Protocol,
        payload: Vec<u8>,
    ) {
        self.tx.send(Message::Send { route, dst_addr, protocol, payload });
    }

    /// Bind a local address on a device, creating a direct route.
    pub fn add_address(&self, device: Arc<Device>, cidr: Cidr, mtu: usize) {
        self.tx.send(Message::AddAddress { device, cidr, mtu });
    }

    /// Add an indirect route through a gateway.
    pub fn add_route(&self, net: Cidr, gateway: Address) -> Result<()> {
        let (reply, answer) = reply_slot();
        self.tx.send(Message::AddRoute { net, gateway, reply });
        await_reply(answer)?
    }

    /// Resolve the route a destination would take.
    ///
    /// Blocks the calling process; only called from layers above this one.
    pub fn route(&self, dst_addr: Address) -> Result<Option<RouteInfo>> {
        let (reply, answer) = reply_slot();
        self.tx.send(Message::Route { dst_addr, reply });
        await_reply(answer)
    }

    /// Register a handler for an IP protocol number.
    pub fn register(&self, protocol: Protocol, handler: impl FnMut(Ingress) + Send + 'static) {
        self.tx.send(Message::Register { protocol, handler: Box::new(handler) });
    }

    /// Remove the handler for an IP protocol number.
    pub fn unregister(&self, protocol: Protocol) {
        self.tx.send(Message::Unregister(protocol));
    }
}

/// Emit an IPv4 packet towards a resolved route.
///
/// Needs only the layers below IP: the next hop is resolved through the neighbor cache and the
/// finished packet is framed by the ethernet layer. A missing neighbor entry drops the packet —
/// queueing behind an outstanding resolution would hide unbounded state here, and the upper
/// layers all tolerate loss.
pub(crate) fn transmit(
    eth: &eth::Handle,
    arp: &arp::Handle,
    route: &RouteInfo,
    dst_addr: Address,
    protocol: Protocol,
    payload: Vec<u8>,
) {
    let repr = ipv4::Repr {
        src_addr: route.source,
        dst_addr,
        protocol,
        payload_len: payload.len(),
        hop_limit: 64,
    };

    if repr.total_len() > route.mtu {
        debug!("packet of {} octets exceeds mtu {}", repr.total_len(), route.mtu);
        return;
    }

    let dst_hw = if dst_addr.is_broadcast() {
        ethernet::Address::BROADCAST
    } else {
        match arp.lookup(route.next_hop) {
            Ok(Some(hw_addr)) => hw_addr,
            _ => {
                trace!("no neighbor entry for {}", route.next_hop);
                return;
            }
        }
    };

    let checksum = route.device.personality().capabilities().ipv4().tx_checksum();
    let mut packet = vec![0; repr.total_len()];
    repr.emit(&mut packet, checksum);
    packet[ipv4::HEADER_LEN..].copy_from_slice(&payload);

    eth.transmit(route.device.clone(), dst_hw, EtherType::Ipv4, packet);
}

/// The IPv4 layer state, touched only by its process loop.
struct Endpoint {
    eth: eth::Handle,
    arp: arp::Handle,
    routes: Routes,
    handlers: HashMap<Protocol, Handler>,
}

impl Endpoint {
    fn ingress(&mut self, ingress: eth::Ingress) {
        let eth::Ingress { device, payload } = ingress;

        let checksum = device.personality().capabilities().ipv4().rx_checksum();
        let (repr, payload) = match ipv4::Repr::parse(&payload, checksum) {
            Ok(parsed) => parsed,
            Err(err) => {
                device.stats().note_decode_dropped();
                debug!("undecodable packet on {}: {}", device.name(), err);
                return;
            }
        };

        if !self.routes.is_local(repr.dst_addr) {
            // Not ours and this host does not forward at the IP level.
            device.stats().note_filtered();
            trace!("packet for {} not locally deliverable", repr.dst_addr);
            return;
        }

        match self.handlers.get_mut(&repr.protocol) {
            Some(handler) => handler(Ingress {
                device,
                src_addr: repr.src_addr,
                dst_addr: repr.dst_addr,
                payload: payload.to_vec(),
            }),
            None => trace!("no handler for protocol {}", repr.protocol),
        }
    }

    fn egress(
        &mut self,
        route: Option<RouteInfo>,
        dst_addr: Address,
        protocol: Protocol,
        payload: Vec<u8>,
    ) {
        let route = match route.or_else(|| self.routes.lookup(dst_addr)) {
            Some(route) => route,
            None => {
                debug!("no route to {}", dst_addr);
                return;
            }
        };
        transmit(&self.eth, &self.arp, &route, dst_addr, protocol, payload);
    }
}

impl Process for Endpoint {
    type Message = Message;

    fn process(&mut self, message: Message) {
        match message {
            Message::Ingress(ingress) => self.ingress(ingress),
            Message::Send { route, dst_addr, protocol, payload } => {
                self.egress(route, dst_addr, protocol, payload)
            }
            Message::AddAddress { device, cidr, mtu } => {
                self.routes.add_direct(device, cidr, mtu);
            }
            Message::AddRoute { net, gateway, reply } => {
                let _ = reply.send(self.routes.add_gateway(net, gateway));
            }
            Message::Route { dst_addr, reply } => {
                let _ = reply.send(self.routes.lookup(dst_addr));
            }
            Message::Register { protocol, handler } => {
                self.handlers.insert(protocol, handler);
            }
            Message::Unregister(protocol) => {
                self.handlers.remove(&protocol);
            }
        }
    }
}

/// Start the IPv4 layer process and claim `EtherType::Ipv4` below it.
pub(crate) fn start<S>(mailbox: Mailbox<Message>, stack: &S) -> io::Result<()>
where
    S: eth::Provider + arp::Provider,
{
    let ingress = mailbox.sender();
    stack.ethernet().register(
        EtherType::Ipv4,
        Box::new(move |frame: eth::Ingress| ingress.send(Message::Ingress(frame))),
    );

    let endpoint = Endpoint {
        eth: stack.ethernet().clone(),
        arp: stack.arp().clone(),
        routes: Routes::new(),
        handlers: HashMap::new(),
    };
    super::spawn("ip", mailbox, endpoint)
}
