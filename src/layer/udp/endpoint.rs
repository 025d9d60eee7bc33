//! The UDP endpoint state and its ingress pipeline.
use std::collections::HashMap;

use std::sync::Arc;

use crossbeam_channel as channel;
use log::{debug, trace};

use crate::layer::{icmp, ip, Process};
use crate::nic::Device;
use crate::wire::ip::Address;
use crate::wire::udp::{verify_checksum, Repr};
use crate::wire::Checksum;

use super::{send_queued, Datagram, Forwarder, Message};

/// The first ephemeral source port handed out, rfc6335.
const EPHEMERAL_FIRST: u16 = 49152;

/// The fate of one received datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// Delivered locally or handed to the forwarding path.
    Consumed,
    /// Discarded for a checksum or decode failure; counted, never answered.
    Dropped,
    /// Well-formed but without recipient or forwarding rule; the caller may answer.
    Refused,
}

/// The UDP layer state, touched only by its process loop.
///
/// The socket registry is the one table of this layer: at most one receiving buffer per
/// (local address, port) pair, the unspecified address acting as a wildcard that exact bindings
/// shadow.
pub(super) struct Endpoint {
    ip: ip::Handle,
    icmp: icmp::Handle,
    sockets: HashMap<(Address, u16), channel::Sender<Datagram>>,
    forward: Box<dyn Forwarder>,
    next_ephemeral: u16,
}

impl Endpoint {
    pub(super) fn new(ip: ip::Handle, icmp: icmp::Handle, forward: Box<dyn Forwarder>) -> Self {
        Endpoint {
            ip,
            icmp,
            sockets: HashMap::new(),
            forward,
            next_ephemeral: EPHEMERAL_FIRST,
        }
    }

    /// Process one received datagram.
    ///
    /// `Consumed` when the datagram reached a local socket or the forwarding path, `Refused`
    /// when no recipient and no forwarding rule existed; the caller decides about a diagnostic
    /// answer then. Checksum and decode failures are counted against the device and end the
    /// pipeline before any later step runs.
    fn ingress(
        &mut self,
        device: &Arc<Device>,
        src_addr: Address,
        dst_addr: Address,
        datagram: &[u8],
    ) -> Outcome {
        // The device may have verified the checksum in hardware already.
        let offloaded =
            device.personality().capabilities().udp().rx_checksum() == Checksum::Ignored;
        if !offloaded && !verify_checksum(datagram, src_addr, dst_addr) {
            device.stats().note_checksum_dropped();
            debug!("bad udp checksum from {}", src_addr);
            return Outcome::Dropped;
        }

        let (header, payload) = match Repr::parse(datagram) {
            Ok(parsed) => parsed,
            Err(err) => {
                device.stats().note_decode_dropped();
                debug!("undecodable udp datagram from {}: {}", src_addr, err);
                return Outcome::Dropped;
            }
        };

        let receiver = self
            .sockets
            .get(&(dst_addr, header.dst_port))
            .or_else(|| self.sockets.get(&(Address::UNSPECIFIED, header.dst_port)));

        if let Some(buffer) = receiver {
            let delivery = buffer.try_send(Datagram {
                device: device.clone(),
                remote_addr: src_addr,
                remote_port: header.src_port,
                local_addr: dst_addr,
                local_port: header.dst_port,
                payload: payload.to_vec(),
            });
            if delivery.is_err() {
                // The recipient exists but is not draining its buffer; that is its loss, not a
                // routing failure.
                device.stats().note_delivery_dropped();
                debug!("receiver backlog on port {}", header.dst_port);
            }
            return Outcome::Consumed;
        }

        if let Some(forward) = self.forward.try_forward(dst_addr, src_addr, &header) {
            let route = match forward.route {
                Some(route) => Some(route),
                None => self.ip.route(forward.dst_addr).ok().flatten(),
            };
            match route {
                Some(route) => {
                    send_queued(&self.ip, route, forward.dst_addr, forward.header, payload)
                }
                None => debug!("forwarding rule without route to {}", forward.dst_addr),
            }
            return Outcome::Consumed;
        }

        trace!("no recipient for port {}", header.dst_port);
        Outcome::Refused
    }

    fn bind(
        &mut self,
        addr: Address,
        port: u16,
        buffer: channel::Sender<Datagram>,
    ) -> crate::layer::Result<()> {
        use std::collections::hash_map::Entry;

        match self.sockets.entry((addr, port)) {
            Entry::Occupied(_) => Err(crate::layer::Error::InUse),
            Entry::Vacant(entry) => {
                entry.insert(buffer);
                Ok(())
            }
        }
    }

    fn egress(
        &mut self,
        dst_addr: Address,
        src_port: Option<u16>,
        dst_port: u16,
        payload: Vec<u8>,
    ) {
        let route = match self.ip.route(dst_addr) {
            Ok(Some(route)) => route,
            _ => {
                debug!("no route to {}", dst_addr);
                return;
            }
        };

        let src_port = src_port.unwrap_or_else(|| self.ephemeral_port());
        let header = Repr {
            src_port,
            dst_port,
            length: (crate::wire::udp::HEADER_LEN + payload.len()) as u16,
        };
        send_queued(&self.ip, route, dst_addr, header, &payload);
    }

    fn ephemeral_port(&mut self) -> u16 {
        let port = self.next_ephemeral;
        self.next_ephemeral = if port == u16::MAX { EPHEMERAL_FIRST } else { port + 1 };
        port
    }
}

impl Process for Endpoint {
    type Message = Message;

    fn process(&mut self, message: Message) {
        match message {
            Message::Ingress(packet) => {
                let ip::Ingress { device, src_addr, dst_addr, payload } = packet;
                if self.ingress(&device, src_addr, dst_addr, &payload) == Outcome::Refused {
                    self.icmp.port_unreachable(device, src_addr, dst_addr, payload);
                }
            }
            Message::Inject { device, src_addr, dst_addr, datagram } => {
                let _ = self.ingress(&device, src_addr, dst_addr, &datagram);
            }
            Message::Bind { addr, port, buffer, reply } => {
                let _ = reply.send(self.bind(addr, port, buffer));
            }
            Message::Unbind { addr, port } => {
                self.sockets.remove(&(addr, port));
            }
            Message::Send { dst_addr, src_port, dst_port, payload } => {
                self.egress(dst_addr, src_port, dst_port, payload)
            }
        }
    }
}
