//! The address resolution layer.
//!
//! Owns the neighbor cache mapping protocol addresses to hardware addresses and the set of local
//! bindings it answers who-has requests for. The cache learns from every well-formed ARP packet
//! that passes by, which covers gratuitous announcements as well as the replies to our own
//! requests. The IP transmit path resolves next hops here through a reply-slot query.
use std::collections::{HashMap, HashSet};
use std::io;

use log::{debug, trace};

use crate::wire::arp::{Operation, Repr, PACKET_LEN};
use crate::wire::ethernet::EtherType;
use crate::wire::{ethernet, ip};

use super::{await_reply, eth, reply_slot, Mailbox, Process, Reply, Result, Sender};

/// A stack exposing the address resolution layer.
pub trait Provider {
    /// The handle of the address resolution layer.
    fn arp(&self) -> &Handle;
}

/// The message vocabulary of the address resolution layer.
pub enum Message {
    /// An ARP packet arriving from the ethernet layer.
    Ingress(eth::Ingress),
    /// Resolve a protocol address to a hardware address from the cache.
    Lookup {
        /// The protocol address to resolve.
        addr: ip::Address,
        /// Answered with the cached mapping, if any.
        reply: Reply<Option<ethernet::Address>>,
    },
    /// Answer who-has requests for a local address from now on.
    Bind(ip::Address),
    /// Insert a static neighbor entry.
    Add {
        /// The protocol address of the neighbor.
        addr: ip::Address,
        /// Its hardware address.
        hw_addr: ethernet::Address,
    },
}

/// The addressable reference to the address resolution layer.
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

    /// Resolve a protocol address against the neighbor cache.
    ///
    /// Blocks the calling process until the cache answers. Only ever called from layers below
    /// this one in the dependency order, so the query can not cycle.
    pub fn lookup(&self, addr: ip::Address) -> Result<Option<ethernet::Address>> {
        let (reply, answer) = reply_slot();
        self.tx.send(Message::Lookup { addr, reply });
        await_reply(answer)
    }

    /// Answer who-has requests for a local address.
    pub fn bind(&self, addr: ip::Address) {
        self.tx.send(Message::Bind(addr));
    }

    /// Insert a static neighbor entry.
    pub fn add_entry(&self, addr: ip::Address, hw_addr: ethernet::Address) {
        self.tx.send(Message::Add { addr, hw_addr });
    }
}

/// The resolution state, touched only by its process loop.
struct Endpoint {
    eth: eth::Handle,
    neighbors: HashMap<ip::Address, ethernet::Address>,
    bound: HashSet<ip::Address>,
}

impl Endpoint {
    fn ingress(&mut self, ingress: eth::Ingress) {
        let repr = match Repr::parse(&ingress.payload) {
            Ok(repr) => repr,
            Err(err) => {
                ingress.device.stats().note_decode_dropped();
                debug!("undecodable arp packet: {}", err);
                return;
            }
        };

        // Learn the sender mapping regardless of the operation.
        if repr.source_hardware_addr.is_unicast() && !repr.source_protocol_addr.is_unspecified() {
            self.neighbors.insert(repr.source_protocol_addr, repr.source_hardware_addr);
        }

        if repr.operation == Operation::Request && self.bound.contains(&repr.target_protocol_addr)
        {
            let answer = Repr {
                operation: Operation::Reply,
                source_hardware_addr: ingress.device.addr(),
                source_protocol_addr: repr.target_protocol_addr,
                target_hardware_addr: repr.source_hardware_addr,
                target_protocol_addr: repr.source_protocol_addr,
            };
            let mut packet = vec![0; PACKET_LEN];
            answer.emit(&mut packet);
            self.eth.transmit(
                ingress.device,
                repr.source_hardware_addr,
                EtherType::Arp,
                packet,
            );
        } else {
            trace!(
                "arp {:?} for {} ignored",
                repr.operation,
                repr.target_protocol_addr
            );
        }
    }
}

impl Process for Endpoint {
    type Message = Message;

    fn process(&mut self, message: Message) {
        match message {
            Message::Ingress(ingress) => self.ingress(ingress),
            Message::Lookup { addr, reply } => {
                let _ = reply.send(self.neighbors.get(&addr).copied());
            }
            Message::Bind(addr) => {
                self.bound.insert(addr);
            }
            Message::Add { addr, hw_addr } => {
                self.neighbors.insert(addr, hw_addr);
            }
        }
    }
}

/// Start the address resolution process and claim `EtherType::Arp` below it.
pub(crate) fn start<S>(mailbox: Mailbox<Message>, stack: &S) -> io::Result<()>
where
    S: eth::Provider,
{
    let ingress = mailbox.sender();
    stack.ethernet().register(
        EtherType::Arp,
        Box::new(move |frame: eth::Ingress| ingress.send(Message::Ingress(frame))),
    );

    let endpoint = Endpoint {
        eth: stack.ethernet().clone(),
        neighbors: HashMap::new(),
        bound: HashSet::new(),
    };
    super::spawn("arp", mailbox, endpoint)
}

#[cfg(test)]
mod tests;
