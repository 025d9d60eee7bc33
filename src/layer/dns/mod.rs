//! The name resolution layer.
//!
//! Owns the list of configured name servers and drives an external [`Resolver`] over the UDP
//! layer below it. Wire-level DNS is entirely the resolver's business; this layer only
//! serializes queries with server-list edits so a resolve always sees a consistent list. The
//! default resolver answers nothing.
use std::io;

use crate::wire::ip::Address;

use super::{await_reply, reply_slot, udp, Error, Mailbox, Process, Reply, Result, Sender};

/// A stack exposing the name resolution layer.
pub trait Provider {
    /// The handle of the name resolution layer.
    fn dns(&self) -> &Handle;
}

/// The resolution mechanism driven by this layer.
///
/// Invoked only from the layer process with the current server list and the UDP handle to
/// exchange queries over. A resolver is free to block: the layer processes one query at a time
/// by construction.
pub trait Resolver: Send {
    /// Resolve a host name to its addresses.
    fn resolve(&mut self, udp: &udp::Handle, servers: &[Address], name: &str)
        -> Result<Vec<Address>>;

    /// Resolve an address back to a host name.
    fn reverse(&mut self, udp: &udp::Handle, servers: &[Address], addr: Address) -> Result<String>;
}

/// The default resolver: every query fails with [`Error::Unsupported`].
pub struct Unsupported;

impl Resolver for Unsupported {
    fn resolve(&mut self, _: &udp::Handle, _: &[Address], _: &str) -> Result<Vec<Address>> {
        Err(Error::Unsupported)
    }

    fn reverse(&mut self, _: &udp::Handle, _: &[Address], _: Address) -> Result<String> {
        Err(Error::Unsupported)
    }
}

/// The message vocabulary of the name resolution layer.
pub enum Message {
    /// Append a name server to consult.
    AddServer(Address),
    /// Remove a name server.
    RemoveServer(Address),
    /// Resolve a host name to its addresses.
    Resolve {
        /// The name to resolve.
        name: String,
        /// Answered with the resolved addresses.
        reply: Reply<Result<Vec<Address>>>,
    },
    /// Resolve an address back to a host name.
    Reverse {
        /// The address to resolve.
        addr: Address,
        /// Answered with the resolved name.
        reply: Reply<Result<String>>,
    },
}

/// The addressable reference to the name resolution layer.
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

    /// Append a name server to consult.
    pub fn add_server(&self, addr: Address) {
        self.tx.send(Message::AddServer(addr));
    }

    /// Remove a name server.
    pub fn remove_server(&self, addr: Address) {
        self.tx.send(Message::RemoveServer(addr));
    }

    /// Resolve a host name to its addresses.
    pub fn resolve(&self, name: &str) -> Result<Vec<Address>> {
        let (reply, answer) = reply_slot();
        self.tx.send(Message::Resolve { name: name.into(), reply });
        await_reply(answer)?
    }

    /// Resolve an address back to a host name.
    pub fn reverse(&self, addr: Address) -> Result<String> {
        let (reply, answer) = reply_slot();
        self.tx.send(Message::Reverse { addr, reply });
        await_reply(answer)?
    }
}

/// The resolution state, touched only by its process loop.
struct Endpoint {
    udp: udp::Handle,
    servers: Vec<Address>,
    resolver: Box<dyn Resolver>,
}

impl Process for Endpoint {
    type Message = Message;

    fn process(&mut self, message: Message) {
        match message {
            Message::AddServer(addr) => {
                if !self.servers.contains(&addr) {
                    self.servers.push(addr);
                }
            }
            Message::RemoveServer(addr) => {
                self.servers.retain(|server| *server != addr);
            }
            Message::Resolve { name, reply } => {
                let _ = reply.send(self.resolver.resolve(&self.udp, &self.servers, &name));
            }
            Message::Reverse { addr, reply } => {
                let _ = reply.send(self.resolver.reverse(&self.udp, &self.servers, addr));
            }
        }
    }
}

/// Start the name resolution process.
pub(crate) fn start<S>(
    mailbox: Mailbox<Message>,
    stack: &S,
    resolver: Box<dyn Resolver>,
) -> io::Result<()>
where
    S: udp::Provider,
{
    let endpoint = Endpoint {
        udp: stack.udp().clone(),
        servers: Vec::new(),
        resolver,
    };
    super::spawn("dns", mailbox, endpoint)
}
