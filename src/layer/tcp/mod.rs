//! The TCP layer.
//!
//! The connection state machine is an external collaborator behind the [`Engine`] trait: this
//! layer owns its mailbox, claims IP protocol 6 and serializes every segment, socket call and
//! timer into engine invocations, but has no opinion on sequence numbers or congestion. The
//! default engine refuses every operation, which turns the layer into a counting sink until a
//! real state machine is configured.
use std::io;
use std::sync::Arc;
use std::time::Duration;

use log::trace;

use crate::nic::Device;
use crate::wire::ip::{Address, Protocol};

use super::{await_reply, ip, reply_slot, send_after, Error, Mailbox, Process, Reply, Result, Sender};

/// A stack exposing the TCP layer.
pub trait Provider {
    /// The handle of the TCP layer.
    fn tcp(&self) -> &Handle;
}

/// An opaque reference to one connection or listener inside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketId(pub u64);

/// The services the layer puts at the engine's disposal.
///
/// Everything the state machine needs from the stack goes through here, so an engine never
/// holds a layer handle of its own: segment transmission rides the IP send path, route queries
/// resolve the source address for a connect, and [`Context::schedule`] arranges a timer token
/// to come back through the layer mailbox, serialized with all other engine calls.
pub struct Context {
    ip: ip::Handle,
    timers: Sender<Message>,
}

impl Context {
    /// Transmit a finished segment towards a destination.
    pub fn transmit(&self, route: Option<ip::RouteInfo>, dst_addr: Address, segment: Vec<u8>) {
        self.ip.send(route, dst_addr, Protocol::Tcp, segment);
    }

    /// Resolve the route a destination would take.
    pub fn route(&self, dst_addr: Address) -> Result<Option<ip::RouteInfo>> {
        self.ip.route(dst_addr)
    }

    /// Deliver `token` back to the engine through [`Engine::timer`] after a delay.
    pub fn schedule(&self, delay: Duration, token: u64) {
        send_after(&self.timers, delay, Message::Timer(token));
    }
}

/// The connection state machine driven by this layer.
///
/// Invoked only from the layer process, one call at a time, so implementations need no interior
/// locking. Per-segment failures must stay local: an engine drops what it can not handle and
/// returns, it never panics the layer loop.
pub trait Engine: Send {
    /// Process one received segment, addressed as (source, destination).
    ///
    /// The receiving device is passed along for its statistics and checksum offload
    /// personality; segment checksum verification lives in the engine.
    fn segment(
        &mut self,
        ctx: &mut Context,
        device: &Arc<Device>,
        src_addr: Address,
        dst_addr: Address,
        segment: &[u8],
    );

    /// Open a passive socket on (address, port).
    fn listen(&mut self, ctx: &mut Context, addr: Address, port: u16) -> Result<SocketId>;

    /// Open an active connection to (address, port), from a fixed local port when given.
    fn connect(
        &mut self,
        ctx: &mut Context,
        addr: Address,
        port: u16,
        local_port: Option<u16>,
    ) -> Result<SocketId>;

    /// Take the next established connection off a listening socket.
    fn accept(&mut self, ctx: &mut Context, socket: SocketId) -> Result<SocketId>;

    /// Close a connection or listener.
    fn close(&mut self, ctx: &mut Context, socket: SocketId) -> Result<()>;

    /// Queue payload on a connection, returning the number of octets taken.
    fn send(&mut self, ctx: &mut Context, socket: SocketId, payload: &[u8]) -> Result<usize>;

    /// Take received payload off a connection.
    fn recv(&mut self, ctx: &mut Context, socket: SocketId) -> Result<Vec<u8>>;

    /// A timer scheduled through [`Context::schedule`] expired.
    fn timer(&mut self, ctx: &mut Context, token: u64) {
        let _ = (ctx, token);
    }
}

/// The default engine: no state machine is configured.
///
/// Segments are counted against the receiving device and discarded; every socket operation
/// fails with [`Error::Unsupported`].
pub struct Disabled;

impl Engine for Disabled {
    fn segment(
        &mut self,
        _: &mut Context,
        device: &Arc<Device>,
        src_addr: Address,
        _: Address,
        _: &[u8],
    ) {
        device.stats().note_filtered();
        trace!("tcp segment from {} discarded, no engine", src_addr);
    }

    fn listen(&mut self, _: &mut Context, _: Address, _: u16) -> Result<SocketId> {
        Err(Error::Unsupported)
    }

    fn connect(&mut self, _: &mut Context, _: Address, _: u16, _: Option<u16>) -> Result<SocketId> {
        Err(Error::Unsupported)
    }

    fn accept(&mut self, _: &mut Context, _: SocketId) -> Result<SocketId> {
        Err(Error::Unsupported)
    }

    fn close(&mut self, _: &mut Context, _: SocketId) -> Result<()> {
        Err(Error::Unsupported)
    }

    fn send(&mut self, _: &mut Context, _: SocketId, _: &[u8]) -> Result<usize> {
        Err(Error::Unsupported)
    }

    fn recv(&mut self, _: &mut Context, _: SocketId) -> Result<Vec<u8>> {
        Err(Error::Unsupported)
    }
}

/// The message vocabulary of the TCP layer.
pub enum Message {
    /// A segment arriving through the IP layer.
    Ingress(ip::Ingress),
    /// Open a passive socket on (address, port).
    Listen {
        /// The local address, the unspecified address for a wildcard.
        addr: Address,
        /// The local port.
        port: u16,
        /// Answered with the listening socket.
        reply: Reply<Result<SocketId>>,
    },
    /// Open an active connection.
    Connect {
        /// The remote address.
        addr: Address,
        /// The remote port.
        port: u16,
        /// The local port, an ephemeral one is assigned when absent.
        local_port: Option<u16>,
        /// Answered with the connected socket.
        reply: Reply<Result<SocketId>>,
    },
    /// Take the next established connection off a listening socket.
    Accept {
        /// The listening socket.
        socket: SocketId,
        /// Answered with the accepted connection.
        reply: Reply<Result<SocketId>>,
    },
    /// Close a connection or listener.
    Close {
        /// The socket to close.
        socket: SocketId,
        /// Answered once the engine let go of the socket.
        reply: Reply<Result<()>>,
    },
    /// Queue payload on a connection.
    Send {
        /// The connection to send on.
        socket: SocketId,
        /// The payload to queue.
        payload: Vec<u8>,
        /// Answered with the number of octets taken.
        reply: Reply<Result<usize>>,
    },
    /// Take received payload off a connection.
    Recv {
        /// The connection to read from.
        socket: SocketId,
        /// Answered with the drained payload.
        reply: Reply<Result<Vec<u8>>>,
    },
    /// A timer scheduled by the engine expired.
    Timer(u64),
}

/// The addressable reference to the TCP layer.
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

    /// Open a passive socket on (address, port).
    pub fn listen(&self, addr: Address, port: u16) -> Result<SocketId> {
        let (reply, answer) = reply_slot();
        self.tx.send(Message::Listen { addr, port, reply });
        await_reply(answer)?
    }

    /// Open an active connection to (address, port).
    pub fn connect(&self, addr: Address, port: u16, local_port: Option<u16>) -> Result<SocketId> {
        let (reply, answer) = reply_slot();
        self.tx.send(Message::Connect { addr, port, local_port, reply });
        await_reply(answer)?
    }

    /// Take the next established connection off a listening socket.
    pub fn accept(&self, socket: SocketId) -> Result<SocketId> {
        let (reply, answer) = reply_slot();
        self.tx.send(Message::Accept { socket, reply });
        await_reply(answer)?
    }

    /// Close a connection or listener.
    pub fn close(&self, socket: SocketId) -> Result<()> {
        let (reply, answer) = reply_slot();
        self.tx.send(Message::Close { socket, reply });
        await_reply(answer)?
    }

    /// Queue payload on a connection, returning the number of octets taken.
    pub fn send(&self, socket: SocketId, payload: Vec<u8>) -> Result<usize> {
        let (reply, answer) = reply_slot();
        self.tx.send(Message::Send { socket, payload, reply });
        await_reply(answer)?
    }

    /// Take received payload off a connection.
    pub fn recv(&self, socket: SocketId) -> Result<Vec<u8>> {
        let (reply, answer) = reply_slot();
        self.tx.send(Message::Recv { socket, reply });
        await_reply(answer)?
    }
}

/// The TCP layer state, touched only by its process loop.
struct Endpoint {
    engine: Box<dyn Engine>,
    ctx: Context,
}

impl Process for Endpoint {
    type Message = Message;

    fn process(&mut self, message: Message) {
        match message {
            Message::Ingress(ingress) => {
                self.engine.segment(
                    &mut self.ctx,
                    &ingress.device,
                    ingress.src_addr,
                    ingress.dst_addr,
                    &ingress.payload,
                );
            }
            Message::Listen { addr, port, reply } => {
                let _ = reply.send(self.engine.listen(&mut self.ctx, addr, port));
            }
            Message::Connect { addr, port, local_port, reply } => {
                let _ = reply.send(self.engine.connect(&mut self.ctx, addr, port, local_port));
            }
            Message::Accept { socket, reply } => {
                let _ = reply.send(self.engine.accept(&mut self.ctx, socket));
            }
            Message::Close { socket, reply } => {
                let _ = reply.send(self.engine.close(&mut self.ctx, socket));
            }
            Message::Send { socket, payload, reply } => {
                let _ = reply.send(self.engine.send(&mut self.ctx, socket, &payload));
            }
            Message::Recv { socket, reply } => {
                let _ = reply.send(self.engine.recv(&mut self.ctx, socket));
            }
            Message::Timer(token) => self.engine.timer(&mut self.ctx, token),
        }
    }
}

/// Start the TCP layer process and claim IP protocol 6 below it.
pub(crate) fn start<S>(mailbox: Mailbox<Message>, stack: &S, engine: Box<dyn Engine>) -> io::Result<()>
where
    S: ip::Provider,
{
    let ingress = mailbox.sender();
    stack.ip().register(Protocol::Tcp, move |packet: ip::Ingress| {
        ingress.send(Message::Ingress(packet))
    });

    let ctx = Context { ip: stack.ip().clone(), timers: mailbox.sender() };
    super::spawn("tcp", mailbox, Endpoint { engine, ctx })
}
