/*! The protocol layers and the message-passing fabric between them.

Every layer (`eth`, `arp`, `icmp`, `ip`, `udp`, `tcp`, `dns`) is an independent process: a thread
that owns a [`Mailbox`] and is the only code to ever touch that layer's state. Cross-layer
interaction is a message send, never a call into shared state, so no layer needs locking around
its tables — the mailbox is the serialization point.

A layer module follows a fixed shape. Its `Handle` wraps a clonable [`Sender`] and offers typed
methods for posting; its `Message` enum is the complete vocabulary of the layer; its private
endpoint struct implements [`Process`] and holds every table the layer owns; and its `start`
function is generic over the `Provider` traits of the layers it depends on, which is how a
concrete stack is wired without any layer knowing the stack type.

Queries that need an answer (an ARP lookup, a route resolution, a bind) carry a bounded reply
channel inside the message and block the asking process until the owning process responds. The
dependency order of the stack guarantees these can not cycle: queries only ever flow downwards.
*/
use std::io;
use std::thread;
use std::time::Duration;

use crossbeam_channel as channel;
use log::error;
use thiserror::Error as ThisError;

pub mod arp;
pub mod dns;
pub mod eth;
pub mod icmp;
pub mod ip;
pub mod tcp;
pub mod udp;

use crate::wire;

/// The error type shared by all layer operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
pub enum Error {
    /// A packet or argument that does not decode.
    #[error("malformed packet")]
    Malformed,
    /// No route or neighbor for the destination.
    #[error("destination unreachable")]
    Unreachable,
    /// The local address and port are taken.
    #[error("address in use")]
    InUse,
    /// A buffer or port range ran out.
    #[error("resource exhausted")]
    Exhausted,
    /// The queried layer or socket has shut down.
    #[error("endpoint closed")]
    Closed,
    /// The operation is not provided by the configured collaborator.
    #[error("operation not supported")]
    Unsupported,
}

impl From<wire::Error> for Error {
    fn from(_: wire::Error) -> Error {
        Error::Malformed
    }
}

/// The result type of all layer operations.
pub type Result<T> = core::result::Result<T, Error>;

/// The consumer end of a layer's message queue.
///
/// Unbounded and ordered: one process receives, any number of senders enqueue without ever
/// blocking. Messages from one sender arrive in send order; across senders, in arrival order.
/// Created once at stack construction and consumed by [`spawn`].
pub struct Mailbox<M> {
    tx: channel::Sender<M>,
    rx: channel::Receiver<M>,
}

impl<M> Mailbox<M> {
    /// Create an empty mailbox.
    pub fn new() -> Self {
        let (tx, rx) = channel::unbounded();
        Mailbox { tx, rx }
    }

    /// Create another sender for this mailbox.
    pub fn sender(&self) -> Sender<M> {
        Sender { tx: self.tx.clone() }
    }
}

impl<M> Default for Mailbox<M> {
    fn default() -> Self {
        Mailbox::new()
    }
}

/// A producer end of a [`Mailbox`].
pub struct Sender<M> {
    tx: channel::Sender<M>,
}

impl<M> Sender<M> {
    /// Enqueue a message without blocking.
    ///
    /// A send can only be refused when the owning process has already terminated, that is during
    /// stack teardown; the message is discarded then.
    pub fn send(&self, message: M) {
        let _ = self.tx.send(message);
    }
}

// Derived `Clone` would demand `M: Clone` for no reason.
impl<M> Clone for Sender<M> {
    fn clone(&self) -> Self {
        Sender { tx: self.tx.clone() }
    }
}

/// A reply slot carried inside query messages.
///
/// Always bounded with capacity one so an answering process never blocks on it.
pub(crate) type Reply<T> = channel::Sender<T>;

/// Create a reply slot and the receiver to await it on.
pub(crate) fn reply_slot<T>() -> (Reply<T>, channel::Receiver<T>) {
    channel::bounded(1)
}

/// Await the answer to a posted query.
pub(crate) fn await_reply<T>(rx: channel::Receiver<T>) -> Result<T> {
    rx.recv().map_err(|_| Error::Closed)
}

/// The state of one layer, driven by its process loop.
///
/// Exactly one loop per mailbox calls into this; there is no other way to reach the state. A
/// handler must never panic on malformed input — it drops the message and notes a statistic.
pub(crate) trait Process {
    /// The message vocabulary of the layer.
    type Message: Send + 'static;

    /// Interpret one message and apply it to the layer state.
    fn process(&mut self, message: Self::Message);
}

/// Start the process loop of one layer.
///
/// Returns once the loop is live, so a caller that starts layers in dependency order observes a
/// fully reactive stack when the last call returns. The loop runs until the last sender to the
/// mailbox disappears.
pub(crate) fn spawn<P>(name: &str, mailbox: Mailbox<P::Message>, mut endpoint: P) -> io::Result<()>
where
    P: Process + Send + 'static,
{
    let Mailbox { tx, rx } = mailbox;
    drop(tx);

    let (ready_tx, ready_rx) = channel::bounded(0);
    thread::Builder::new()
        .name(format!("lamina-{}", name))
        .spawn(move || {
            let _ = ready_tx.send(());
            for message in rx.iter() {
                endpoint.process(message);
            }
        })?;

    let _ = ready_rx.recv();
    Ok(())
}

/// Deliver a message to a mailbox after a delay.
///
/// This is the timer primitive of the stack: a layer that needs timeouts clones its own sender
/// and schedules a self-delivered message, which arrives through the ordinary mailbox and is
/// therefore serialized with all other state access.
pub fn send_after<M: Send + 'static>(sender: &Sender<M>, delay: Duration, message: M) {
    let sender = sender.clone();
    let spawned = thread::Builder::new()
        .name("lamina-timer".into())
        .spawn(move || {
            let _ = channel::after(delay).recv();
            sender.send(message);
        });
    if let Err(err) = spawned {
        error!("could not spawn timer thread: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        seen: channel::Sender<u32>,
    }

    impl Process for Recorder {
        type Message = u32;

        fn process(&mut self, message: u32) {
            let _ = self.seen.send(message);
        }
    }

    #[test]
    fn fifo_per_sender() {
        let mailbox = Mailbox::new();
        let sender = mailbox.sender();
        let (seen, observed) = channel::unbounded();
        spawn("test", mailbox, Recorder { seen }).unwrap();

        for value in 0..100 {
            sender.send(value);
        }
        for value in 0..100 {
            assert_eq!(observed.recv_timeout(Duration::from_secs(1)), Ok(value));
        }
    }

    #[test]
    fn loop_ends_with_last_sender() {
        let mailbox = Mailbox::new();
        let sender = mailbox.sender();
        let (seen, observed) = channel::unbounded();
        spawn("test", mailbox, Recorder { seen }).unwrap();

        sender.send(7);
        drop(sender);

        assert_eq!(observed.recv_timeout(Duration::from_secs(1)), Ok(7));
        // The loop exits and drops its state, disconnecting the observer.
        assert!(observed.recv_timeout(Duration::from_secs(1)).is_err());
    }

    #[test]
    fn timer_message_arrives() {
        let mailbox = Mailbox::new();
        let sender = mailbox.sender();
        let (seen, observed) = channel::unbounded();
        spawn("test", mailbox, Recorder { seen }).unwrap();

        send_after(&sender, Duration::from_millis(10), 99);
        assert_eq!(observed.recv_timeout(Duration::from_secs(1)), Ok(99));
    }
}
