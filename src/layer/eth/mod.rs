//! The ethernet layer.
//!
//! The lowest layer of the stack and the only one talking to devices. It keeps the device
//! registry and an `EtherType` handler table; ARP and IP register themselves there when they
//! start, so this layer has no upward knowledge at all. Ingress frames are filtered (registered
//! device, link up, destination is us or broadcast) and handed to the matching handler; egress
//! frames are framed here and pushed into the device transmit queue.
use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use log::{debug, trace};

use crate::nic::Device;
use crate::wire::ethernet::{Address, EtherType, Repr, HEADER_LEN};

use super::{Mailbox, Process, Sender};

/// A stack exposing the ethernet layer.
pub trait Provider {
    /// The handle of the ethernet layer.
    fn ethernet(&self) -> &Handle;
}

/// A frame payload on its way up, after ethernet processing.
pub struct Ingress {
    /// The device the frame arrived on.
    pub device: Arc<Device>,
    /// The frame payload, ethernet header stripped.
    pub payload: Vec<u8>,
}

/// A handler for one `EtherType`, registered by an upper layer.
pub(crate) type Handler = Box<dyn FnMut(Ingress) + Send>;

/// The message vocabulary of the ethernet layer.
pub enum Message {
    /// A raw frame arriving from a driver.
    Frame {
        /// The receiving device.
        device: Arc<Device>,
        /// The complete frame, header included.
        frame: Vec<u8>,
    },
    /// Frame and transmit a payload on a device.
    Transmit {
        /// The sending device.
        device: Arc<Device>,
        /// The destination station.
        dst_addr: Address,
        /// The type of the payload.
        ethertype: EtherType,
        /// The frame payload.
        payload: Vec<u8>,
    },
    /// Make a device known to the stack.
    AddDevice(Arc<Device>),
    /// Remove a device by name; its frames are dropped from then on.
    RemoveDevice(String),
    /// Change the administrative link state of a device.
    SetUp {
        /// The device name.
        name: String,
        /// The new link state.
        up: bool,
    },
    /// Register the handler of an upper layer for an `EtherType`.
    Register {
        /// The frame type to claim.
        ethertype: EtherType,
        /// The receiving handler.
        handler: Handler,
    },
    /// Remove the handler for an `EtherType`.
    Unregister(EtherType),
}

/// The addressable reference to the ethernet layer.
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

    /// Deliver a raw frame from a driver into the stack.
    pub fn inject(&self, device: Arc<Device>, frame: Vec<u8>) {
        self.tx.send(Message::Frame { device, frame });
    }

    /// Make a device known to the stack.
    pub fn add_device(&self, device: Arc<Device>) {
        self.tx.send(Message::AddDevice(device));
    }

    /// Remove a device by name.
    pub fn remove_device(&self, name: &str) {
        self.tx.send(Message::RemoveDevice(name.into()));
    }

    /// Change the administrative link state of a device.
    pub fn set_up(&self, name: &str, up: bool) {
        self.tx.send(Message::SetUp { name: name.into(), up });
    }

    pub(crate) fn register(&self, ethertype: EtherType, handler: Handler) {
        self.tx.send(Message::Register { ethertype, handler });
    }

    pub(crate) fn transmit(
        &self,
        device: Arc<Device>,
        dst_addr: Address,
        ethertype: EtherType,
        payload: Vec<u8>,
    ) {
        self.tx.send(Message::Transmit { device, dst_addr, ethertype, payload });
    }
}

/// The ethernet layer state, touched only by its process loop.
struct Endpoint {
    devices: HashMap<String, Arc<Device>>,
    handlers: HashMap<EtherType, Handler>,
}

impl Endpoint {
    fn ingress(&mut self, device: Arc<Device>, frame: Vec<u8>) {
        if !self.devices.contains_key(device.name()) || !device.is_up() {
            device.stats().note_filtered();
            trace!("frame on inactive device {}", device.name());
            return;
        }

        let repr = match Repr::parse(&frame) {
            Ok(repr) => repr,
            Err(err) => {
                device.stats().note_decode_dropped();
                debug!("undecodable frame on {}: {}", device.name(), err);
                return;
            }
        };

        if repr.dst_addr != device.addr() && !repr.dst_addr.is_broadcast() {
            device.stats().note_filtered();
            trace!("frame for foreign station {}", repr.dst_addr);
            return;
        }

        device.stats().note_rx(frame.len());

        match self.handlers.get_mut(&repr.ethertype) {
            Some(handler) => {
                let payload = frame[HEADER_LEN..].to_vec();
                handler(Ingress { device, payload });
            }
            None => trace!("no handler for {}", repr.ethertype),
        }
    }

    fn egress(&self, device: Arc<Device>, dst_addr: Address, ethertype: EtherType, payload: Vec<u8>) {
        if !device.is_up() {
            trace!("transmit on downed device {}", device.name());
            return;
        }

        let repr = Repr { dst_addr, src_addr: device.addr(), ethertype };
        let mut frame = vec![0; HEADER_LEN + payload.len()];
        repr.emit(&mut frame);
        frame[HEADER_LEN..].copy_from_slice(&payload);
        device.transmit(frame);
    }
}

impl Process for Endpoint {
    type Message = Message;

    fn process(&mut self, message: Message) {
        match message {
            Message::Frame { device, frame } => self.ingress(device, frame),
            Message::Transmit { device, dst_addr, ethertype, payload } => {
                self.egress(device, dst_addr, ethertype, payload)
            }
            Message::AddDevice(device) => {
                self.devices.insert(device.name().into(), device);
            }
            Message::RemoveDevice(name) => {
                self.devices.remove(&name);
            }
            Message::SetUp { name, up } => {
                if let Some(device) = self.devices.get(&name) {
                    device.set_up(up);
                }
            }
            Message::Register { ethertype, handler } => {
                self.handlers.insert(ethertype, handler);
            }
            Message::Unregister(ethertype) => {
                self.handlers.remove(&ethertype);
            }
        }
    }
}

/// Start the ethernet layer process. It is the root of the dependency order and needs no
/// providers.
pub(crate) fn start(mailbox: Mailbox<Message>) -> io::Result<()> {
    let endpoint = Endpoint { devices: HashMap::new(), handlers: HashMap::new() };
    super::spawn("eth", mailbox, endpoint)
}
