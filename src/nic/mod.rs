//! Encapsulates a network interface card.
//!
//! A [`Device`] describes one interface to the layers above: its hardware address, its checksum
//! offload [`Personality`] and its shared statistics counters. The driver side of an interface is
//! deliberately out of scope; frames leaving the stack are pushed into a transmit queue whose
//! receiving end is handed out at construction, and frames arriving from a driver enter via
//! [`NetworkStack::inject`](../struct.NetworkStack.html#method.inject). Tests drive both ends
//! directly, in the spirit of a software loopback.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel as channel;

use crate::wire::ethernet;

mod personality;

pub use self::personality::{Capabilities, Personality, Protocol};

/// One network interface.
///
/// Devices are shared by reference between layer processes and the application; nothing in the
/// stack owns them. All mutable state is atomic since several layer processes update statistics
/// concurrently.
#[derive(Debug)]
pub struct Device {
    name: String,
    addr: ethernet::Address,
    personality: Personality,
    up: AtomicBool,
    stats: Stats,
    tx: channel::Sender<Vec<u8>>,
}

impl Device {
    /// Create a device and the drain of its transmit queue.
    ///
    /// The returned receiver is the driver seam: every frame the stack emits on this device ends
    /// up there, in transmission order. Dropping it silently discards further frames, which
    /// models an unplugged interface well enough.
    pub fn new(
        name: impl Into<String>,
        addr: ethernet::Address,
        personality: Personality,
    ) -> (Arc<Device>, channel::Receiver<Vec<u8>>) {
        let (tx, rx) = channel::unbounded();
        let device = Device {
            name: name.into(),
            addr,
            personality,
            up: AtomicBool::new(true),
            stats: Stats::default(),
            tx,
        };
        (Arc::new(device), rx)
    }

    /// The name the device was registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The hardware address of the interface.
    pub fn addr(&self) -> ethernet::Address {
        self.addr
    }

    /// A description of the device.
    pub fn personality(&self) -> &Personality {
        &self.personality
    }

    /// The statistics counters of this interface.
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Whether the link is administratively up.
    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::Relaxed)
    }

    pub(crate) fn set_up(&self, up: bool) {
        self.up.store(up, Ordering::Relaxed);
    }

    /// Hand a finished frame to the driver side.
    pub(crate) fn transmit(&self, frame: Vec<u8>) {
        self.stats.note_tx(frame.len());
        // The driver seam may be gone, see `new`.
        let _ = self.tx.send(frame);
    }
}

/// Per-device counters, safe for concurrent increment from any layer process.
///
/// The drop counters attribute a discarded packet to its failure class: a checksum that did not
/// verify, a header that did not decode, a recipient whose buffer did not accept the payload, or
/// filtering (down link, foreign station, unroutable destination).
#[derive(Debug, Default)]
pub struct Stats {
    rx_packets: AtomicU64,
    rx_bytes: AtomicU64,
    tx_packets: AtomicU64,
    tx_bytes: AtomicU64,
    rx_checksum_dropped: AtomicU64,
    rx_decode_dropped: AtomicU64,
    rx_delivery_dropped: AtomicU64,
    rx_filtered: AtomicU64,
}

impl Stats {
    /// Frames accepted from this device.
    pub fn rx_packets(&self) -> u64 {
        self.rx_packets.load(Ordering::Relaxed)
    }

    /// Octets accepted from this device.
    pub fn rx_bytes(&self) -> u64 {
        self.rx_bytes.load(Ordering::Relaxed)
    }

    /// Frames queued for transmission on this device.
    pub fn tx_packets(&self) -> u64 {
        self.tx_packets.load(Ordering::Relaxed)
    }

    /// Octets queued for transmission on this device.
    pub fn tx_bytes(&self) -> u64 {
        self.tx_bytes.load(Ordering::Relaxed)
    }

    /// Packets dropped because a checksum did not verify.
    pub fn rx_checksum_dropped(&self) -> u64 {
        self.rx_checksum_dropped.load(Ordering::Relaxed)
    }

    /// Packets dropped because a header did not decode.
    pub fn rx_decode_dropped(&self) -> u64 {
        self.rx_decode_dropped.load(Ordering::Relaxed)
    }

    /// Datagrams that found their recipient but whose buffer did not accept them.
    pub fn rx_delivery_dropped(&self) -> u64 {
        self.rx_delivery_dropped.load(Ordering::Relaxed)
    }

    /// Packets discarded by filtering before any decoding fault.
    pub fn rx_filtered(&self) -> u64 {
        self.rx_filtered.load(Ordering::Relaxed)
    }

    pub(crate) fn note_rx(&self, len: usize) {
        self.rx_packets.fetch_add(1, Ordering::Relaxed);
        self.rx_bytes.fetch_add(len as u64, Ordering::Relaxed);
    }

    fn note_tx(&self, len: usize) {
        self.tx_packets.fetch_add(1, Ordering::Relaxed);
        self.tx_bytes.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub(crate) fn note_checksum_dropped(&self) {
        self.rx_checksum_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_decode_dropped(&self) {
        self.rx_decode_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_delivery_dropped(&self) {
        self.rx_delivery_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_filtered(&self) {
        self.rx_filtered.fetch_add(1, Ordering::Relaxed);
    }
}
