use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel as channel;

use crate::nic::{Device, Personality};
use crate::wire::ethernet::{self, EtherType};
use crate::wire::ip::{Address, Cidr, Protocol};
use crate::wire::udp::{Repr, UdpChecksum, HEADER_LEN};
use crate::wire::{icmpv4, ipv4, Checksum};
use crate::{Config, NetworkStack};

use super::{Forward, Forwarder};

const LOCAL: Address = Address::new(10, 0, 0, 1);
const REMOTE: Address = Address::new(10, 0, 0, 2);
const LOCAL_MAC: ethernet::Address = ethernet::Address([0x02, 0, 0, 0, 0, 1]);
const REMOTE_MAC: ethernet::Address = ethernet::Address([0x02, 0, 0, 0, 0, 2]);

const TIMEOUT: Duration = Duration::from_secs(1);

fn fixture(
    config: Config,
    personality: Personality,
) -> (NetworkStack, Arc<Device>, channel::Receiver<Vec<u8>>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let stack = NetworkStack::with_config(config).unwrap();
    let (device, frames) = Device::new("eth0", LOCAL_MAC, personality);
    stack.add_device(device.clone());
    stack.add_address(device.clone(), Cidr::new(LOCAL, 24), 1500);
    (stack, device, frames)
}

fn datagram(src_port: u16, dst_port: u16, payload: &[u8], checksum: UdpChecksum) -> Vec<u8> {
    let repr = Repr {
        src_port,
        dst_port,
        length: (HEADER_LEN + payload.len()) as u16,
    };
    let mut buffer = vec![0; HEADER_LEN + payload.len()];
    buffer[HEADER_LEN..].copy_from_slice(payload);
    repr.emit(&mut buffer, checksum);
    buffer
}

fn checksummed(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let mode = UdpChecksum::Manual { src_addr: REMOTE, dst_addr: LOCAL };
    datagram(src_port, dst_port, payload, mode)
}

/// A complete ethernet frame carrying a datagram from the remote station to us.
fn frame(datagram: &[u8]) -> Vec<u8> {
    let ip_repr = ipv4::Repr {
        src_addr: REMOTE,
        dst_addr: LOCAL,
        protocol: Protocol::Udp,
        payload_len: datagram.len(),
        hop_limit: 64,
    };
    let eth_repr = ethernet::Repr {
        dst_addr: LOCAL_MAC,
        src_addr: REMOTE_MAC,
        ethertype: EtherType::Ipv4,
    };

    let mut frame = vec![0; ethernet::HEADER_LEN + ip_repr.total_len()];
    eth_repr.emit(&mut frame);
    ip_repr.emit(&mut frame[ethernet::HEADER_LEN..], Checksum::Manual);
    frame[ethernet::HEADER_LEN + ipv4::HEADER_LEN..].copy_from_slice(datagram);
    frame
}

#[test]
fn delivers_to_bound_socket() {
    let (stack, device, _frames) = fixture(Config::default(), Personality::baseline());
    let socket = stack.udp_bind(LOCAL, 53).unwrap();

    stack.udp_inject(device.clone(), REMOTE, LOCAL, checksummed(4096, 53, b"query"));

    let received = socket.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(received.payload, b"query");
    assert_eq!(received.remote_addr, REMOTE);
    assert_eq!(received.remote_port, 4096);
    assert_eq!(received.local_addr, LOCAL);
    assert_eq!(received.local_port, 53);
    assert_eq!(received.device.name(), "eth0");
}

#[test]
fn truncates_to_declared_length() {
    let (stack, device, _frames) = fixture(Config::default(), Personality::baseline());
    let socket = stack.udp_bind(LOCAL, 53).unwrap();

    // Four octets of payload declared, four octets of trailing padding. The zero checksum
    // field disables validation, so the padding does not disturb step 1.
    let mut padded = datagram(4096, 53, b"pingpong", UdpChecksum::Ignored);
    let repr = Repr { src_port: 4096, dst_port: 53, length: (HEADER_LEN + 4) as u16 };
    repr.emit(&mut padded, UdpChecksum::Ignored);

    stack.udp_inject(device, REMOTE, LOCAL, padded);

    let received = socket.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(received.payload, b"ping");
}

#[test]
fn zero_length_payload_is_delivered() {
    let (stack, device, _frames) = fixture(Config::default(), Personality::baseline());
    let socket = stack.udp_bind(LOCAL, 53).unwrap();

    stack.udp_inject(device, REMOTE, LOCAL, checksummed(4096, 53, b""));

    let received = socket.recv_timeout(TIMEOUT).unwrap();
    assert!(received.payload.is_empty());
}

#[test]
fn bad_checksum_is_counted_not_delivered() {
    let (stack, device, _frames) = fixture(Config::default(), Personality::baseline());
    let socket = stack.udp_bind(LOCAL, 53).unwrap();

    let mut corrupt = checksummed(4096, 53, b"first");
    corrupt[HEADER_LEN] ^= 0xff;
    stack.udp_inject(device.clone(), REMOTE, LOCAL, corrupt);
    stack.udp_inject(device.clone(), REMOTE, LOCAL, checksummed(4096, 53, b"second"));

    // FIFO: once the follow-up arrives, the corrupt datagram has been fully processed.
    let received = socket.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(received.payload, b"second");
    assert_eq!(device.stats().rx_checksum_dropped(), 1);
    assert_eq!(device.stats().rx_decode_dropped(), 0);
}

#[test]
fn receive_offload_bypasses_verification() {
    let mut personality = Personality::baseline();
    *personality.capabilities_mut().udp_mut().rx_checksum_mut() = Checksum::Ignored;
    let (stack, device, _frames) = fixture(Config::default(), personality);
    let socket = stack.udp_bind(LOCAL, 53).unwrap();

    // The card claims to have verified this already; the stack must not second-guess it.
    let mut corrupt = checksummed(4096, 53, b"trusted");
    corrupt[HEADER_LEN] ^= 0xff;
    stack.udp_inject(device.clone(), REMOTE, LOCAL, corrupt);

    let received = socket.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(received.payload, b"trusted");
    assert_eq!(device.stats().rx_checksum_dropped(), 0);
}

#[test]
fn decode_failure_is_isolated() {
    let (stack, device, _frames) = fixture(Config::default(), Personality::baseline());
    let socket = stack.udp_bind(LOCAL, 53).unwrap();

    // A declared length below the header size is malformed; the zero checksum field gets it
    // past step 1 so the failure is attributed to decoding.
    let mut malformed = datagram(4096, 53, b"?", UdpChecksum::Ignored);
    malformed[4] = 0;
    malformed[5] = 4;
    stack.udp_inject(device.clone(), REMOTE, LOCAL, malformed);
    stack.udp_inject(device.clone(), REMOTE, LOCAL, checksummed(4096, 53, b"after"));

    let received = socket.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(received.payload, b"after");
    assert_eq!(device.stats().rx_decode_dropped(), 1);
    assert_eq!(device.stats().rx_checksum_dropped(), 0);
}

#[test]
fn wildcard_binding_catches_unclaimed_addresses() {
    let (stack, device, _frames) = fixture(Config::default(), Personality::baseline());
    let wildcard = stack.udp_bind(Address::UNSPECIFIED, 53).unwrap();

    stack.udp_inject(device, REMOTE, LOCAL, checksummed(4096, 53, b"anycast"));

    let received = wildcard.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(received.payload, b"anycast");
    assert_eq!(received.local_addr, LOCAL);
}

#[test]
fn exact_binding_shadows_wildcard() {
    let (stack, device, _frames) = fixture(Config::default(), Personality::baseline());
    let wildcard = stack.udp_bind(Address::UNSPECIFIED, 53).unwrap();
    let exact = stack.udp_bind(LOCAL, 53).unwrap();

    stack.udp_inject(device, REMOTE, LOCAL, checksummed(4096, 53, b"mine"));

    let received = exact.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(received.payload, b"mine");
    assert!(wildcard.try_recv().is_none());
}

#[test]
fn bound_port_conflicts_until_released() {
    let (stack, _device, _frames) = fixture(Config::default(), Personality::baseline());

    let socket = stack.udp_bind(LOCAL, 53).unwrap();
    assert_eq!(
        stack.udp_bind(LOCAL, 53).err(),
        Some(crate::layer::Error::InUse)
    );

    drop(socket);
    assert!(stack.udp_bind(LOCAL, 53).is_ok());
}

#[test]
fn backlogged_receiver_counts_delivery_drops() {
    let config = Config { socket_buffer: 1, ..Config::default() };
    let (stack, device, _frames) = fixture(config, Personality::baseline());
    let socket = stack.udp_bind(LOCAL, 53).unwrap();

    stack.udp_inject(device.clone(), REMOTE, LOCAL, checksummed(1, 53, b"a"));
    stack.udp_inject(device.clone(), REMOTE, LOCAL, checksummed(1, 53, b"b"));
    stack.udp_inject(device.clone(), REMOTE, LOCAL, checksummed(1, 53, b"c"));

    assert_eq!(socket.recv_timeout(TIMEOUT).unwrap().payload, b"a");

    // Draining made room again; once this one arrives, b and c have been accounted.
    stack.udp_inject(device.clone(), REMOTE, LOCAL, checksummed(1, 53, b"d"));
    assert_eq!(socket.recv_timeout(TIMEOUT).unwrap().payload, b"d");
    assert_eq!(device.stats().rx_delivery_dropped(), 2);
}

#[test]
fn fifo_per_sender() {
    let (stack, device, _frames) = fixture(Config::default(), Personality::baseline());
    let socket = stack.udp_bind(LOCAL, 53).unwrap();

    for index in 0..10u8 {
        stack.udp_inject(device.clone(), REMOTE, LOCAL, checksummed(1, 53, &[index]));
    }
    for index in 0..10u8 {
        assert_eq!(socket.recv_timeout(TIMEOUT).unwrap().payload, [index]);
    }
}

struct Rewrite {
    to_addr: Address,
    to_port: u16,
}

impl Forwarder for Rewrite {
    fn try_forward(&mut self, _: Address, _: Address, header: &Repr) -> Option<Forward> {
        Some(Forward {
            dst_addr: self.to_addr,
            header: Repr { dst_port: self.to_port, ..*header },
            route: None,
        })
    }
}

#[test]
fn forwarding_rewrites_and_requeues() {
    let target = Address::new(10, 0, 0, 3);
    let target_mac = ethernet::Address([0x02, 0, 0, 0, 0, 3]);
    let config = Config {
        forwarder: Box::new(Rewrite { to_addr: target, to_port: 8053 }),
        ..Config::default()
    };
    let (stack, device, frames) = fixture(config, Personality::baseline());
    stack.add_neighbor(target, target_mac);

    // No socket on port 53: the rewritten datagram leaves on the direct route instead.
    stack.udp_inject(device, REMOTE, LOCAL, checksummed(4096, 53, b"relay"));

    let sent = frames.recv_timeout(TIMEOUT).unwrap();
    let eth_repr = ethernet::Repr::parse(&sent).unwrap();
    assert_eq!(eth_repr.dst_addr, target_mac);
    assert_eq!(eth_repr.ethertype, EtherType::Ipv4);

    let (ip_repr, ip_payload) =
        ipv4::Repr::parse(&sent[ethernet::HEADER_LEN..], Checksum::Manual).unwrap();
    assert_eq!(ip_repr.dst_addr, target);
    assert_eq!(ip_repr.protocol, Protocol::Udp);

    let (header, payload) = Repr::parse(ip_payload).unwrap();
    assert_eq!(header.dst_port, 8053);
    assert_eq!(header.src_port, 4096);
    assert_eq!(payload, b"relay");
}

#[test]
fn refused_datagram_draws_port_unreachable() {
    let (stack, device, frames) = fixture(Config::default(), Personality::baseline());
    stack.add_neighbor(REMOTE, REMOTE_MAC);

    // Nothing bound, nothing forwarded: the full receive path must answer with a report.
    stack.inject(device, frame(&checksummed(4096, 53, b"lost")));

    let sent = frames.recv_timeout(TIMEOUT).unwrap();
    let eth_repr = ethernet::Repr::parse(&sent).unwrap();
    assert_eq!(eth_repr.dst_addr, REMOTE_MAC);

    let (ip_repr, ip_payload) =
        ipv4::Repr::parse(&sent[ethernet::HEADER_LEN..], Checksum::Manual).unwrap();
    assert_eq!(ip_repr.src_addr, LOCAL);
    assert_eq!(ip_repr.dst_addr, REMOTE);
    assert_eq!(ip_repr.protocol, Protocol::Icmp);

    match icmpv4::Repr::parse(ip_payload, Checksum::Manual).unwrap() {
        icmpv4::Repr::DstUnreachable { code, original } => {
            assert_eq!(code, icmpv4::CODE_PORT_UNREACHABLE);
            // The quote is the offending IP header plus eight datagram octets, deliberately
            // too short to re-parse as a complete packet.
            assert_eq!(original.len(), ipv4::HEADER_LEN + 8);
            assert_eq!(Address::from_bytes(&original[12..16]), REMOTE);
            assert_eq!(Address::from_bytes(&original[16..20]), LOCAL);
            assert_eq!(original[9], 0x11);
        }
        other => panic!("expected a destination-unreachable report, got {:?}", other),
    }
}

#[test]
fn send_assigns_ephemeral_source_port() {
    let (stack, _device, frames) = fixture(Config::default(), Personality::baseline());
    stack.add_neighbor(REMOTE, REMOTE_MAC);

    stack.udp_send(REMOTE, None, 7, b"knock".to_vec());

    let sent = frames.recv_timeout(TIMEOUT).unwrap();
    let (_, ip_payload) =
        ipv4::Repr::parse(&sent[ethernet::HEADER_LEN..], Checksum::Manual).unwrap();
    let (header, payload) = Repr::parse(ip_payload).unwrap();
    assert!(header.src_port >= 49152);
    assert_eq!(header.dst_port, 7);
    assert_eq!(payload, b"knock");
}

#[test]
fn socket_send_uses_bound_port() {
    let (stack, _device, frames) = fixture(Config::default(), Personality::baseline());
    stack.add_neighbor(REMOTE, REMOTE_MAC);
    let socket = stack.udp_bind(LOCAL, 53).unwrap();

    socket.send_to(REMOTE, 4096, b"answer".to_vec());

    let sent = frames.recv_timeout(TIMEOUT).unwrap();
    let (ip_repr, ip_payload) =
        ipv4::Repr::parse(&sent[ethernet::HEADER_LEN..], Checksum::Manual).unwrap();
    assert_eq!(ip_repr.src_addr, LOCAL);
    let (header, _) = Repr::parse(ip_payload).unwrap();
    assert_eq!(header.src_port, 53);
    assert_eq!(header.dst_port, 4096);
}
