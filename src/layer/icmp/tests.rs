use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel as channel;

use crate::nic::{Device, Personality};
use crate::wire::ethernet::{self, EtherType};
use crate::wire::icmpv4;
use crate::wire::ip::{Address, Cidr, Protocol};
use crate::wire::{ipv4, Checksum};
use crate::NetworkStack;

const LOCAL: Address = Address::new(10, 0, 0, 1);
const REMOTE: Address = Address::new(10, 0, 0, 2);
const LOCAL_MAC: ethernet::Address = ethernet::Address([0x02, 0, 0, 0, 0, 1]);
const REMOTE_MAC: ethernet::Address = ethernet::Address([0x02, 0, 0, 0, 0, 2]);

const TIMEOUT: Duration = Duration::from_secs(1);

fn fixture() -> (NetworkStack, Arc<Device>, channel::Receiver<Vec<u8>>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let stack = NetworkStack::new().unwrap();
    let (device, frames) = Device::new("eth0", LOCAL_MAC, Personality::baseline());
    stack.add_device(device.clone());
    stack.add_address(device.clone(), Cidr::new(LOCAL, 24), 1500);
    stack.add_neighbor(REMOTE, REMOTE_MAC);
    (stack, device, frames)
}

fn echo_request(ident: u16, seq_no: u16, payload: &[u8]) -> Vec<u8> {
    let request = icmpv4::Repr::EchoRequest { ident, seq_no, payload };
    let mut packet = vec![0; request.buffer_len()];
    request.emit(&mut packet, Checksum::Manual);

    let ip_repr = ipv4::Repr {
        src_addr: REMOTE,
        dst_addr: LOCAL,
        protocol: Protocol::Icmp,
        payload_len: packet.len(),
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
    frame[ethernet::HEADER_LEN + ipv4::HEADER_LEN..].copy_from_slice(&packet);
    frame
}

#[test]
fn echo_request_is_mirrored() {
    let (stack, device, frames) = fixture();

    stack.inject(device, echo_request(0x1234, 7, b"are you there"));

    let sent = frames.recv_timeout(TIMEOUT).unwrap();
    let eth_repr = ethernet::Repr::parse(&sent).unwrap();
    assert_eq!(eth_repr.dst_addr, REMOTE_MAC);

    let (ip_repr, payload) =
        ipv4::Repr::parse(&sent[ethernet::HEADER_LEN..], Checksum::Manual).unwrap();
    assert_eq!(ip_repr.src_addr, LOCAL);
    assert_eq!(ip_repr.dst_addr, REMOTE);
    assert_eq!(ip_repr.protocol, Protocol::Icmp);

    match icmpv4::Repr::parse(payload, Checksum::Manual).unwrap() {
        icmpv4::Repr::EchoReply { ident, seq_no, payload } => {
            assert_eq!(ident, 0x1234);
            assert_eq!(seq_no, 7);
            assert_eq!(payload, b"are you there");
        }
        other => panic!("expected an echo reply, got {:?}", other),
    }
}

#[test]
fn denied_echo_stays_quiet() {
    let (stack, device, frames) = fixture();
    stack.deny_echo(true);

    stack.inject(device, echo_request(1, 1, b"ping"));

    assert!(frames.recv_timeout(Duration::from_millis(200)).is_err());
}
