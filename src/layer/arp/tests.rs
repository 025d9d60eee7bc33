use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel as channel;

use crate::nic::{Device, Personality};
use crate::wire::arp::{Operation, Repr, PACKET_LEN};
use crate::wire::ethernet::{self, EtherType};
use crate::wire::ip::{Address, Cidr};
use crate::wire::{ipv4, udp, Checksum};
use crate::NetworkStack;

const LOCAL: Address = Address::new(10, 0, 0, 1);
const REMOTE: Address = Address::new(10, 0, 0, 2);
const LOCAL_MAC: ethernet::Address = ethernet::Address([0x02, 0, 0, 0, 0, 1]);
const REMOTE_MAC: ethernet::Address = ethernet::Address([0x02, 0, 0, 0, 0, 2]);

const TIMEOUT: Duration = Duration::from_secs(1);

fn fixture() -> (NetworkStack, Arc<Device>, channel::Receiver<Vec<u8>>) {
    let stack = NetworkStack::new().unwrap();
    let (device, frames) = Device::new("eth0", LOCAL_MAC, Personality::baseline());
    stack.add_device(device.clone());
    stack.add_address(device.clone(), Cidr::new(LOCAL, 24), 1500);
    (stack, device, frames)
}

fn who_has(target: Address) -> Vec<u8> {
    let request = Repr {
        operation: Operation::Request,
        source_hardware_addr: REMOTE_MAC,
        source_protocol_addr: REMOTE,
        target_hardware_addr: ethernet::Address([0; 6]),
        target_protocol_addr: target,
    };
    let eth_repr = ethernet::Repr {
        dst_addr: ethernet::Address::BROADCAST,
        src_addr: REMOTE_MAC,
        ethertype: EtherType::Arp,
    };

    let mut frame = vec![0; ethernet::HEADER_LEN + PACKET_LEN];
    eth_repr.emit(&mut frame);
    request.emit(&mut frame[ethernet::HEADER_LEN..]);
    frame
}

#[test]
fn request_for_bound_address_is_answered() {
    let (stack, device, frames) = fixture();

    stack.inject(device, who_has(LOCAL));

    let sent = frames.recv_timeout(TIMEOUT).unwrap();
    let eth_repr = ethernet::Repr::parse(&sent).unwrap();
    assert_eq!(eth_repr.dst_addr, REMOTE_MAC);
    assert_eq!(eth_repr.ethertype, EtherType::Arp);

    let reply = Repr::parse(&sent[ethernet::HEADER_LEN..]).unwrap();
    assert_eq!(reply.operation, Operation::Reply);
    assert_eq!(reply.source_hardware_addr, LOCAL_MAC);
    assert_eq!(reply.source_protocol_addr, LOCAL);
    assert_eq!(reply.target_hardware_addr, REMOTE_MAC);
    assert_eq!(reply.target_protocol_addr, REMOTE);
}

#[test]
fn request_for_foreign_address_is_ignored() {
    let (stack, device, frames) = fixture();

    stack.inject(device, who_has(Address::new(10, 0, 0, 99)));

    assert!(frames.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn sender_mapping_is_learned() {
    let (stack, device, frames) = fixture();

    // The who-has request carries the asker's own mapping, which the cache picks up; the
    // following send resolves its next hop without any static entry.
    stack.inject(device, who_has(LOCAL));
    let _reply = frames.recv_timeout(TIMEOUT).unwrap();

    stack.udp_send(REMOTE, Some(1), 2, b"hello".to_vec());

    let sent = frames.recv_timeout(TIMEOUT).unwrap();
    let eth_repr = ethernet::Repr::parse(&sent).unwrap();
    assert_eq!(eth_repr.dst_addr, REMOTE_MAC);
    assert_eq!(eth_repr.ethertype, EtherType::Ipv4);

    let (ip_repr, ip_payload) =
        ipv4::Repr::parse(&sent[ethernet::HEADER_LEN..], Checksum::Manual).unwrap();
    assert_eq!(ip_repr.dst_addr, REMOTE);
    let (header, _) = udp::Repr::parse(ip_payload).unwrap();
    assert_eq!(header.dst_port, 2);
}
