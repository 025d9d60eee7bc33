//! Composition of the layer processes into one addressable stack.
use std::io;
use std::sync::Arc;

use crate::layer::{arp, dns, eth, icmp, ip, tcp, udp};
use crate::layer::Result;
use crate::nic::Device;
use crate::wire::ethernet;
use crate::wire::ip::{Address, Cidr, Protocol};

/// The collaborators and knobs of a stack under construction.
///
/// The defaults produce a stack that speaks ethernet, ARP, IPv4, ICMP and UDP on its own and
/// refuses TCP and name resolution until real collaborators are configured.
pub struct Config {
    /// The TCP connection state machine.
    pub tcp_engine: Box<dyn tcp::Engine>,
    /// The name resolution mechanism.
    pub resolver: Box<dyn dns::Resolver>,
    /// The UDP forwarding collaborator.
    pub forwarder: Box<dyn udp::Forwarder>,
    /// The per-socket receive buffer capacity, in datagrams.
    pub socket_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            tcp_engine: Box::new(tcp::Disabled),
            resolver: Box::new(dns::Unsupported),
            forwarder: Box::new(udp::NoForward),
            socket_buffer: 64,
        }
    }
}

/// A fully wired protocol stack.
///
/// Holds one handle per layer process and implements every layer's provider contract, which is
/// what the `start` functions consumed during construction and what applications go through
/// afterwards. Cloning clones the handles; all clones address the same processes. The layer
/// processes keep handles on each other for ingress dispatch, so a stack runs for the rest of
/// the program once started.
#[derive(Clone)]
pub struct NetworkStack {
    eth: eth::Handle,
    arp: arp::Handle,
    icmp: icmp::Handle,
    ip: ip::Handle,
    udp: udp::Handle,
    tcp: tcp::Handle,
    dns: dns::Handle,
    socket_buffer: usize,
}

impl eth::Provider for NetworkStack {
    fn ethernet(&self) -> &eth::Handle {
        &self.eth
    }
}

impl arp::Provider for NetworkStack {
    fn arp(&self) -> &arp::Handle {
        &self.arp
    }
}

impl icmp::Provider for NetworkStack {
    fn icmp(&self) -> &icmp::Handle {
        &self.icmp
    }
}

impl ip::Provider for NetworkStack {
    fn ip(&self) -> &ip::Handle {
        &self.ip
    }
}

impl udp::Provider for NetworkStack {
    fn udp(&self) -> &udp::Handle {
        &self.udp
    }
}

impl tcp::Provider for NetworkStack {
    fn tcp(&self) -> &tcp::Handle {
        &self.tcp
    }
}

impl dns::Provider for NetworkStack {
    fn dns(&self) -> &dns::Handle {
        &self.dns
    }
}

impl NetworkStack {
    /// Construct a stack with default collaborators.
    pub fn new() -> io::Result<NetworkStack> {
        NetworkStack::with_config(Config::default())
    }

    /// Construct a stack, starting every layer process.
    ///
    /// Layers start in dependency order, each start returning only once the spawned loop is
    /// live. When this returns, any operation on any layer is safe: construction is the
    /// readiness barrier of the whole stack.
    pub fn with_config(config: Config) -> io::Result<NetworkStack> {
        let (eth, eth_mailbox) = eth::Handle::new();
        let (arp, arp_mailbox) = arp::Handle::new();
        let (icmp, icmp_mailbox) = icmp::Handle::new();
        let (ip, ip_mailbox) = ip::Handle::new();
        let (udp, udp_mailbox) = udp::Handle::new();
        let (tcp, tcp_mailbox) = tcp::Handle::new();
        let (dns, dns_mailbox) = dns::Handle::new();

        let stack = NetworkStack {
            eth,
            arp,
            icmp,
            ip,
            udp,
            tcp,
            dns,
            socket_buffer: config.socket_buffer,
        };

        eth::start(eth_mailbox)?;
        arp::start(arp_mailbox, &stack)?;
        icmp::start(icmp_mailbox, &stack)?;
        ip::start(ip_mailbox, &stack)?;

        // ICMP starts before IP in the dependency order, so unlike UDP and TCP it can not
        // claim its protocol number itself.
        let report = stack.icmp.clone();
        stack.ip.register(Protocol::Icmp, move |packet| report.ingress(packet));

        udp::start(udp_mailbox, &stack, config.forwarder)?;
        tcp::start(tcp_mailbox, &stack, config.tcp_engine)?;
        dns::start(dns_mailbox, &stack, config.resolver)?;

        Ok(stack)
    }

    /// Make a device known to the stack.
    pub fn add_device(&self, device: Arc<Device>) {
        self.eth.add_device(device);
    }

    /// Remove a device by name; its frames are dropped from then on.
    pub fn remove_device(&self, name: &str) {
        self.eth.remove_device(name);
    }

    /// Bring a device's link up.
    pub fn device_up(&self, name: &str) {
        self.eth.set_up(name, true);
    }

    /// Bring a device's link down.
    pub fn device_down(&self, name: &str) {
        self.eth.set_up(name, false);
    }

    /// Deliver a raw frame from a driver into the stack.
    pub fn inject(&self, device: Arc<Device>, frame: Vec<u8>) {
        self.eth.inject(device, frame);
    }

    /// Bind a local address on a device.
    ///
    /// Creates a direct route for the covered network and starts answering who-has requests
    /// for the address.
    pub fn add_address(&self, device: Arc<Device>, cidr: Cidr, mtu: usize) {
        self.arp.bind(cidr.address());
        self.ip.add_address(device, cidr, mtu);
    }

    /// Add an indirect route through a gateway, which must be on-link.
    pub fn add_route(&self, net: Cidr, gateway: Address) -> Result<()> {
        self.ip.add_route(net, gateway)
    }

    /// Register a handler for an IP protocol number.
    pub fn register_protocol(
        &self,
        protocol: Protocol,
        handler: impl FnMut(ip::Ingress) + Send + 'static,
    ) {
        self.ip.register(protocol, handler);
    }

    /// Remove the handler for an IP protocol number.
    pub fn unregister_protocol(&self, protocol: Protocol) {
        self.ip.unregister(protocol);
    }

    /// Insert a static neighbor entry.
    pub fn add_neighbor(&self, addr: Address, hw_addr: ethernet::Address) {
        self.arp.add_entry(addr, hw_addr);
    }

    /// Control whether echo requests are answered.
    pub fn deny_echo(&self, deny: bool) {
        self.icmp.deny_echo(deny);
    }

    /// Claim a local (address, port) pair for receiving UDP datagrams.
    ///
    /// The unspecified address binds as a wildcard over all local addresses. Fails with
    /// [`Error::InUse`](crate::layer::Error::InUse) when the pair is taken.
    pub fn udp_bind(&self, addr: Address, port: u16) -> Result<udp::Socket> {
        self.udp.socket(addr, port, self.socket_buffer)
    }

    /// Send a UDP datagram, from an ephemeral source port when none is given.
    pub fn udp_send(
        &self,
        dst_addr: Address,
        src_port: Option<u16>,
        dst_port: u16,
        payload: Vec<u8>,
    ) {
        self.udp.send(dst_addr, src_port, dst_port, payload);
    }

    /// Inject a raw datagram below the UDP socket surface, for tests and forwarders.
    pub fn udp_inject(
        &self,
        device: Arc<Device>,
        src_addr: Address,
        dst_addr: Address,
        datagram: Vec<u8>,
    ) {
        self.udp.inject(device, src_addr, dst_addr, datagram);
    }

    /// Open a passive TCP socket on (address, port).
    pub fn tcp_listen(&self, addr: Address, port: u16) -> Result<tcp::SocketId> {
        self.tcp.listen(addr, port)
    }

    /// Open an active TCP connection to (address, port).
    pub fn tcp_connect(
        &self,
        addr: Address,
        port: u16,
        local_port: Option<u16>,
    ) -> Result<tcp::SocketId> {
        self.tcp.connect(addr, port, local_port)
    }

    /// Take the next established connection off a listening socket.
    pub fn tcp_accept(&self, socket: tcp::SocketId) -> Result<tcp::SocketId> {
        self.tcp.accept(socket)
    }

    /// Close a TCP connection or listener.
    pub fn tcp_close(&self, socket: tcp::SocketId) -> Result<()> {
        self.tcp.close(socket)
    }

    /// Queue payload on a TCP connection, returning the number of octets taken.
    pub fn tcp_send(&self, socket: tcp::SocketId, payload: Vec<u8>) -> Result<usize> {
        self.tcp.send(socket, payload)
    }

    /// Take received payload off a TCP connection.
    pub fn tcp_recv(&self, socket: tcp::SocketId) -> Result<Vec<u8>> {
        self.tcp.recv(socket)
    }

    /// Append a name server to consult for resolution.
    pub fn add_name_server(&self, addr: Address) {
        self.dns.add_server(addr);
    }

    /// Remove a name server.
    pub fn remove_name_server(&self, addr: Address) {
        self.dns.remove_server(addr);
    }

    /// Resolve a host name to its addresses.
    pub fn resolve(&self, name: &str) -> Result<Vec<Address>> {
        self.dns.resolve(name)
    }

    /// Resolve an address back to a host name.
    pub fn reverse(&self, addr: Address) -> Result<String> {
        self.dns.reverse(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::Error;

    #[test]
    fn usable_immediately_after_construction() {
        let stack = NetworkStack::new().unwrap();
        // Every loop is live once construction returns; the very first query must complete
        // rather than race start-up. The default engine answers, it does not hang.
        assert_eq!(
            stack.tcp_listen(Address::UNSPECIFIED, 80),
            Err(Error::Unsupported)
        );
    }

    #[test]
    fn default_collaborators_refuse() {
        let stack = NetworkStack::new().unwrap();
        assert_eq!(stack.resolve("example.org"), Err(Error::Unsupported));
        assert_eq!(
            stack.reverse(Address::new(192, 0, 2, 1)),
            Err(Error::Unsupported)
        );
        assert_eq!(
            stack.tcp_connect(Address::new(192, 0, 2, 1), 80, None),
            Err(Error::Unsupported)
        );
    }

    #[test]
    fn gateway_route_needs_direct_route() {
        let stack = NetworkStack::new().unwrap();
        let net = Cidr::new(Address::new(10, 0, 0, 0), 8);
        assert_eq!(
            stack.add_route(net, Address::new(192, 0, 2, 1)),
            Err(Error::Unreachable)
        );
    }
}
