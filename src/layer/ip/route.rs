//! The routing table, relevant rfc1519, rfc4632.
use std::sync::Arc;

use crate::layer::{Error, Result};
use crate::nic::Device;
use crate::wire::ip::{Address, Cidr};

/// A resolved path to a destination.
///
/// Everything a sender needs to put a packet on the wire: the source address to claim, the
/// neighbor to resolve, the device to leave through and how large the packet may be.
#[derive(Clone)]
pub struct RouteInfo {
    /// The device the packet leaves through.
    pub device: Arc<Device>,
    /// The local address to use as source.
    pub source: Address,
    /// The neighbor the packet is handed to, the destination itself on a direct route.
    pub next_hop: Address,
    /// The maximum transmission unit along this route.
    pub mtu: usize,
}

#[derive(Clone, Copy)]
enum Via {
    Direct,
    Gateway(Address),
}

struct Route {
    net: Cidr,
    via: Via,
    device: Arc<Device>,
    source: Address,
    mtu: usize,
}

/// The routing table of the IP layer, owned by its process.
pub(crate) struct Routes {
    routes: Vec<Route>,
}

impl Routes {
    pub(crate) fn new() -> Self {
        Routes { routes: Vec::new() }
    }

    /// Add a local address, establishing a direct route to its network.
    pub(crate) fn add_direct(&mut self, device: Arc<Device>, cidr: Cidr, mtu: usize) {
        self.routes.push(Route {
            net: cidr,
            via: Via::Direct,
            device,
            source: cidr.address(),
            mtu,
        });
    }

    /// Add an indirect route through a gateway.
    ///
    /// The gateway itself must be reachable through a direct route; the new route inherits that
    /// route's device and source address.
    pub(crate) fn add_gateway(&mut self, net: Cidr, gateway: Address) -> Result<()> {
        let via = self
            .routes
            .iter()
            .filter(|route| matches!(route.via, Via::Direct) && route.net.contains(gateway))
            .max_by_key(|route| route.net.prefix())
            .ok_or(Error::Unreachable)?;

        let (device, source, mtu) = (via.device.clone(), via.source, via.mtu);
        self.routes.push(Route { net, via: Via::Gateway(gateway), device, source, mtu });
        Ok(())
    }

    /// Resolve the best matching route for a destination, longest prefix first.
    pub(crate) fn lookup(&self, dst_addr: Address) -> Option<RouteInfo> {
        self.routes
            .iter()
            .filter(|route| route.net.contains(dst_addr))
            .max_by_key(|route| route.net.prefix())
            .map(|route| RouteInfo {
                device: route.device.clone(),
                source: route.source,
                next_hop: match route.via {
                    Via::Direct => dst_addr,
                    Via::Gateway(gateway) => gateway,
                },
                mtu: route.mtu,
            })
    }

    /// Whether the address names this host: a bound address or a broadcast we listen to.
    pub(crate) fn is_local(&self, addr: Address) -> bool {
        addr.is_broadcast()
            || self.routes.iter().any(|route| {
                route.source == addr
                    || (matches!(route.via, Via::Direct) && route.net.broadcast() == addr)
            })
    }
}
