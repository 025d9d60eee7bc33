use crate::wire::Checksum;

/// A general description of a device.
///
/// The interaction with these happens purely via methods. This leaves the implementation open to
/// additions in the future, primarily concerning support for other protocols with support from
/// significant network cards.
#[derive(Clone, Debug)]
pub struct Personality {
    capabilities: Capabilities,
}

/// Operations supported natively by the card.
///
/// Such as offloading of checksum algorithms. The usage for a device is to instantiate a baseline
/// with no support for any upper layer and then adjust those for which support can be provided.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    ipv4: Protocol,
    icmpv4: Protocol,
    udp: Protocol,
    tcp: Protocol,
}

/// The extent of support for a specific protocol.
///
/// This is mostly about checksums in a particular protocol. Each direction of packet flow is
/// described separately since cards commonly verify on receive but do not insert on transmit, or
/// the other way around.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Protocol {
    send: Checksum,
    receive: Checksum,
}

impl Personality {
    /// A personality with no extras.
    ///
    /// Indicates no support for any upper layer protocols; every checksum is computed and
    /// verified by the stack.
    pub fn baseline() -> Self {
        Personality {
            capabilities: Capabilities::no_support(),
        }
    }

    /// Check the capabilities of the interface.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Mutably get the capabilities which allows for modifications.
    pub fn capabilities_mut(&mut self) -> &mut Capabilities {
        &mut self.capabilities
    }
}

impl Capabilities {
    /// Instantiates capabilities that are completely oblivious to the upper protocol layers.
    pub fn no_support() -> Self {
        Capabilities {
            ipv4: Protocol::no_support(),
            icmpv4: Protocol::no_support(),
            udp: Protocol::no_support(),
            tcp: Protocol::no_support(),
        }
    }

    /// Check IPv4 support descriptor.
    pub fn ipv4(&self) -> &Protocol {
        &self.ipv4
    }

    /// Mutably get IPv4 support descriptor.
    pub fn ipv4_mut(&mut self) -> &mut Protocol {
        &mut self.ipv4
    }

    /// Check ICMPv4 support descriptor.
    pub fn icmpv4(&self) -> &Protocol {
        &self.icmpv4
    }

    /// Mutably get ICMPv4 support descriptor.
    pub fn icmpv4_mut(&mut self) -> &mut Protocol {
        &mut self.icmpv4
    }

    /// Check UDP support descriptor.
    pub fn udp(&self) -> &Protocol {
        &self.udp
    }

    /// Mutably get UDP support descriptor.
    pub fn udp_mut(&mut self) -> &mut Protocol {
        &mut self.udp
    }

    /// Check TCP support descriptor.
    pub fn tcp(&self) -> &Protocol {
        &self.tcp
    }

    /// Mutably get TCP support descriptor.
    pub fn tcp_mut(&mut self) -> &mut Protocol {
        &mut self.tcp
    }
}

impl Protocol {
    /// Create a protocol support descriptor without any supported feature.
    ///
    /// This means that the stack needs to perform all checksums manually.
    pub fn no_support() -> Self {
        Protocol {
            send: Checksum::Manual,
            receive: Checksum::Manual,
        }
    }

    /// Expect the underlying card to do all checksum work in both directions.
    pub fn offloaded() -> Self {
        Protocol {
            send: Checksum::Ignored,
            receive: Checksum::Ignored,
        }
    }

    /// Get the receive checksum descriptor.
    pub fn rx_checksum(&self) -> Checksum {
        self.receive
    }

    /// Mutably get the receive checksum descriptor.
    pub fn rx_checksum_mut(&mut self) -> &mut Checksum {
        &mut self.receive
    }

    /// Get the transmit checksum descriptor.
    pub fn tx_checksum(&self) -> Checksum {
        self.send
    }

    /// Mutably get the transmit checksum descriptor.
    pub fn tx_checksum_mut(&mut self) -> &mut Checksum {
        &mut self.send
    }
}
