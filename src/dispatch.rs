//! Protocol demultiplexer.
//!
//! One registration table serves both demux points in the ingress pipeline:
//! Ethernet looks up ethertypes, IPv4 looks up protocol numbers.  The two
//! code ranges are disjoint (ethertypes are ≥ `0x0600`, IP protocol numbers
//! fit in a byte), so a single 16-bit key space covers both.
//!
//! Handlers are a closed enum rather than function values: every handler
//! needs mutable access to the stack state, and a tag dispatched through one
//! `match` lets the borrow checker see that only one layer runs at a time.

use log::debug;

use crate::stack::{Buffers, StackCore};
use crate::types::{Ipv4Addr, MacAddr, NetError};
use crate::{arp, icmp, ipv4, udp};

/// Slots in the registration table.  Four protocols register at init; the
/// spare slots keep registration order-independent.
const MAX_PROTOCOLS: usize = 8;

/// Ingress handlers the table can route to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ProtocolHandler {
    Arp,
    Ipv4,
    Icmp,
    Udp,
}

/// Where a packet came from, as seen by the layer below.
///
/// Link-layer handlers receive the source MAC from the Ethernet header;
/// network-layer handlers receive the source IP from the IPv4 header.
#[derive(Clone, Copy, Debug)]
pub(crate) enum SourceAddr {
    Link(MacAddr),
    Net(Ipv4Addr),
}

/// Registration table mapping a demux code to its handler.
pub(crate) struct ProtocolTable {
    entries: [Option<(u16, ProtocolHandler)>; MAX_PROTOCOLS],
}

impl ProtocolTable {
    pub(crate) fn new() -> Self {
        Self {
            entries: [None; MAX_PROTOCOLS],
        }
    }

    /// Register `handler` under `code`.  Re-registering a code replaces the
    /// handler.  A full table logs and ignores the request; with
    /// [`MAX_PROTOCOLS`] slots and four registrations this does not happen.
    pub(crate) fn register(&mut self, code: u16, handler: ProtocolHandler) {
        for slot in &mut self.entries {
            if let Some((existing, h)) = slot {
                if *existing == code {
                    *h = handler;
                    return;
                }
            }
        }
        for slot in &mut self.entries {
            if slot.is_none() {
                *slot = Some((code, handler));
                return;
            }
        }
        debug!("net: protocol table full, {code:#06x} not registered");
    }

    pub(crate) fn lookup(&self, code: u16) -> Option<ProtocolHandler> {
        self.entries
            .iter()
            .flatten()
            .find(|(c, _)| *c == code)
            .map(|(_, h)| *h)
    }
}

/// Route a packet to the handler registered for `code`.
///
/// The packet is in the receive buffer with its window at the first byte of
/// the protocol's own header.  Unregistered codes are dropped silently, and
/// a handler's ingress error ends here too: it is counted, never surfaced.
pub(crate) fn net_in(core: &mut StackCore, bufs: &mut Buffers, code: u16, src: SourceAddr) {
    let Some(handler) = core.protocols.lookup(code) else {
        debug!("net: no handler for {code:#06x}, dropping");
        core.stats.rx_dropped += 1;
        return;
    };

    let result = match (handler, src) {
        (ProtocolHandler::Arp, SourceAddr::Link(mac)) => arp::handle_rx(core, bufs, mac),
        (ProtocolHandler::Ipv4, SourceAddr::Link(mac)) => ipv4::handle_rx(core, bufs, mac),
        (ProtocolHandler::Icmp, SourceAddr::Net(ip)) => icmp::handle_rx(core, bufs, ip),
        (ProtocolHandler::Udp, SourceAddr::Net(ip)) => udp::handle_rx(core, bufs, ip),
        (handler, src) => {
            debug!("net: {handler:?} dispatched with mismatched source {src:?}");
            Err(NetError::InvalidFrame)
        }
    };
    if result.is_err() {
        core.stats.rx_dropped += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_lookup() {
        let mut table = ProtocolTable::new();
        table.register(0x0806, ProtocolHandler::Arp);
        table.register(17, ProtocolHandler::Udp);

        assert_eq!(table.lookup(0x0806), Some(ProtocolHandler::Arp));
        assert_eq!(table.lookup(17), Some(ProtocolHandler::Udp));
        assert_eq!(table.lookup(0x0800), None);
    }

    #[test]
    fn reregistering_replaces() {
        let mut table = ProtocolTable::new();
        table.register(17, ProtocolHandler::Udp);
        table.register(17, ProtocolHandler::Icmp);
        assert_eq!(table.lookup(17), Some(ProtocolHandler::Icmp));
    }
}
