//! The assembled stack: interface identity, shared buffers, and the public
//! API.
//!
//! [`NetStack`] owns everything with process lifetime — the device, the
//! clock, the two packet buffers, the ARP and UDP tables, the protocol
//! registrations, and the IP identification counter.  Ownership is threaded
//! explicitly: the protocol layers are free functions over [`StackCore`]
//! (all state except the buffers) and [`Buffers`], a split that lets an
//! egress layer write the transmit buffer while the tables are also being
//! updated.
//!
//! The stack is single-threaded and cooperative.  [`NetStack::poll`] runs
//! one receive to completion, including any synchronous ARP reply or ICMP
//! answer it provokes, before returning.

use std::time::Instant;

use crate::arp::{self, ArpState};
use crate::dispatch::ProtocolTable;
use crate::ethernet;
use crate::netdev::{NetDevice, NetStats};
use crate::packetbuf::PacketBuf;
use crate::types::{Ipv4Addr, MacAddr, NetError};
use crate::udp::{self, UdpHandler, UdpTable};
use crate::{UDP_MAX_PAYLOAD, icmp, ipv4};

/// Monotonic time source feeding TTL-based table expiry, in whole seconds.
///
/// The stack never sleeps on the clock; it only compares stamps.
pub trait Clock {
    fn now(&self) -> u64;
}

/// Wall-time [`Clock`] counting seconds since construction.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        self.origin.elapsed().as_secs()
    }
}

/// The interface identity: one MAC, one IPv4 address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IfaceConfig {
    pub mac: MacAddr,
    pub ip: Ipv4Addr,
}

/// The two process-lifetime packet buffers.
///
/// `rx` belongs to the ingress pipeline; `tx` is scratch space shared by
/// every egress path, valid only until the next egress call.
pub(crate) struct Buffers {
    pub(crate) rx: PacketBuf,
    pub(crate) tx: PacketBuf,
}

/// Everything except the buffers: device, clock, tables, counters.
pub(crate) struct StackCore {
    pub(crate) iface: IfaceConfig,
    pub(crate) dev: Box<dyn NetDevice>,
    pub(crate) clock: Box<dyn Clock>,
    pub(crate) protocols: ProtocolTable,
    pub(crate) arp: ArpState,
    pub(crate) udp: UdpTable,
    pub(crate) ip_id: u16,
    pub(crate) stats: NetStats,
}

/// A single-interface user-space network stack.  See the
/// [crate documentation](crate).
pub struct NetStack {
    core: StackCore,
    bufs: Buffers,
}

impl NetStack {
    /// Bring up the stack on `dev` with the given identity, using the
    /// system clock.
    pub fn new(dev: Box<dyn NetDevice>, iface: IfaceConfig) -> Self {
        Self::with_clock(dev, iface, Box::new(SystemClock::new()))
    }

    /// Bring up the stack with an explicit clock.
    ///
    /// Initialization order is ethernet → arp → ip → icmp → udp; ARP
    /// announces our presence with a broadcast request for our own address.
    pub fn with_clock(
        dev: Box<dyn NetDevice>,
        iface: IfaceConfig,
        clock: Box<dyn Clock>,
    ) -> Self {
        let mut core = StackCore {
            iface,
            dev,
            clock,
            protocols: ProtocolTable::new(),
            arp: ArpState::new(),
            udp: UdpTable::new(),
            ip_id: 0,
            stats: NetStats::new(),
        };
        let mut bufs = Buffers {
            rx: PacketBuf::frame(),
            tx: PacketBuf::datagram(),
        };

        arp::init(&mut core, &mut bufs);
        ipv4::init(&mut core);
        icmp::init(&mut core);
        udp::init(&mut core);

        Self { core, bufs }
    }

    /// Run one receive iteration.  Returns `true` if a frame was processed;
    /// the embedding application typically loops while this returns `true`,
    /// then waits for the device to become readable.
    pub fn poll(&mut self) -> bool {
        ethernet::poll(&mut self.core, &mut self.bufs)
    }

    /// Bind a handler to a UDP port.  Rebinding replaces the handler.
    pub fn udp_open(&mut self, port: u16, handler: UdpHandler) -> Result<(), NetError> {
        self.core.udp.open(port, handler)
    }

    /// Release a UDP port.
    pub fn udp_close(&mut self, port: u16) {
        self.core.udp.close(port);
    }

    /// Send one UDP datagram.
    ///
    /// Errors are reported only for caller mistakes (oversized payload) and
    /// immediate device failures.  A frame parked behind ARP resolution, or
    /// dropped because a request is already in flight, returns `Ok` — the
    /// stack gives no delivery feedback.
    pub fn udp_send(
        &mut self,
        data: &[u8],
        src_port: u16,
        dst_ip: Ipv4Addr,
        dst_port: u16,
    ) -> Result<(), NetError> {
        if data.len() > UDP_MAX_PAYLOAD {
            return Err(NetError::BufBounds);
        }
        let Self { core, bufs } = self;
        bufs.tx.load(data)?;
        udp::send_out(core, &mut bufs.tx, src_port, dst_ip, dst_port)
    }

    /// Snapshot of the stack counters.
    pub fn stats(&self) -> NetStats {
        self.core.stats
    }

    /// The configured interface identity.
    pub fn iface(&self) -> IfaceConfig {
        self.core.iface
    }

    /// Log the ARP resolution table at debug level.
    pub fn dump_arp(&self) {
        self.core.arp.dump();
    }
}
