//! ARP — address resolution and the egress gate that depends on it.
//!
//! Two tables drive the protocol (RFC 826, Ethernet/IPv4 only):
//!
//! - the **resolution table** maps IP → MAC and is refreshed by every
//!   validated ARP frame a peer sends, expiring after
//!   [`ARP_TIMEOUT_SECS`](crate::ARP_TIMEOUT_SECS);
//! - the **pending table** parks one deep-copied egress frame per
//!   unresolved next hop.  Its TTL,
//!   [`ARP_MIN_INTERVAL_SECS`](crate::ARP_MIN_INTERVAL_SECS), doubles as
//!   the minimum gap between requests for the same destination: while an
//!   entry exists, further egress to that address is dropped.
//!
//! State machine per destination: **Unknown** (in neither table) →
//! **Resolving** (parked in pending, request broadcast) → **Resolved**
//! (in the resolution table).  Any ARP frame whose sender matches a pending
//! key releases the parked frame — a request that reveals the MAC unblocks
//! waiters just as a reply does.  Entries fall back to Unknown by aging out.
//!
//! The parked frame must be a deep copy: the transmit buffer it came from is
//! trampled immediately by the outgoing ARP request itself.

use log::debug;

use crate::cache::TtlCache;
use crate::dispatch::ProtocolHandler;
use crate::ethernet;
use crate::packetbuf::PacketBuf;
use crate::stack::{Buffers, StackCore};
use crate::types::{Ipv4Addr, MacAddr, NetError, NetProtocol};
use crate::{
    ARP_HLEN_ETHERNET, ARP_HTYPE_ETHERNET, ARP_MIN_INTERVAL_SECS, ARP_OPER_REPLY,
    ARP_OPER_REQUEST, ARP_PACKET_LEN, ARP_PLEN_IPV4, ARP_PTYPE_IPV4, ARP_TIMEOUT_SECS,
    ETHERTYPE_ARP,
};

/// Resolution table entries.
const ARP_TABLE_CAPACITY: usize = 32;
/// Pending (parked frame) entries.
const ARP_PENDING_CAPACITY: usize = 8;

/// The two ARP tables.
pub(crate) struct ArpState {
    table: TtlCache<Ipv4Addr, MacAddr>,
    pending: TtlCache<Ipv4Addr, PacketBuf>,
}

impl ArpState {
    pub(crate) fn new() -> Self {
        Self {
            table: TtlCache::new(ARP_TABLE_CAPACITY, ARP_TIMEOUT_SECS),
            pending: TtlCache::new(ARP_PENDING_CAPACITY, ARP_MIN_INTERVAL_SECS),
        }
    }

    /// Log the resolution table.
    pub(crate) fn dump(&self) {
        debug!("arp: resolution table ({} entries)", self.table.len());
        for (ip, mac, stamp) in self.table.iter() {
            debug!("arp:   {ip} -> {mac} (stamp {stamp})");
        }
    }
}

/// Register with the demultiplexer and announce ourselves: a broadcast
/// request for our own address seeds peer caches with our MAC.
pub(crate) fn init(core: &mut StackCore, bufs: &mut Buffers) {
    core.protocols.register(ETHERTYPE_ARP, ProtocolHandler::Arp);
    let our_ip = core.iface.ip;
    let _ = send_request(core, &mut bufs.tx, our_ip);
}

/// Handle one received ARP packet.
///
/// `src_mac` is the source address from the Ethernet header.  Replies go to
/// that address, not to the sender-MAC field inside the ARP payload, so a
/// spoofed payload cannot redirect them.
pub(crate) fn handle_rx(
    core: &mut StackCore,
    bufs: &mut Buffers,
    src_mac: MacAddr,
) -> Result<(), NetError> {
    let data = bufs.rx.payload();
    if data.len() < ARP_PACKET_LEN {
        debug!("arp: packet too short ({} < {})", data.len(), ARP_PACKET_LEN);
        return Err(NetError::InvalidFrame);
    }

    let htype = u16::from_be_bytes([data[0], data[1]]);
    let ptype = u16::from_be_bytes([data[2], data[3]]);
    let hlen = data[4];
    let plen = data[5];
    let oper = u16::from_be_bytes([data[6], data[7]]);

    if htype != ARP_HTYPE_ETHERNET
        || ptype != ARP_PTYPE_IPV4
        || hlen != ARP_HLEN_ETHERNET
        || plen != ARP_PLEN_IPV4
    {
        debug!("arp: malformed header (htype={htype}, ptype={ptype:#06x}, hlen={hlen}, plen={plen})");
        return Err(NetError::InvalidFrame);
    }
    if oper != ARP_OPER_REQUEST && oper != ARP_OPER_REPLY {
        debug!("arp: unknown opcode {oper}");
        return Err(NetError::InvalidFrame);
    }

    let sender_mac = MacAddr([data[8], data[9], data[10], data[11], data[12], data[13]]);
    let sender_ip = Ipv4Addr([data[14], data[15], data[16], data[17]]);
    let target_ip = Ipv4Addr([data[24], data[25], data[26], data[27]]);

    // Any valid ARP frame teaches us the sender's address.
    let now = core.clock.now();
    core.arp.table.insert(sender_ip, sender_mac, now);

    // A frame parked behind this sender can go out now, whatever the
    // opcode was.  The parked frame takes priority over answering a
    // request in the same packet.
    if let Some(mut parked) = core.arp.pending.take(sender_ip, now) {
        debug!("arp: {sender_ip} resolved to {sender_mac}, releasing parked frame");
        let _ = ethernet::send(core, &mut parked, sender_mac, NetProtocol::Ipv4);
    } else if oper == ARP_OPER_REQUEST && target_ip == core.iface.ip {
        debug!("arp: request for our address from {sender_ip} ({src_mac}), replying");
        send_reply(core, &mut bufs.tx, sender_ip, src_mac);
    }
    Ok(())
}

/// Egress gate: send `buf` to `next_hop`, resolving the MAC first.
///
/// - Resolved: frame goes straight to the device.
/// - Resolving (pending entry exists): the frame is dropped — one request
///   per destination per interval.
/// - Unknown: the frame is parked as a deep copy and a request goes out,
///   reusing `buf` as scratch.
///
/// The drop cases are policy, not failures: they are counted and swallowed
/// so a multi-fragment datagram keeps emitting its remaining fragments.
pub(crate) fn resolve_out(
    core: &mut StackCore,
    buf: &mut PacketBuf,
    next_hop: Ipv4Addr,
) -> Result<(), NetError> {
    match try_resolve(core, buf, next_hop) {
        Err(NetError::NoRoute) => {
            core.stats.tx_dropped += 1;
            Ok(())
        }
        other => other,
    }
}

fn try_resolve(
    core: &mut StackCore,
    buf: &mut PacketBuf,
    next_hop: Ipv4Addr,
) -> Result<(), NetError> {
    let now = core.clock.now();

    if let Some(mac) = core.arp.table.get(next_hop, now).copied() {
        return ethernet::send(core, buf, mac, NetProtocol::Ipv4);
    }

    if core.arp.pending.contains(next_hop, now) {
        debug!("arp: resolution of {next_hop} already in flight, dropping frame");
        return Err(NetError::NoRoute);
    }

    core.arp.pending.purge(now);
    if core.arp.pending.len() >= core.arp.pending.capacity() {
        debug!("arp: pending table full, dropping frame for {next_hop}");
        return Err(NetError::NoRoute);
    }

    core.arp.pending.insert(next_hop, buf.deep_copy(), now);
    send_request(core, buf, next_hop)
}

/// Broadcast a request for `target_ip`, building it in `buf`.
pub(crate) fn send_request(
    core: &mut StackCore,
    buf: &mut PacketBuf,
    target_ip: Ipv4Addr,
) -> Result<(), NetError> {
    buf.reset(ARP_PACKET_LEN)?;
    fill_packet(
        buf.payload_mut(),
        ARP_OPER_REQUEST,
        core.iface.mac,
        core.iface.ip,
        MacAddr::ZERO,
        target_ip,
    );
    ethernet::send(core, buf, MacAddr::BROADCAST, NetProtocol::Arp)
}

/// Send a unicast reply claiming our address, building it in `buf`.
fn send_reply(core: &mut StackCore, buf: &mut PacketBuf, target_ip: Ipv4Addr, target_mac: MacAddr) {
    if buf.reset(ARP_PACKET_LEN).is_err() {
        return;
    }
    fill_packet(
        buf.payload_mut(),
        ARP_OPER_REPLY,
        core.iface.mac,
        core.iface.ip,
        target_mac,
        target_ip,
    );
    let _ = ethernet::send(core, buf, target_mac, NetProtocol::Arp);
}

/// Serialize one 28-byte ARP packet into `packet`.
fn fill_packet(
    packet: &mut [u8],
    oper: u16,
    sender_mac: MacAddr,
    sender_ip: Ipv4Addr,
    target_mac: MacAddr,
    target_ip: Ipv4Addr,
) {
    packet[0..2].copy_from_slice(&ARP_HTYPE_ETHERNET.to_be_bytes());
    packet[2..4].copy_from_slice(&ARP_PTYPE_IPV4.to_be_bytes());
    packet[4] = ARP_HLEN_ETHERNET;
    packet[5] = ARP_PLEN_IPV4;
    packet[6..8].copy_from_slice(&oper.to_be_bytes());
    packet[8..14].copy_from_slice(sender_mac.as_bytes());
    packet[14..18].copy_from_slice(sender_ip.as_bytes());
    packet[18..24].copy_from_slice(target_mac.as_bytes());
    packet[24..28].copy_from_slice(target_ip.as_bytes());
}
