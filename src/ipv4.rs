//! IPv4 ingress validation/demux and fragmenting egress.
//!
//! # Ingress
//!
//! [`handle_rx`] validates the header (version, IHL, total length, checksum,
//! destination, TTL), trims link-layer tail padding, answers unknown
//! protocols with ICMP protocol-unreachable, then strips the header and
//! re-dispatches by protocol number.
//!
//! Ingress does **not** reassemble fragments.  The flags/offset word is not
//! inspected; a fragmented datagram reaches the transport layer truncated
//! and dies on its checksum.  This is a deliberate scope limit, not an
//! oversight.
//!
//! # Egress
//!
//! [`send`] emits a datagram, splitting it into
//! [`IP_MAX_FRAGMENT`](crate::IP_MAX_FRAGMENT)-byte fragments when it
//! exceeds the link MTU.  All fragments of one datagram carry the same
//! identification value; the process-wide counter advances once per
//! datagram, after the final fragment.  A zero-length payload still emits
//! one (empty) datagram.

use log::debug;

use crate::dispatch::{self, ProtocolHandler, SourceAddr};
use crate::icmp;
use crate::netdev::NetDeviceFeatures;
use crate::packetbuf::{PacketBuf, ipv4_header_checksum};
use crate::stack::{Buffers, StackCore};
use crate::types::{Ipv4Addr, MacAddr, NetError};
use crate::{
    ETHERTYPE_IPV4, ICMP_CODE_PROTOCOL_UNREACHABLE, IP_DEFAULT_TTL, IP_FLAG_MF, IP_FRAGMENT_UNIT,
    IP_MAX_FRAGMENT, IPPROTO_ICMP, IPPROTO_UDP, IPV4_HEADER_LEN, IPV4_VERSION, arp,
};

/// Register with the demultiplexer.
pub(crate) fn init(core: &mut StackCore) {
    core.protocols.register(ETHERTYPE_IPV4, ProtocolHandler::Ipv4);
}

/// Handle one received IPv4 datagram.
///
/// The receive window starts at the first header byte; on successful
/// validation the header is stripped and the payload dispatched with the
/// source IP.
pub(crate) fn handle_rx(
    core: &mut StackCore,
    bufs: &mut Buffers,
    _src_mac: MacAddr,
) -> Result<(), NetError> {
    let checksum_rx = core.dev.features().contains(NetDeviceFeatures::CHECKSUM_RX);

    let (proto, src_ip, total_len) = {
        let data = bufs.rx.payload();
        if data.len() < IPV4_HEADER_LEN {
            debug!("ipv4: packet too short ({} < {})", data.len(), IPV4_HEADER_LEN);
            return Err(NetError::InvalidFrame);
        }

        let version = data[0] >> 4;
        if version != IPV4_VERSION {
            debug!("ipv4: bad version {version}");
            return Err(NetError::InvalidFrame);
        }

        // No options on this link: exactly five header words.
        let ihl = (data[0] & 0x0F) as usize;
        if ihl * 4 != IPV4_HEADER_LEN {
            debug!("ipv4: unsupported IHL {ihl}");
            return Err(NetError::InvalidFrame);
        }

        let total_len = u16::from_be_bytes([data[2], data[3]]) as usize;
        if total_len > data.len() || total_len < IPV4_HEADER_LEN {
            debug!("ipv4: bad total length {} (packet len {})", total_len, data.len());
            return Err(NetError::InvalidFrame);
        }

        if !checksum_rx {
            let stored = u16::from_be_bytes([data[10], data[11]]);
            let computed = ipv4_header_checksum(&data[..IPV4_HEADER_LEN]);
            if computed != stored {
                debug!("ipv4: header checksum mismatch ({computed:#06x} != {stored:#06x})");
                return Err(NetError::InvalidFrame);
            }
        }

        let ttl = data[8];
        if ttl == 0 {
            debug!("ipv4: TTL=0, dropping");
            return Err(NetError::InvalidFrame);
        }

        let dst_ip = Ipv4Addr([data[16], data[17], data[18], data[19]]);
        if dst_ip != core.iface.ip {
            return Err(NetError::InvalidFrame);
        }

        let src_ip = Ipv4Addr([data[12], data[13], data[14], data[15]]);
        (data[9], src_ip, total_len)
    };

    // Strip link-layer tail padding so upper layers see the datagram alone.
    let excess = bufs.rx.len() - total_len;
    if excess > 0 {
        bufs.rx.trim(excess)?;
    }

    if proto != IPPROTO_UDP && proto != IPPROTO_ICMP {
        debug!("ipv4: unsupported protocol {proto}, answering unreachable");
        icmp::send_unreachable(core, bufs, src_ip, ICMP_CODE_PROTOCOL_UNREACHABLE);
        return Err(NetError::Unsupported);
    }

    bufs.rx.pull_header(IPV4_HEADER_LEN)?;
    dispatch::net_in(core, bufs, proto as u16, SourceAddr::Net(src_ip));
    Ok(())
}

/// Emit one datagram, fragmenting as needed.
pub(crate) fn send(
    core: &mut StackCore,
    buf: &mut PacketBuf,
    dst_ip: Ipv4Addr,
    proto: u8,
) -> Result<(), NetError> {
    if buf.len() <= IP_MAX_FRAGMENT {
        let id = core.ip_id;
        fragment_out(core, buf, dst_ip, proto, id, 0, false)?;
        core.ip_id = core.ip_id.wrapping_add(1);
        return Ok(());
    }

    let id = core.ip_id;
    let mut emitted = 0usize;
    while buf.len() > IP_MAX_FRAGMENT {
        let mut frag = PacketBuf::frame();
        frag.load(&buf.payload()[..IP_MAX_FRAGMENT])?;
        fragment_out(
            core,
            &mut frag,
            dst_ip,
            proto,
            id,
            (emitted / IP_FRAGMENT_UNIT) as u16,
            true,
        )?;
        buf.pull_header(IP_MAX_FRAGMENT)?;
        emitted += IP_MAX_FRAGMENT;
    }

    let mut frag = PacketBuf::frame();
    frag.load(buf.payload())?;
    fragment_out(
        core,
        &mut frag,
        dst_ip,
        proto,
        id,
        (emitted / IP_FRAGMENT_UNIT) as u16,
        false,
    )?;
    core.ip_id = core.ip_id.wrapping_add(1);
    Ok(())
}

/// Prepend one IPv4 header to `buf` and hand the packet to ARP.
///
/// `offset_units` is the fragment offset in eight-byte units; `more` sets
/// the MF bit.
pub(crate) fn fragment_out(
    core: &mut StackCore,
    buf: &mut PacketBuf,
    dst_ip: Ipv4Addr,
    proto: u8,
    id: u16,
    offset_units: u16,
    more: bool,
) -> Result<(), NetError> {
    let total_len = (buf.len() + IPV4_HEADER_LEN) as u16;
    let src_ip = core.iface.ip;

    let hdr = buf.push_header(IPV4_HEADER_LEN)?;
    hdr[0] = (IPV4_VERSION << 4) | (IPV4_HEADER_LEN / 4) as u8;
    hdr[1] = 0;
    hdr[2..4].copy_from_slice(&total_len.to_be_bytes());
    hdr[4..6].copy_from_slice(&id.to_be_bytes());
    let flags_offset = if more {
        IP_FLAG_MF | offset_units
    } else {
        offset_units
    };
    hdr[6..8].copy_from_slice(&flags_offset.to_be_bytes());
    hdr[8] = IP_DEFAULT_TTL;
    hdr[9] = proto;
    hdr[10..12].fill(0);
    hdr[12..16].copy_from_slice(src_ip.as_bytes());
    hdr[16..20].copy_from_slice(dst_ip.as_bytes());
    let cksum = ipv4_header_checksum(hdr);
    hdr[10..12].copy_from_slice(&cksum.to_be_bytes());

    arp::resolve_out(core, buf, dst_ip)
}
