//! UDP — checksumming datagram transport with in-process port handlers.
//!
//! Header: `src_port(2) | dst_port(2) | length(2) | checksum(2)`.  The
//! checksum binds the datagram to its addresses through a 12-byte
//! pseudo-header (`src-IP | dst-IP | zero | protocol | UDP length`) that is
//! materialized in the packet buffer just for the computation: pushed in
//! front of the UDP header, restored from a snapshot afterwards (on ingress
//! those twelve bytes are the tail of the IP header and must survive).
//!
//! Datagrams whose destination port has no handler are answered with ICMP
//! port-unreachable.

use log::debug;

use crate::cache::TtlCache;
use crate::dispatch::ProtocolHandler;
use crate::icmp;
use crate::ipv4;
use crate::packetbuf::{PacketBuf, internet_checksum};
use crate::stack::{Buffers, StackCore};
use crate::types::{Ipv4Addr, NetError};
use crate::{
    ICMP_CODE_PORT_UNREACHABLE, IPPROTO_UDP, IPV4_HEADER_LEN, UDP_HEADER_LEN,
    UDP_PSEUDO_HEADER_LEN,
};

/// Bound ports at any one time.
const UDP_PORT_CAPACITY: usize = 16;

/// Callback invoked for each datagram delivered to a bound port:
/// `(payload, source IP, destination port)`.
///
/// Handlers cannot reach back into the stack — the stack is exclusively
/// borrowed while they run.  Replies are sent once `poll` returns.
pub type UdpHandler = Box<dyn FnMut(&[u8], Ipv4Addr, u16)>;

/// The port table.  Entries never expire; a bound port stays bound until
/// closed.
pub(crate) struct UdpTable {
    ports: TtlCache<u16, UdpHandler>,
}

impl UdpTable {
    pub(crate) fn new() -> Self {
        Self {
            ports: TtlCache::new(UDP_PORT_CAPACITY, 0),
        }
    }

    /// Bind `handler` to `port`.  Rebinding a port replaces its handler;
    /// a full table is an error rather than an eviction.
    pub(crate) fn open(&mut self, port: u16, handler: UdpHandler) -> Result<(), NetError> {
        if !self.ports.contains(port, 0) && self.ports.len() >= self.ports.capacity() {
            return Err(NetError::TableFull);
        }
        self.ports.insert(port, handler, 0);
        Ok(())
    }

    pub(crate) fn close(&mut self, port: u16) {
        self.ports.remove(port);
    }

    fn bound(&mut self, port: u16) -> bool {
        self.ports.contains(port, 0)
    }
}

/// Register with the demultiplexer.
pub(crate) fn init(core: &mut StackCore) {
    core.protocols
        .register(IPPROTO_UDP as u16, ProtocolHandler::Udp);
}

/// Compute the UDP checksum of the datagram at the front of `buf`.
///
/// Pushes the pseudo-header, pads an odd-length datagram with one zero
/// byte, sums, then restores the buffer exactly.  Per RFC 768 a computed
/// value of zero is transmitted as `0xFFFF`, so zero never appears on the
/// wire and the comparison on ingress stays symmetric.
fn checksum(buf: &mut PacketBuf, src_ip: Ipv4Addr, dst_ip: Ipv4Addr) -> Result<u16, NetError> {
    let udp_len = {
        let data = buf.payload();
        [data[4], data[5]]
    };

    let mut snapshot = [0u8; UDP_PSEUDO_HEADER_LEN];
    {
        let pseudo = buf.push_header(UDP_PSEUDO_HEADER_LEN)?;
        snapshot.copy_from_slice(pseudo);
        pseudo[0..4].copy_from_slice(src_ip.as_bytes());
        pseudo[4..8].copy_from_slice(dst_ip.as_bytes());
        pseudo[8] = 0;
        pseudo[9] = IPPROTO_UDP;
        pseudo[10..12].copy_from_slice(&udp_len);
    }

    let odd = buf.len() % 2 == 1;
    if odd {
        buf.pad(1)?;
    }
    let cksum = internet_checksum(buf.payload());
    if odd {
        buf.trim(1)?;
    }

    buf.payload_mut()[..UDP_PSEUDO_HEADER_LEN].copy_from_slice(&snapshot);
    buf.pull_header(UDP_PSEUDO_HEADER_LEN)?;

    Ok(if cksum == 0 { 0xFFFF } else { cksum })
}

/// Handle one received UDP datagram.
pub(crate) fn handle_rx(
    core: &mut StackCore,
    bufs: &mut Buffers,
    src_ip: Ipv4Addr,
) -> Result<(), NetError> {
    let (dst_port, wire_cksum) = {
        let data = bufs.rx.payload();
        if data.len() < UDP_HEADER_LEN {
            debug!("udp: datagram too short ({} < {})", data.len(), UDP_HEADER_LEN);
            return Err(NetError::InvalidFrame);
        }
        let udp_len = u16::from_be_bytes([data[4], data[5]]) as usize;
        if udp_len < UDP_HEADER_LEN {
            debug!("udp: bad length field {udp_len}");
            return Err(NetError::InvalidFrame);
        }
        (
            u16::from_be_bytes([data[2], data[3]]),
            u16::from_be_bytes([data[6], data[7]]),
        )
    };

    // Verify against the on-wire value, then put it back.
    bufs.rx.payload_mut()[6..8].fill(0);
    let computed = checksum(&mut bufs.rx, src_ip, core.iface.ip)?;
    bufs.rx.payload_mut()[6..8].copy_from_slice(&wire_cksum.to_be_bytes());
    if computed != wire_cksum {
        debug!("udp: checksum mismatch ({computed:#06x} != {wire_cksum:#06x})");
        return Err(NetError::InvalidFrame);
    }

    if !core.udp.bound(dst_port) {
        debug!("udp: no handler for port {dst_port}, answering unreachable");
        // Re-expose the IP header for the ICMP quote.
        bufs.rx.push_header(IPV4_HEADER_LEN)?;
        icmp::send_unreachable(core, bufs, src_ip, ICMP_CODE_PORT_UNREACHABLE);
        return Err(NetError::NoHandler);
    }

    bufs.rx.pull_header(UDP_HEADER_LEN)?;
    let payload = bufs.rx.payload();
    if let Some(handler) = core.udp.ports.get_mut(dst_port, 0) {
        handler(payload, src_ip, dst_port);
    }
    Ok(())
}

/// Prepend a UDP header to the payload in `buf` and emit via IPv4.
pub(crate) fn send_out(
    core: &mut StackCore,
    buf: &mut PacketBuf,
    src_port: u16,
    dst_ip: Ipv4Addr,
    dst_port: u16,
) -> Result<(), NetError> {
    let udp_len = (buf.len() + UDP_HEADER_LEN) as u16;

    let hdr = buf.push_header(UDP_HEADER_LEN)?;
    hdr[0..2].copy_from_slice(&src_port.to_be_bytes());
    hdr[2..4].copy_from_slice(&dst_port.to_be_bytes());
    hdr[4..6].copy_from_slice(&udp_len.to_be_bytes());
    hdr[6..8].fill(0);

    let src_ip = core.iface.ip;
    let cksum = checksum(buf, src_ip, dst_ip)?;
    buf.payload_mut()[6..8].copy_from_slice(&cksum.to_be_bytes());

    ipv4::send(core, buf, dst_ip, IPPROTO_UDP)
}
