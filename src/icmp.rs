//! ICMP — echo reply and destination unreachable.
//!
//! Header: `type(1) | code(1) | checksum(2) | id(2) | seq(2)`.  Only echo
//! requests are answered; everything else is ignored.  The unreachable
//! emitter is shared with the IPv4 and UDP layers.

use log::debug;

use crate::dispatch::ProtocolHandler;
use crate::ipv4;
use crate::packetbuf::internet_checksum;
use crate::stack::{Buffers, StackCore};
use crate::types::{Ipv4Addr, NetError};
use crate::{
    ICMP_HEADER_LEN, ICMP_TYPE_ECHO_REPLY, ICMP_TYPE_ECHO_REQUEST, ICMP_TYPE_UNREACHABLE,
    IPPROTO_ICMP,
};

/// Register with the demultiplexer.
pub(crate) fn init(core: &mut StackCore) {
    core.protocols
        .register(IPPROTO_ICMP as u16, ProtocolHandler::Icmp);
}

/// Handle one received ICMP message.  Types other than echo request are
/// ignored without an error.
pub(crate) fn handle_rx(
    core: &mut StackCore,
    bufs: &mut Buffers,
    src_ip: Ipv4Addr,
) -> Result<(), NetError> {
    let data = bufs.rx.payload();
    if data.len() < ICMP_HEADER_LEN {
        debug!("icmp: message too short ({} < {})", data.len(), ICMP_HEADER_LEN);
        return Err(NetError::InvalidFrame);
    }

    if data[0] == ICMP_TYPE_ECHO_REQUEST {
        send_echo_reply(core, bufs, src_ip);
    }
    Ok(())
}

/// Answer the echo request in the receive buffer.
///
/// The reply is the request byte for byte — id, sequence, and echo data
/// included — with the type flipped and the checksum recomputed over the
/// whole message.
fn send_echo_reply(core: &mut StackCore, bufs: &mut Buffers, src_ip: Ipv4Addr) {
    if bufs.tx.reset(bufs.rx.len()).is_err() {
        return;
    }
    bufs.tx.payload_mut().copy_from_slice(bufs.rx.payload());

    let reply = bufs.tx.payload_mut();
    reply[0] = ICMP_TYPE_ECHO_REPLY;
    reply[1] = 0;
    reply[2..4].fill(0);
    let cksum = internet_checksum(bufs.tx.payload());
    bufs.tx.payload_mut()[2..4].copy_from_slice(&cksum.to_be_bytes());

    let _ = ipv4::send(core, &mut bufs.tx, src_ip, IPPROTO_ICMP);
}

/// Emit a destination-unreachable carrying the offending packet's IP header
/// plus its first eight payload bytes.
///
/// The receive window must start at the offending IP header.  The checksum
/// covers the bytes actually emitted, including a quoted header longer than
/// twenty bytes.
pub(crate) fn send_unreachable(
    core: &mut StackCore,
    bufs: &mut Buffers,
    src_ip: Ipv4Addr,
    code: u8,
) {
    let data = bufs.rx.payload();
    if data.is_empty() {
        return;
    }
    let ihl = ((data[0] & 0x0F) as usize) * 4;
    let quote_len = (ihl + 8).min(data.len());

    if bufs.tx.reset(quote_len).is_err() {
        return;
    }
    bufs.tx
        .payload_mut()
        .copy_from_slice(&bufs.rx.payload()[..quote_len]);

    let hdr = match bufs.tx.push_header(ICMP_HEADER_LEN) {
        Ok(hdr) => hdr,
        Err(_) => return,
    };
    hdr[0] = ICMP_TYPE_UNREACHABLE;
    hdr[1] = code;
    hdr[2..8].fill(0);
    let cksum = internet_checksum(bufs.tx.payload());
    bufs.tx.payload_mut()[2..4].copy_from_slice(&cksum.to_be_bytes());

    debug!("icmp: destination unreachable (code {code}) to {src_ip}");
    let _ = ipv4::send(core, &mut bufs.tx, src_ip, IPPROTO_ICMP);
}
