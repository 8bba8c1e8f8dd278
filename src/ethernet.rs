//! Ethernet framing: ingress parse and demux, egress emit, device poll.
//!
//! Frame layout on the wire: `dst[6] | src[6] | ethertype[2] | payload`.
//! Egress pads the payload to the 46-byte minimum before framing; the
//! device never sees an undersized frame.

use log::{debug, warn};

use crate::dispatch::{self, SourceAddr};
use crate::packetbuf::PacketBuf;
use crate::stack::{Buffers, StackCore};
use crate::types::{MacAddr, NetError, NetProtocol};
use crate::{ETH_FRAME_MAX, ETH_HEADER_LEN, ETH_MIN_PAYLOAD};

/// One receive iteration: pull at most one frame from the device and run it
/// through the ingress pipeline.  Returns `true` if a frame was processed.
pub(crate) fn poll(core: &mut StackCore, bufs: &mut Buffers) -> bool {
    if bufs.rx.reset(ETH_FRAME_MAX).is_err() {
        return false;
    }
    let n = match core.dev.recv(bufs.rx.payload_mut()) {
        Ok(n) => n,
        Err(err) => {
            debug!("ethernet: receive failed: {err}");
            return false;
        }
    };
    if n == 0 {
        return false;
    }
    if n > ETH_FRAME_MAX {
        debug!("ethernet: device returned oversized frame ({n} bytes), dropping");
        return false;
    }
    // Shrink the window to the bytes actually received.
    if bufs.rx.trim(ETH_FRAME_MAX - n).is_err() {
        return false;
    }
    core.stats.rx_frames += 1;
    handle_rx(core, bufs);
    true
}

/// Parse one received frame and hand the payload to the demultiplexer.
pub(crate) fn handle_rx(core: &mut StackCore, bufs: &mut Buffers) {
    let frame = bufs.rx.payload();
    if frame.len() < ETH_HEADER_LEN {
        debug!(
            "ethernet: frame too short ({} < {})",
            frame.len(),
            ETH_HEADER_LEN
        );
        core.stats.rx_dropped += 1;
        return;
    }

    let dst = MacAddr([frame[0], frame[1], frame[2], frame[3], frame[4], frame[5]]);
    let src = MacAddr([frame[6], frame[7], frame[8], frame[9], frame[10], frame[11]]);
    let ethertype = u16::from_be_bytes([frame[12], frame[13]]);

    // Not addressed to us and not broadcast/multicast: the device filter
    // let it through, we do not.
    if dst != core.iface.mac && !dst.is_broadcast() && !dst.is_multicast() {
        return;
    }

    if bufs.rx.pull_header(ETH_HEADER_LEN).is_err() {
        return;
    }
    dispatch::net_in(core, bufs, ethertype, SourceAddr::Link(src));
}

/// Frame `buf` and hand it to the device.
///
/// Pads to the minimum payload, prepends the header with our MAC as source,
/// and transmits.  A device failure is logged and counted, never retried.
pub(crate) fn send(
    core: &mut StackCore,
    buf: &mut PacketBuf,
    dst: MacAddr,
    proto: NetProtocol,
) -> Result<(), NetError> {
    if buf.len() < ETH_MIN_PAYLOAD {
        buf.pad(ETH_MIN_PAYLOAD - buf.len())?;
    }

    let hdr = buf.push_header(ETH_HEADER_LEN)?;
    hdr[0..6].copy_from_slice(dst.as_bytes());
    hdr[6..12].copy_from_slice(core.iface.mac.as_bytes());
    hdr[12..14].copy_from_slice(&proto.code().to_be_bytes());

    match core.dev.send(buf.payload()) {
        Ok(()) => {
            core.stats.tx_frames += 1;
            Ok(())
        }
        Err(err) => {
            warn!("ethernet: transmit of {} bytes failed: {err}", buf.len());
            core.stats.tx_errors += 1;
            Err(NetError::LinkTxFail)
        }
    }
}
