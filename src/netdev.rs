//! Network device abstraction and stack counters.
//!
//! [`NetDevice`] is the boundary between the protocol stack (which
//! understands protocols) and the driver (which moves whole frames).  The
//! contract is deliberately small: a non-blocking receive and a synchronous
//! transmit.  TAP file descriptors, pcap handles, and test fixtures all fit
//! behind it.

use core::fmt;

use bitflags::bitflags;

use crate::types::NetError;

/// A packet-level network device.
///
/// Both methods take `&mut self`: the stack is single-threaded and owns its
/// device exclusively.
pub trait NetDevice {
    /// Transmit one complete Ethernet frame (already padded to the minimum
    /// frame size).
    fn send(&mut self, frame: &[u8]) -> Result<(), NetError>;

    /// Non-blocking receive.  Writes a frame into the front of `buf` and
    /// returns its length, or `Ok(0)` when nothing is pending.  Must not
    /// write more than `buf.len()` bytes.
    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, NetError>;

    /// Capability flags advertised by the driver.  Defaults to none.
    fn features(&self) -> NetDeviceFeatures {
        NetDeviceFeatures::empty()
    }
}

bitflags! {
    /// Capability flags a device may advertise.
    ///
    /// The stack consults these to skip work the hardware already did.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct NetDeviceFeatures: u32 {
        /// Device computes transmit checksums itself.
        const CHECKSUM_TX = 1 << 0;
        /// Device has verified receive checksums; the stack skips IPv4
        /// header verification.
        const CHECKSUM_RX = 1 << 1;
    }
}

impl Default for NetDeviceFeatures {
    fn default() -> Self {
        Self::empty()
    }
}

/// Stack-level frame counters.
///
/// Counters are monotonically increasing.  `rx_dropped` counts frames that
/// reached the stack but failed validation or had no handler;
/// `tx_dropped` counts egress frames discarded by policy (unresolved
/// next hop with a request already in flight).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NetStats {
    /// Frames handed to the ingress pipeline.
    pub rx_frames: u64,
    /// Ingress frames dropped by validation or demux.
    pub rx_dropped: u64,
    /// Frames handed to the device for transmit.
    pub tx_frames: u64,
    /// Egress frames dropped by ARP de-duplication.
    pub tx_dropped: u64,
    /// Device transmit failures.
    pub tx_errors: u64,
}

impl NetStats {
    /// A zeroed counter block.
    pub const fn new() -> Self {
        Self {
            rx_frames: 0,
            rx_dropped: 0,
            tx_frames: 0,
            tx_dropped: 0,
            tx_errors: 0,
        }
    }
}

impl fmt::Display for NetStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rx: {} frames/{} dropped, tx: {} frames/{} dropped/{} errors",
            self.rx_frames, self.rx_dropped, self.tx_frames, self.tx_dropped, self.tx_errors
        )
    }
}
