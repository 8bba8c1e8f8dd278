//! tapnet — a user-space network stack for a single packet-level interface.
//!
//! The stack terminates Ethernet, ARP, IPv4, ICMP (echo / destination
//! unreachable) and UDP for one configured interface (one MAC, one IPv4
//! address) on top of a TAP/pcap-style device that only knows how to move
//! whole frames.  UDP payloads are delivered to in-process handlers
//! registered by destination port.
//!
//! # Architecture
//!
//! ```text
//! device → ethernet → net demux → { arp, ipv4 } → { icmp, udp } → handler
//! handler-side:  udp_send → udp → ipv4 (fragmenting) → arp → ethernet → device
//! ```
//!
//! Two packet buffers live for the whole stack lifetime: a receive buffer
//! owned by the Ethernet layer and a transmit buffer shared by every egress
//! path.  The transmit buffer is scratch space — its contents are valid only
//! until the next egress call.  When ARP has no MAC for a next hop, the
//! outgoing frame is deep-copied into a pending table and released when the
//! matching ARP reply (or request) reveals the address.
//!
//! The stack is single-threaded and cooperative: the embedding application
//! pumps [`stack::NetStack::poll`], which performs at most one non-blocking
//! device receive and runs the frame to completion.
//!
//! # Limitations
//!
//! - One interface, same-link destinations only (no routing, no forwarding).
//! - IPv4 ingress does **not** reassemble fragments.  Fragmented datagrams
//!   fail the transport checksum or deliver truncated payloads and are
//!   dropped; this matches the scope of the stack and is intentional.
//! - No IP options: datagrams with IHL ≠ 5 are dropped at ingress.
//! - ICMP handles echo request and emits destination unreachable; nothing
//!   else.

pub mod cache;
pub mod netdev;
pub mod packetbuf;
pub mod stack;
pub mod types;

mod arp;
mod dispatch;
mod ethernet;
mod icmp;
mod ipv4;
mod udp;


pub use netdev::{NetDevice, NetDeviceFeatures, NetStats};
pub use stack::{Clock, IfaceConfig, NetStack, SystemClock};
pub use types::{Ipv4Addr, MacAddr, NetError, NetProtocol};
pub use udp::UdpHandler;

// =============================================================================
// Ethernet
// =============================================================================

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_ARP: u16 = 0x0806;
pub const ETH_HEADER_LEN: usize = 14;
pub const ETH_ADDR_LEN: usize = 6;
/// Minimum Ethernet payload; shorter payloads are zero-padded at the tail.
pub const ETH_MIN_PAYLOAD: usize = 46;
/// Link MTU — the largest payload one frame carries.
pub const ETHERNET_MTU: usize = 1500;
/// Largest frame the device may hand us (header plus MTU).
pub const ETH_FRAME_MAX: usize = ETH_HEADER_LEN + ETHERNET_MTU;

// =============================================================================
// ARP (Ethernet + IPv4 only)
// =============================================================================

pub const ARP_HTYPE_ETHERNET: u16 = 1;
pub const ARP_PTYPE_IPV4: u16 = ETHERTYPE_IPV4;
pub const ARP_HLEN_ETHERNET: u8 = 6;
pub const ARP_PLEN_IPV4: u8 = 4;
pub const ARP_OPER_REQUEST: u16 = 1;
pub const ARP_OPER_REPLY: u16 = 2;
pub const ARP_PACKET_LEN: usize = 28;
/// Resolution entries older than this are re-resolved on next use (seconds).
pub const ARP_TIMEOUT_SECS: u64 = 60;
/// Minimum gap between ARP requests for the same destination (seconds).
/// Doubles as the lifetime of a frame parked behind resolution.
pub const ARP_MIN_INTERVAL_SECS: u64 = 1;

// =============================================================================
// IPv4
// =============================================================================

pub const IPV4_HEADER_LEN: usize = 20;
pub const IPV4_VERSION: u8 = 4;
pub const IP_DEFAULT_TTL: u8 = 64;
/// "More fragments" bit in the flags/fragment-offset word.
pub const IP_FLAG_MF: u16 = 0x2000;
/// Fragment offsets are expressed in units of eight bytes.
pub const IP_FRAGMENT_UNIT: usize = 8;
/// Largest IPv4 payload per fragment on this link (MTU minus header).
pub const IP_MAX_FRAGMENT: usize = ETHERNET_MTU - IPV4_HEADER_LEN;

pub const IPPROTO_ICMP: u8 = 1;
pub const IPPROTO_UDP: u8 = 17;

// =============================================================================
// ICMP
// =============================================================================

pub const ICMP_HEADER_LEN: usize = 8;
pub const ICMP_TYPE_ECHO_REPLY: u8 = 0;
pub const ICMP_TYPE_UNREACHABLE: u8 = 3;
pub const ICMP_TYPE_ECHO_REQUEST: u8 = 8;
pub const ICMP_CODE_PROTOCOL_UNREACHABLE: u8 = 2;
pub const ICMP_CODE_PORT_UNREACHABLE: u8 = 3;

// =============================================================================
// UDP
// =============================================================================

pub const UDP_HEADER_LEN: usize = 8;
pub const UDP_PSEUDO_HEADER_LEN: usize = 12;
/// Largest payload `udp_send` accepts: the UDP length field covers header
/// plus payload in 16 bits.
pub const UDP_MAX_PAYLOAD: usize = u16::MAX as usize - UDP_HEADER_LEN;
