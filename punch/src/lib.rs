//! Hole-punch coordinator: UDP simultaneous-open as the primary path,
//! TCP simultaneous-open as a fallback for UDP-blocked networks.

pub mod tcp;
pub mod udp;

pub use tcp::punch_tcp;
pub use udp::{is_punch_datagram, spawn_punch, PUNCH_PAYLOAD};
