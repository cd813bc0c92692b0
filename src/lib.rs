//! `hoplink` library: link-layer and application-layer engine for a
//! frequency-hopping RC transceiver in a `no_std` environment. The crate
//! turns raw packets from a half-duplex radio chip into decoded channel
//! values, a binding handshake, a reliable firmware-upload stream and
//! outbound telemetry, while keeping all chip access serialized on a
//! single worker task.
#![no_std]
//==================================================================================
/// Domain errors (worker initialisation, chip bus propagation).
pub mod error;
/// Generic infrastructure: the circular upload byte buffer.
pub mod infra;
/// Link protocol implementation: hop sequencing, timing sync, packet
/// dispatch, firmware upload and the interrupt-to-worker bridge.
pub mod protocol;
//==================================================================================
