//! Link protocol implementation: packet classification and binding,
//! hop-table sequencing, reception-timing sync, the firmware-upload
//! reliability layer and the interrupt-to-worker bridge.
pub mod dispatch;
pub mod hopping;
pub mod runner;
pub mod sync;
pub mod traits;
pub mod upload;
pub mod wire;
