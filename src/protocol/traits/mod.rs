//! Contracts for the external collaborators of the link engine: the
//! radio chip driver, persistent bind storage, the upstream upload
//! transport, configuration/status providers and the local clock.
pub mod bind_store;
pub mod link_clock;
pub mod link_config;
pub mod radio_chip;
pub mod upload_transport;

pub use bind_store::{BindRecord, BindStore};
pub use link_clock::LinkClock;
pub use link_config::{LinkConfig, StatusSource};
pub use radio_chip::{regs, RadioChip};
pub use upload_transport::UploadTransport;
