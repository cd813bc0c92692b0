//! Upstream reliable-datagram transport feeding firmware chunks in.
//! Inbound delivery happens through
//! [`LinkShared::try_deliver_chunk`](crate::protocol::runner::LinkShared::try_deliver_chunk);
//! this trait carries the two small outbound notifications.

/// Outbound signalling towards the firmware-upload sender.
pub trait UploadTransport {
    /// Ask the sender for the chunk starting at `current_offset`.
    fn request_more(&mut self, current_offset: u32);
    /// Tell the sender the whole transfer of `total_length` bytes has
    /// been delivered and acknowledged.
    fn notify_complete(&mut self, total_length: u32);
}
