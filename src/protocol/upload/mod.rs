//! Firmware-upload reliability layer: stages inbound chunks from the
//! upstream transport in a circular buffer, hands out 16-byte fragments
//! to the radio send path, and enforces strictly sequential exact-match
//! acknowledgement. Ack semantics are deliberately minimal (no partial
//! or cumulative acks); peer compatibility depends on keeping them.
use crate::infra::ring::ByteRing;
use crate::protocol::wire::DFU_FRAGMENT_LEN;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;

/// Staging capacity; must hold one inbound chunk plus one fragment.
pub const RING_CAPACITY: usize = 128;
/// Largest inbound chunk from the upstream transport.
pub const MAX_CHUNK_LEN: usize = 92;
/// Bytes of header accounted on top of the length declared in the
/// first chunk.
pub const HEADER_OVERHEAD: u32 = 6;
/// Free-space threshold above which the next chunk is requested.
pub const REFILL_THRESHOLD: usize = 96;
/// One outbound opportunity in eight is reserved for telemetry.
const TELEMETRY_SLOT_MASK: u8 = 0x07;

/// Shared handle: enqueue (transport task) and dequeue (worker task)
/// both go through a non-blocking `try_lock`; a contended cycle is
/// simply skipped and retried at the next opportunity.
pub type UploadShared = Mutex<CriticalSectionRawMutex, UploadQueue>;

/// What an inbound chunk carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// Over-the-air firmware image.
    Firmware,
    /// A tune to play; development/testing payload sharing the pipe.
    Tune,
}

/// Outbound action owed to the upstream transport after housekeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefillAction {
    /// Ask for the chunk starting at this offset.
    Request(u32),
    /// The transfer of this many bytes is fully delivered and acked.
    Complete(u32),
}

/// Upload state: the staging ring plus four monotonic byte counters.
///
/// Invariant once the total is known: `acked <= sent <= enqueued`, all
/// multiples of the fragment size except `enqueued` before padding.
#[derive(Debug)]
pub struct UploadQueue {
    ring: ByteRing<RING_CAPACITY>,
    enqueued: u32,
    sent: u32,
    acked: u32,
    total_length: u32,
    need_ack: bool,
    kind: PayloadKind,
    slot_counter: u8,
    last_fragment: [u8; DFU_FRAGMENT_LEN],
}

impl UploadQueue {
    pub const fn new() -> Self {
        Self {
            ring: ByteRing::new(),
            enqueued: 0,
            sent: 0,
            acked: 0,
            total_length: 0,
            need_ack: false,
            kind: PayloadKind::Firmware,
            slot_counter: 0,
            last_fragment: [0; DFU_FRAGMENT_LEN],
        }
    }

    /// Accept a chunk from the upstream transport.
    ///
    /// Offset 0 restarts the transfer and reads the declared total from
    /// the first two payload bytes (big-endian) plus [`HEADER_OVERHEAD`].
    /// A chunk whose offset does not match `enqueued` is dropped and the
    /// refill request re-raised so the sender rewinds; a chunk that does
    /// not fit is dropped the same way and fetched again later.
    pub fn deliver_chunk(&mut self, offset: u32, payload: &[u8], kind: PayloadKind) {
        if payload.is_empty() || payload.len() > MAX_CHUNK_LEN {
            return;
        }
        self.need_ack = false;
        if offset == 0 {
            if payload.len() < 2 {
                return;
            }
            self.restart();
            self.total_length =
                (u32::from(payload[0]) << 8 | u32::from(payload[1])) + HEADER_OVERHEAD;
        }
        if offset != self.enqueued {
            // Out of sequence: ask the sender to resume from `enqueued`.
            self.need_ack = true;
            return;
        }
        self.kind = kind;
        self.push(payload);
    }

    /// Pick the outbound payload type for this opportunity.
    ///
    /// A fragment goes out only when unacknowledged backlog exists and
    /// the round-robin counter is not on the reserved telemetry slot, so
    /// telemetry is never starved.
    pub fn fragment_due(&mut self) -> bool {
        if self.enqueued < self.acked + DFU_FRAGMENT_LEN as u32 {
            return false;
        }
        let slot = self.slot_counter;
        self.slot_counter = self.slot_counter.wrapping_add(1);
        slot & TELEMETRY_SLOT_MASK != 0
    }

    /// Take the fragment to transmit: the previous one again while it
    /// remains unacknowledged, otherwise the next 16 bytes.
    pub fn next_fragment(&mut self) -> Option<(u16, [u8; DFU_FRAGMENT_LEN])> {
        if self.sent > self.acked {
            // Retried at the natural send cadence until acked.
            return Some(((self.sent - DFU_FRAGMENT_LEN as u32) as u16, self.last_fragment));
        }
        let mut data = [0u8; DFU_FRAGMENT_LEN];
        if !self.ring.dequeue(&mut data) {
            return None;
        }
        let offset = self.sent as u16;
        self.last_fragment = data;
        self.sent += DFU_FRAGMENT_LEN as u32;
        if self.ring.free() >= REFILL_THRESHOLD {
            // Room for another chunk: flow-control the sender forward.
            self.need_ack = true;
        }
        Some((offset, data))
    }

    /// Apply a peer acknowledgement. Only the exact next boundary is
    /// accepted; duplicates and out-of-order acks are dropped.
    pub fn ack(&mut self, offset: u16) {
        if u32::from(offset) == self.acked + DFU_FRAGMENT_LEN as u32 {
            self.acked = u32::from(offset);
        }
    }

    /// Housekeeping pass: request the next chunk, pad the tail to a
    /// whole fragment, or report completion once everything is acked.
    pub fn poll_refill(&mut self) -> Option<RefillAction> {
        if !self.need_ack {
            return None;
        }
        if self.enqueued < self.total_length {
            self.need_ack = false;
            return Some(RefillAction::Request(self.enqueued));
        }
        if self.enqueued % DFU_FRAGMENT_LEN as u32 != 0 {
            let pad = DFU_FRAGMENT_LEN - (self.enqueued as usize % DFU_FRAGMENT_LEN);
            if self.ring.free() > DFU_FRAGMENT_LEN {
                self.push(&[0u8; DFU_FRAGMENT_LEN][..pad]);
            }
            return None;
        }
        if self.acked < self.enqueued {
            // Gap remains: the send path keeps resending.
            return None;
        }
        self.need_ack = false;
        Some(RefillAction::Complete(self.total_length))
    }

    #[inline]
    pub fn enqueued(&self) -> u32 {
        self.enqueued
    }

    #[inline]
    pub fn sent(&self) -> u32 {
        self.sent
    }

    #[inline]
    pub fn acked(&self) -> u32 {
        self.acked
    }

    #[inline]
    pub fn total_length(&self) -> u32 {
        self.total_length
    }

    #[inline]
    pub fn kind(&self) -> PayloadKind {
        self.kind
    }

    fn push(&mut self, bytes: &[u8]) {
        if self.ring.queue(bytes) {
            self.enqueued += bytes.len() as u32;
        }
    }

    fn restart(&mut self) {
        self.ring.clear();
        self.enqueued = 0;
        self.sent = 0;
        self.acked = 0;
        self.total_length = 0;
    }
}

impl Default for UploadQueue {
    fn default() -> Self {
        Self::new()
    }
}
