//! Coalesced event delivery from interrupt context to the worker task.
use core::sync::atomic::{AtomicU32, Ordering};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

/// Hop/housekeeping timer tick fired.
pub const EVT_TIMEOUT: u32 = 1 << 0;
/// Radio chip raised its interrupt line.
pub const EVT_IRQ: u32 = 1 << 1;
/// The user asked for a manual bind window.
pub const EVT_BIND: u32 = 1 << 2;

/// Pending-event bitmask with a wakeup signal.
///
/// `raise` is interrupt-safe and never blocks; repeated raises of the
/// same event before the worker runs coalesce into one bit. The worker
/// drains the whole mask at once, so a burst of interrupts costs one
/// wakeup.
pub struct EventFlags {
    bits: AtomicU32,
    signal: Signal<CriticalSectionRawMutex, ()>,
}

impl EventFlags {
    pub const fn new() -> Self {
        Self {
            bits: AtomicU32::new(0),
            signal: Signal::new(),
        }
    }

    /// Mark events pending and wake the worker. Interrupt-safe.
    pub fn raise(&self, mask: u32) {
        self.bits.fetch_or(mask, Ordering::Release);
        self.signal.signal(());
    }

    /// Atomically drain the pending mask without waiting.
    pub fn take(&self) -> u32 {
        self.bits.swap(0, Ordering::Acquire)
    }

    /// Wait until at least one event is pending and drain the mask.
    pub async fn wait(&self) -> u32 {
        loop {
            let bits = self.take();
            if bits != 0 {
                return bits;
            }
            self.signal.wait().await;
        }
    }
}

impl Default for EventFlags {
    fn default() -> Self {
        Self::new()
    }
}
