//! Monotonic clock abstraction for the worker's housekeeping decisions.
//! Interrupt timestamps are captured by the integrator and handed in
//! directly; this trait only serves code running on the worker task.

/// Local monotonic time source.
pub trait LinkClock {
    /// Microseconds since boot, wrapping.
    fn now_us(&self) -> u32;
    /// Milliseconds since boot, wrapping.
    fn now_ms(&self) -> u32;
}
