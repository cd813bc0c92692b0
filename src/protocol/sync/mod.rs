//! Reception-timing synchronization: keeps an estimate of the peer's
//! inter-packet period (according to our clock) so channel hops stay
//! aligned with the transmitter despite clock drift, and decides how to
//! slow down after prolonged sync loss.

/// Nominal microseconds between two control packets from the peer.
pub const NOMINAL_PACKET_INTERVAL_US: u32 = 5000;
/// Accepted deviation of a delta from the nominal period.
pub const INTERVAL_SLOP_US: u32 = 500;
/// Accepted deviation of a delta from the previous delta.
pub const DELTA_MATCH_US: u32 = 500;
/// Margin added after a reception before the next forced hop.
pub const POST_RX_HOP_MARGIN_US: u32 = 3000;
/// Missed intervals before the link is considered lost.
pub const SYNC_LOST_INTERVALS: u32 = 50;
/// Hop-cadence multiplier applied while the link is lost.
pub const RECOVERY_SLOWDOWN: u32 = 4;

/// Timing state for one peer relationship.
///
/// All timestamps are wrapping microsecond counts from [`LinkClock`]
/// or the interrupt capture; arithmetic uses wrapping subtraction so the
/// 71-minute rollover is harmless.
///
/// [`LinkClock`]: crate::protocol::traits::LinkClock
#[derive(Debug)]
pub struct SyncTiming {
    rx_time_us: u32,
    delta_rx_time_us: u32,
    last_delta_rx_time_us: u32,
    sync_time_us: u32,
    tx_time_us: u32,
    packet_timer_us: u32,
}

impl SyncTiming {
    pub const fn new() -> Self {
        Self {
            rx_time_us: 0,
            delta_rx_time_us: 0,
            last_delta_rx_time_us: 0,
            sync_time_us: NOMINAL_PACKET_INTERVAL_US,
            tx_time_us: 0,
            packet_timer_us: 0,
        }
    }

    /// Record a successful reception at local time `now`.
    ///
    /// The smoothed estimate only absorbs the new delta when it is both
    /// consistent with the previous delta and close to the nominal
    /// period; a single jitter spike or a missed-packet gap therefore
    /// cannot drag the estimate. The raw delta history always advances so
    /// the next sample is judged against what was actually observed.
    pub fn observe(&mut self, now: u32) {
        let ld = self.delta_rx_time_us;
        let d = now.wrapping_sub(self.rx_time_us);
        if (d.wrapping_sub(ld) as i32).unsigned_abs() < DELTA_MATCH_US
            && d > NOMINAL_PACKET_INTERVAL_US - INTERVAL_SLOP_US
            && d < NOMINAL_PACKET_INTERVAL_US + INTERVAL_SLOP_US
        {
            // Move 16/256 of the way toward the new sample.
            self.sync_time_us =
                ((self.sync_time_us as u64 * (256 - 16) + d as u64 * 16) / 256) as u32;
        }
        self.rx_time_us = now;
        self.last_delta_rx_time_us = ld;
        self.delta_rx_time_us = d;
    }

    /// Smoothed inter-packet period in microseconds.
    #[inline]
    pub fn smoothed_interval(&self) -> u32 {
        self.sync_time_us
    }

    /// Local time of the last observed reception.
    #[inline]
    pub fn last_rx_us(&self) -> u32 {
        self.rx_time_us
    }

    /// Deadline after which the channel must be hopped if the packet
    /// expected around `rx_now` never showed up.
    #[inline]
    pub fn next_hop_deadline_hint(&self, rx_now: u32) -> u32 {
        rx_now
            .wrapping_add(self.sync_time_us)
            .wrapping_add(POST_RX_HOP_MARGIN_US)
    }

    /// Hop interval to use at time `now`, with the sync-lost flag.
    ///
    /// Once nothing has been heard for [`SYNC_LOST_INTERVALS`] smoothed
    /// periods the cadence is multiplied by [`RECOVERY_SLOWDOWN`] so a
    /// recovering peer walking its own table gets a chance to land on us.
    pub fn recovery_interval(&self, now: u32) -> (u32, bool) {
        let d = self.sync_time_us;
        let silent_for = now.wrapping_sub(self.rx_time_us);
        if silent_for > SYNC_LOST_INTERVALS * d {
            (d * RECOVERY_SLOWDOWN, true)
        } else {
            (d, false)
        }
    }

    /// Record the completion time of our own transmission.
    #[inline]
    pub fn mark_tx(&mut self, now: u32) {
        self.tx_time_us = now;
    }

    /// Refresh the control-packet liveness timer.
    #[inline]
    pub fn touch_packet_timer(&mut self, now: u32) {
        self.packet_timer_us = now;
    }

    /// Local time of the last valid control packet.
    #[inline]
    pub fn last_packet_us(&self) -> u32 {
        self.packet_timer_us
    }
}

impl Default for SyncTiming {
    fn default() -> Self {
        Self::new()
    }
}
