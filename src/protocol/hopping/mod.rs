//! Channel-hop sequencing: the fixed hop table shared with the peer, the
//! logical index walk, the countdown override used to land on an agreed
//! channel after binding, and the safe-table fallback for re-acquisition.

/// Logical channels per hop table.
pub const CHANNELS_PER_TABLE: u8 = 16;
/// Number of regular hop tables.
pub const NUM_TABLES: u8 = 6;
/// Factory/FCC test channels appended after the regular tables.
pub const TEST_CHANNEL_COUNT: u8 = 16;
/// First index of the factory-test range.
pub const TEST_BASE_INDEX: u8 = CHANNELS_PER_TABLE * NUM_TABLES;

/// Default table walked before any WiFi-avoidance choice.
pub const BASE_TABLE: u8 = 0;
/// Fallback table covering both band edges, used after sync loss.
pub const SAFE_TABLE: u8 = 3;

/// FCC test channels (2.4 GHz channel numbers).
pub const FCC_CHANNEL_LOW: u8 = 10;
pub const FCC_CHANNEL_MID: u8 = 41;
pub const FCC_CHANNEL_HIGH: u8 = 72;

/// Radio channel codes walked by the sequencer. Negotiated with the peer
/// transmitter firmware: must stay byte-identical across implementations.
pub static HOP_TABLE: [u8; (TEST_BASE_INDEX + TEST_CHANNEL_COUNT) as usize] = [
    46, 41, 31, 52, 36, 13, 72, 69, 21, 56, 16, 26, 61, 66, 10, 45, // Normal
    57, 62, 67, 72, 58, 63, 68, 59, 64, 69, 60, 65, 70, 61, 66, 71, // Wifi channel 1,2,3,4,5
    62, 10, 67, 72, 63, 68, 11, 64, 69, 60, 65, 70, 12, 61, 66, 71, // Wifi channel 6
    10, 67, 11, 72, 12, 68, 13, 69, 14, 65, 15, 70, 16, 66, 17, 71, // Wifi channel 7
    10, 70, 15, 20, 11, 71, 16, 21, 12, 17, 22, 72, 13, 18, 14, 19, // Wifi channel 8
    10, 15, 20, 25, 11, 16, 21, 12, 17, 22, 13, 18, 23, 14, 19, 24, // Wifi channel 9,10,11
    46, 41, 31, 52, 36, 13, 72, 69, 21, 56, 16, 26, 61, 66, 10, 43, // Test mode channels
];

/// Pending jump to a specific index after a known number of hops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    pub remaining: u8,
    pub target: u8,
}

/// Owns the current hop-table position.
///
/// Indices below [`TEST_BASE_INDEX`] encode `(table, slot)` as
/// `table * 16 + slot`; indices at or above it are factory-test channels
/// that [`advance`](Self::advance) never moves.
#[derive(Debug, Default)]
pub struct ChannelSequencer {
    index: u8,
    countdown: Option<Countdown>,
}

impl ChannelSequencer {
    pub const fn new() -> Self {
        Self {
            index: 0,
            countdown: None,
        }
    }

    /// Current logical index (what goes into outbound `channel` bytes).
    #[inline]
    pub fn index(&self) -> u8 {
        self.index
    }

    /// Radio channel code for the current index.
    #[inline]
    pub fn rf_channel(&self) -> u8 {
        HOP_TABLE[self.index as usize % HOP_TABLE.len()]
    }

    /// Adopt the index carried by a peer packet.
    pub fn set_index(&mut self, index: u8) {
        self.index = index;
    }

    /// Schedule a jump to `target` after `hops` calls to `advance`.
    /// Zero hops clears any pending countdown.
    pub fn set_countdown(&mut self, hops: u8, target: u8) {
        self.countdown = if hops == 0 {
            None
        } else {
            Some(Countdown {
                remaining: hops,
                target,
            })
        };
    }

    #[inline]
    pub fn countdown(&self) -> Option<Countdown> {
        self.countdown
    }

    /// Step to the next logical channel.
    ///
    /// A pending countdown is decremented first and, on reaching zero,
    /// jumps straight to its target instead of the cyclic step. Factory
    /// test indices are left untouched.
    pub fn advance(&mut self) {
        if self.index >= TEST_BASE_INDEX {
            return;
        }
        if let Some(cd) = &mut self.countdown {
            cd.remaining -= 1;
            if cd.remaining == 0 {
                self.index = cd.target;
                self.countdown = None;
                return;
            }
        }
        let table = self.index / CHANNELS_PER_TABLE;
        self.index = (self.index + 1) % CHANNELS_PER_TABLE + table * CHANNELS_PER_TABLE;
    }

    /// Remap into the safe table, preserving the within-table slot.
    ///
    /// Tables other than [`BASE_TABLE`] and [`SAFE_TABLE`] only cover one
    /// end of the band; after prolonged sync loss the safe table maximises
    /// the chance of crossing the peer's frequency again.
    pub fn force_safe_table(&mut self) {
        if self.index >= TEST_BASE_INDEX {
            return;
        }
        let table = self.index / CHANNELS_PER_TABLE;
        if table != BASE_TABLE && table != SAFE_TABLE {
            self.index = self.index % CHANNELS_PER_TABLE + SAFE_TABLE * CHANNELS_PER_TABLE;
        }
    }

    /// Index used while factory-test mode `mode` (1-based) is selected.
    /// Mode 0 saturates to the first test channel.
    pub fn factory_index(mode: u8) -> u8 {
        TEST_BASE_INDEX + mode.saturating_sub(1) % TEST_CHANNEL_COUNT
    }
}
