//! Inbound packet dispatch: classifies each drained frame by type and
//! receive pipe, drives the one-shot binding handshake, and folds the
//! decoded values into the channel-output array. No chip I/O happens
//! here; the worker applies the returned address adoption itself.
use crate::protocol::hopping::ChannelSequencer;
use crate::protocol::sync::SyncTiming;
use crate::protocol::traits::{BindRecord, BindStore, LinkConfig};
use crate::protocol::upload::UploadShared;
use crate::protocol::wire::{AuxField, BindFrame, ControlFrame, RxPacket};

/// Output slots exposed to the channel consumer.
pub const MAX_CHANNELS: usize = 16;

/// Midpoint of the 0..31 RSSI scale reported for chips without a real
/// RSSI readout; carrier detect nudges it up or down.
pub const RSSI_MIDSCALE: u16 = 16;
/// RSSI reported when no packets arrive at all.
pub const RSSI_FLOOR: u16 = 0;

/// Control pipe.
pub const PIPE_CONTROL: u8 = 0;
/// Bind pipe.
pub const PIPE_BIND: u8 = 1;

/// Decoded channel outputs with an active-count high-water mark.
#[derive(Debug, Clone, Copy)]
pub struct ChannelValues {
    values: [u16; MAX_CHANNELS],
    count: u8,
}

impl ChannelValues {
    pub const fn new() -> Self {
        Self {
            values: [0; MAX_CHANNELS],
            count: 0,
        }
    }

    /// Write a slot and grow the active count to cover it.
    pub fn write(&mut self, index: usize, value: u16) {
        if index < MAX_CHANNELS {
            self.values[index] = value;
            self.count = self.count.max(index as u8 + 1);
        }
    }

    /// Grow the active count without touching values.
    pub fn mark_active(&mut self, count: u8) {
        self.count = self.count.max(count.min(MAX_CHANNELS as u8));
    }

    /// Restart the session high-water mark (new bind window).
    pub fn reset_count(&mut self) {
        self.count = 0;
    }

    #[inline]
    pub fn get(&self, index: usize) -> u16 {
        if index < MAX_CHANNELS {
            self.values[index]
        } else {
            0
        }
    }

    #[inline]
    pub fn active_count(&self) -> u8 {
        self.count
    }
}

impl Default for ChannelValues {
    fn default() -> Self {
        Self::new()
    }
}

/// Binding relationship: unbound until the first control packet, then
/// locked to that peer until reset.
#[derive(Debug, Clone, Copy, Default)]
pub struct BindingState {
    pub bound: bool,
    /// Millisecond timestamp of the user's bind request, if any.
    pub requested_at_ms: Option<u32>,
}

/// Borrowed collaborators for one dispatch call.
pub struct PacketEnv<'a, C: LinkConfig, B: BindStore> {
    pub config: &'a C,
    pub store: &'a mut B,
    pub sequencer: &'a mut ChannelSequencer,
    pub sync: &'a mut SyncTiming,
    pub upload: &'a UploadShared,
    pub now_us: u32,
    pub now_ms: u32,
}

/// Packet dispatcher state: channel outputs plus the binding machine.
#[derive(Debug, Default)]
pub struct Dispatcher {
    pub channels: ChannelValues,
    pub binding: BindingState,
    /// Packets-per-second last reported by the transmitter.
    pub remote_pps: u8,
}

impl Dispatcher {
    pub const fn new() -> Self {
        Self {
            channels: ChannelValues::new(),
            binding: BindingState {
                bound: false,
                requested_at_ms: None,
            },
            remote_pps: 0,
        }
    }

    /// Classify and apply one drained frame.
    ///
    /// `carrier_close` is sampled lazily, only when an auto-bind packet
    /// passes every other gate. Returns the peer address to program into
    /// the chip when a bind was accepted and persisted.
    pub fn process_packet<C, B>(
        &mut self,
        raw: &[u8],
        pipe: u8,
        env: &mut PacketEnv<'_, C, B>,
        carrier_close: impl FnOnce() -> bool,
    ) -> Option<[u8; 5]>
    where
        C: LinkConfig,
        B: BindStore,
    {
        match RxPacket::parse(raw) {
            Some(RxPacket::Control(frame)) if pipe == PIPE_CONTROL => {
                self.apply_control(&frame, env);
                None
            }
            Some(RxPacket::AutoBind(frame)) if pipe == PIPE_BIND => {
                if !self.autobind_allowed(env, carrier_close) {
                    return None;
                }
                self.bind(&frame, env)
            }
            Some(RxPacket::ManualBind(frame)) if pipe == PIPE_BIND => {
                if self.binding.requested_at_ms.is_none() || self.binding.bound {
                    return None;
                }
                self.bind(&frame, env)
            }
            // Own echoes, wrong-pipe frames and unknown types carry
            // nothing for us.
            _ => None,
        }
    }

    fn apply_control<C, B>(&mut self, frame: &ControlFrame, env: &mut PacketEnv<'_, C, B>)
    where
        C: LinkConfig,
        B: BindStore,
    {
        env.sequencer.set_index(frame.channel);
        env.sync.touch_packet_timer(env.now_us);
        if !self.binding.bound {
            // Locks out cross-peer auto-bind until the next power cycle.
            self.binding.bound = true;
            #[cfg(feature = "defmt")]
            defmt::info!("control traffic acquired: bound");
        }

        let mut sticks = frame.stick_values();
        remap_sticks(&mut sticks, env.config.stick_mode());
        for (i, v) in sticks.iter().enumerate() {
            self.channels.write(i, *v);
        }
        let switches = frame.switch_values();
        self.channels.write(4, switches[0]);
        self.channels.write(5, switches[1]);
        self.channels.mark_active(7);

        match frame.aux {
            AuxField::DfuAck { offset } => {
                // Skipped on contention; the peer re-acks the resend.
                if let Ok(mut upload) = env.upload.try_lock() {
                    upload.ack(offset);
                }
            }
            AuxField::RemotePps(pps) => self.remote_pps = pps,
            AuxField::RemoteBattery(raw) => {
                // 0.04 V units scaled to centivolt-style display units.
                self.channels.write(6, u16::from(raw) * 4);
            }
            AuxField::Countdown { hops, target } => {
                if env.config.factory_test() == 0 && hops != 0 {
                    // One extra hop covers the packet being replied to.
                    env.sequencer.set_countdown(hops + 1, target);
                }
            }
            AuxField::FirmwareInfo | AuxField::Unknown(_) => {}
        }
    }

    fn autobind_allowed<C, B>(
        &self,
        env: &mut PacketEnv<'_, C, B>,
        carrier_close: impl FnOnce() -> bool,
    ) -> bool
    where
        C: LinkConfig,
        B: BindStore,
    {
        if u16::from(env.config.autobind_rssi()) > RSSI_MIDSCALE {
            return false; // disabled via sentinel threshold
        }
        let grace_s = env.config.autobind_grace_s();
        if grace_s == 0 {
            return false; // disabled via zero grace period
        }
        if self.binding.bound {
            return false;
        }
        if env.now_ms < u32::from(grace_s) * 1000 {
            return false; // too soon after power-up
        }
        // Only bind to a transmitter that is physically close.
        carrier_close()
    }

    /// Accepted bind: land on the carried channel index, then adopt and
    /// persist the peer address unless factory testing.
    fn bind<C, B>(&mut self, frame: &BindFrame, env: &mut PacketEnv<'_, C, B>) -> Option<[u8; 5]>
    where
        C: LinkConfig,
        B: BindStore,
    {
        env.sequencer.set_index(frame.channel);
        if env.config.factory_test() != 0 {
            return None;
        }
        let record = BindRecord {
            address: frame.address,
        };
        if env.store.write_block(0, &record.encode()).is_err() {
            // The link still runs bound in RAM; only persistence failed.
            #[cfg(feature = "defmt")]
            defmt::warn!("bind record write failed");
        }
        #[cfg(feature = "defmt")]
        defmt::info!("bound to peer, channel index {}", frame.channel);
        Some(frame.address)
    }
}

/// Fixed stick-mode swaps. Mode 2 is native; 1 and 3 swap throttle and
/// pitch, 3 and 4 swap roll and yaw. Pitch is always reversed to match
/// the downstream convention.
fn remap_sticks(sticks: &mut [u16; 4], mode: u8) {
    match mode {
        1 => sticks.swap(1, 2),
        3 => {
            sticks.swap(1, 2);
            sticks.swap(0, 3);
        }
        4 => sticks.swap(0, 3),
        _ => {}
    }
    sticks[1] = 3000 - sticks[1];
}

/// Load the persisted bind record, honoring the magic check.
pub fn load_bind_record<B: BindStore>(store: &mut B) -> Option<BindRecord> {
    let mut raw = [0u8; crate::protocol::traits::bind_store::BIND_RECORD_LEN];
    store.read_block(0, &mut raw).ok()?;
    BindRecord::decode(&raw)
}
