//! The link worker: a single task owning the radio chip outright.
//!
//! Interrupt handlers and other tasks never touch the chip; they raise
//! coalesced events (or stage upload data) through [`LinkShared`] and
//! the worker services everything in order. Reception interrupts are
//! handled before timer ticks so a packet that arrived just ahead of a
//! hop deadline is not thrown away by hopping first.
use core::cell::RefCell;
use core::convert::Infallible;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_time::Timer;

use crate::error::{InitError, LinkError};
use crate::protocol::dispatch::{
    load_bind_record, ChannelValues, Dispatcher, PacketEnv, PIPE_BIND, RSSI_FLOOR,
    RSSI_MIDSCALE,
};
use crate::protocol::hopping::{ChannelSequencer, FCC_CHANNEL_HIGH, FCC_CHANNEL_LOW, FCC_CHANNEL_MID};
use crate::protocol::sync::{NOMINAL_PACKET_INTERVAL_US, POST_RX_HOP_MARGIN_US, SyncTiming};
use crate::protocol::traits::{
    regs, BindStore, LinkClock, LinkConfig, RadioChip, StatusSource, UploadTransport,
};
use crate::protocol::upload::{PayloadKind, RefillAction, UploadQueue, UploadShared};
use crate::protocol::wire::{
    DfuFrame, TelemetryFrame, DFU_FRAME_LEN, RX_FRAME_LEN, TELEMETRY_FRAME_LEN,
};

mod events;
pub use events::{EventFlags, EVT_BIND, EVT_IRQ, EVT_TIMEOUT};

/// Nominal period of the housekeeping/hop timer.
pub const TIMER_STEP_US: u32 = 1000;
/// Never rearm the timer closer than this to "now".
pub const TIMER_MIN_LEAD_US: u32 = 500;
/// Configuration is re-polled every this many timer ticks.
const PARAM_POLL_TICKS: u32 = 10;
/// Regulatory-test packets go out every this many timer ticks.
const FCC_SEND_TICKS: u32 = 5;
/// Settling time between entering transmit mode and loading the payload.
const TX_TURNAROUND_US: u64 = 100;

/// Link quality counters, published once per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Packets received in the last full second.
    pub pps: u8,
    pub recv_packets: u32,
    /// Garbled payloads and frames on unmatched pipes.
    pub recv_errors: u32,
    /// Hops forced by the timer rather than a reception.
    pub timeouts: u32,
    /// Transitions into the slow recovery cadence.
    pub sync_losses: u32,
}

#[derive(Debug, Clone, Copy, Default)]
struct Outputs {
    channels: ChannelValues,
    stats: LinkStats,
}

/// The always-available half of the link: lives in a `static` so
/// interrupt handlers and other tasks can reach it without locks on the
/// hot path.
///
/// Everything here is either atomic, a signal, or a try-lock mutex; no
/// method blocks, so every one of them is safe to call from interrupt
/// context except [`try_deliver_chunk`](Self::try_deliver_chunk) (task
/// context only, it takes the upload mutex).
pub struct LinkShared {
    events: EventFlags,
    irq_time_us: AtomicU32,
    next_tick_us: AtomicU32,
    upload: UploadShared,
    outputs: BlockingMutex<CriticalSectionRawMutex, RefCell<Outputs>>,
}

impl LinkShared {
    pub const fn new() -> Self {
        Self {
            events: EventFlags::new(),
            irq_time_us: AtomicU32::new(0),
            next_tick_us: AtomicU32::new(0),
            upload: UploadShared::new(UploadQueue::new()),
            outputs: BlockingMutex::new(RefCell::new(Outputs {
                channels: ChannelValues::new(),
                stats: LinkStats {
                    pps: 0,
                    recv_packets: 0,
                    recv_errors: 0,
                    timeouts: 0,
                    sync_losses: 0,
                },
            })),
        }
    }

    /// Report the chip interrupt, with the reception timestamp captured
    /// in the handler itself (scheduling latency would corrupt the
    /// timing sync otherwise).
    pub fn on_radio_irq(&self, captured_us: u32) {
        self.irq_time_us.store(captured_us, Ordering::Release);
        self.events.raise(EVT_IRQ);
    }

    /// Report a timer tick and return the delay in microseconds until
    /// the next one.
    ///
    /// The cadence is rebased on `now_us` whenever the nominal schedule
    /// has drifted out from under us (late handler, debugger stop), and
    /// the returned delay never goes below [`TIMER_MIN_LEAD_US`].
    pub fn on_timer(&self, now_us: u32) -> u32 {
        self.events.raise(EVT_TIMEOUT);
        let next = self
            .next_tick_us
            .load(Ordering::Acquire)
            .wrapping_add(TIMER_STEP_US);
        let mut delay = next.wrapping_sub(now_us);
        if delay < TIMER_MIN_LEAD_US || delay > TIMER_STEP_US {
            delay = TIMER_STEP_US;
        }
        self.next_tick_us
            .store(now_us.wrapping_add(delay), Ordering::Release);
        delay
    }

    /// Open a manual bind window (user pressed the bind button).
    pub fn request_bind(&self) {
        self.events.raise(EVT_BIND);
    }

    /// Stage an inbound upload chunk. Returns `false` when the worker
    /// holds the queue right now; the caller retries the same chunk.
    pub fn try_deliver_chunk(&self, offset: u32, payload: &[u8], kind: PayloadKind) -> bool {
        match self.upload.try_lock() {
            Ok(mut queue) => {
                queue.deliver_chunk(offset, payload, kind);
                true
            }
            Err(_) => false,
        }
    }

    /// Latest decoded value of output channel `index`.
    pub fn channel(&self, index: usize) -> u16 {
        self.outputs.lock(|o| o.borrow().channels.get(index))
    }

    /// High-water count of channels carrying live data.
    pub fn channel_count(&self) -> u8 {
        self.outputs.lock(|o| o.borrow().channels.active_count())
    }

    /// Snapshot of the link quality counters.
    pub fn stats(&self) -> LinkStats {
        self.outputs.lock(|o| o.borrow().stats)
    }

    pub(crate) fn events(&self) -> &EventFlags {
        &self.events
    }

    pub(crate) fn upload(&self) -> &UploadShared {
        &self.upload
    }

    fn take_irq_time(&self) -> u32 {
        self.irq_time_us.load(Ordering::Acquire)
    }

    fn publish(&self, channels: ChannelValues, stats: LinkStats) {
        self.outputs.lock(|o| {
            *o.borrow_mut() = Outputs { channels, stats };
        });
    }
}

impl Default for LinkShared {
    fn default() -> Self {
        Self::new()
    }
}

// Exactly one worker may own a radio chip per firmware image.
static WORKER_CLAIMED: AtomicBool = AtomicBool::new(false);

/// What the worker owes the peer after the receive FIFO is drained.
#[derive(Clone, Copy, PartialEq, Eq)]
enum RxAction {
    None,
    /// A bind frame landed us on a new index: retune, no advance.
    Retune,
    /// A control frame earned a reply (or a plain hop without telemetry).
    Respond,
}

/// The worker task state: the chip, its collaborators and all protocol
/// state machines.
pub struct LinkRunner<C, B, K, F, S, T>
where
    C: RadioChip,
    B: BindStore,
    K: LinkClock,
    F: LinkConfig,
    S: StatusSource,
    T: UploadTransport,
{
    chip: C,
    store: B,
    clock: K,
    config: F,
    status: S,
    transport: T,
    shared: &'static LinkShared,

    dispatcher: Dispatcher,
    sequencer: ChannelSequencer,
    sync: SyncTiming,
    stats: LinkStats,

    /// Deadline for the next timer-forced hop.
    next_switch_us: u32,
    tick: u32,
    pps_counter: u32,
    last_stats_ms: u32,
    lost: bool,

    applied_power: u8,
    applied_crc_disabled: bool,
    applied_factory: u8,
    applied_fcc: u8,
}

impl<C, B, K, F, S, T> LinkRunner<C, B, K, F, S, T>
where
    C: RadioChip,
    B: BindStore,
    K: LinkClock,
    F: LinkConfig,
    S: StatusSource,
    T: UploadTransport,
{
    /// Register the worker. Fails if another runner already exists; the
    /// claim is released again when this one is dropped.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chip: C,
        store: B,
        clock: K,
        config: F,
        status: S,
        transport: T,
        shared: &'static LinkShared,
    ) -> Result<Self, InitError> {
        if WORKER_CLAIMED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(InitError::WorkerAlreadyRunning);
        }
        Ok(Self {
            chip,
            store,
            clock,
            config,
            status,
            transport,
            shared,
            dispatcher: Dispatcher::new(),
            sequencer: ChannelSequencer::new(),
            sync: SyncTiming::new(),
            stats: LinkStats::default(),
            next_switch_us: 0,
            tick: 0,
            pps_counter: 0,
            last_stats_ms: 0,
            lost: false,
            applied_power: 0,
            applied_crc_disabled: false,
            applied_factory: 0,
            applied_fcc: 0,
        })
    }

    /// Run the link forever. Only a chip bus failure ever returns.
    pub async fn run(&mut self) -> Result<Infallible, LinkError<C::Error>> {
        self.startup()?;
        let shared = self.shared;
        loop {
            let events = shared.events().wait().await;
            // Reception first: a frame that arrived just before the hop
            // deadline must be drained before hopping away from it.
            if events & EVT_IRQ != 0 {
                let when = shared.take_irq_time();
                self.service_irq(when).await?;
            }
            if events & EVT_BIND != 0 {
                self.service_bind_request();
            }
            if events & EVT_TIMEOUT != 0 {
                self.service_timeout().await?;
            }
            self.shared.publish(self.dispatcher.channels, self.stats);
        }
    }

    fn startup(&mut self) -> Result<(), LinkError<C::Error>> {
        if let Some(record) = load_bind_record(&mut self.store) {
            self.chip.set_addresses(&record.address)?;
            #[cfg(feature = "defmt")]
            defmt::info!("restored bind record");
        }
        self.chip.enable_carrier_detect(true)?;
        self.chip.set_channel(self.sequencer.rf_channel())?;
        self.chip.switch_to_rx()?;
        let now = self.clock.now_us();
        self.next_switch_us = now
            .wrapping_add(NOMINAL_PACKET_INTERVAL_US)
            .wrapping_add(POST_RX_HOP_MARGIN_US);
        self.last_stats_ms = self.clock.now_ms();
        self.sync.touch_packet_timer(now);
        Ok(())
    }

    //==============================================================================
    // Reception path
    //==============================================================================

    async fn service_irq(&mut self, when: u32) -> Result<(), LinkError<C::Error>> {
        let iflags = self.chip.read_register(regs::STATUS)?;
        self.chip.write_register(regs::WRITE_REG | regs::STATUS, iflags)?;
        if self.applied_fcc != 0 {
            // Regulatory test modes suspend normal traffic handling.
            return Ok(());
        }
        if iflags & regs::STATUS_TX_DS != 0 {
            self.finish_transmit()?;
        }
        if iflags & regs::STATUS_RX_DR != 0 {
            self.drain_rx(when).await?;
        }
        Ok(())
    }

    /// Our reply finished going out: back to receive and onto the next
    /// channel, where the peer will transmit next.
    fn finish_transmit(&mut self) -> Result<(), LinkError<C::Error>> {
        self.sync.mark_tx(self.clock.now_us());
        if self.applied_crc_disabled {
            // CRC was enabled for the reply only.
            self.chip.set_crc_disabled(true)?;
        }
        self.chip.switch_to_rx()?;
        self.hop()
    }

    async fn drain_rx(&mut self, when: u32) -> Result<(), LinkError<C::Error>> {
        // The reply waits until the FIFO is empty: answering mid-drain
        // would flush our own in-flight reply when a second frame is
        // backlogged, so every frame is applied and the last one answered.
        let mut action = RxAction::None;
        loop {
            let sta = self.chip.read_register(regs::STATUS)?;
            if sta & regs::STATUS_RX_PIPE_MASK == regs::STATUS_RX_PIPE_EMPTY {
                break; // raced with an earlier drain
            }
            let pipe = (sta & regs::STATUS_RX_PIPE_MASK) >> 1;
            let len = self.chip.read_register(regs::RX_PAYLOAD_WIDTH)? as usize;
            if len > RX_FRAME_LEN {
                // Garbled width: the FIFO content cannot be trusted.
                let mut junk = [0u8; 32];
                let n = len.min(junk.len());
                self.chip.read_fifo(&mut junk[..n])?;
                self.chip.strobe(regs::FLUSH_RX)?;
                self.stats.recv_errors = self.stats.recv_errors.wrapping_add(1);
            } else if pipe > PIPE_BIND {
                // Only the control and bind pipes carry peer traffic.
                let mut junk = [0u8; RX_FRAME_LEN];
                self.chip.read_fifo(&mut junk[..len])?;
                self.stats.recv_errors = self.stats.recv_errors.wrapping_add(1);
            } else {
                let mut buf = [0u8; RX_FRAME_LEN];
                self.chip.read_fifo(&mut buf[..len])?;
                action = self.receive_frame(&buf[..len], pipe, when)?;
            }
            let fifo = self.chip.read_register(regs::FIFO_STATUS)?;
            if fifo & regs::FIFO_RX_EMPTY != 0 {
                break;
            }
        }
        match action {
            RxAction::Respond if self.config.telemetry_enabled() => self.send_reply().await,
            RxAction::Respond => self.hop(),
            RxAction::Retune => {
                // Land on the index the bind frame carried, no advance.
                self.chip.set_channel(self.sequencer.rf_channel())?;
                Ok(())
            }
            RxAction::None => Ok(()),
        }
    }

    fn receive_frame(
        &mut self,
        raw: &[u8],
        pipe: u8,
        when: u32,
    ) -> Result<RxAction, LinkError<C::Error>> {
        self.sync.observe(when);
        self.next_switch_us = self.sync.next_hop_deadline_hint(when);
        self.stats.recv_packets = self.stats.recv_packets.wrapping_add(1);
        self.pps_counter += 1;
        self.lost = false;

        let was_bound = self.dispatcher.binding.bound;
        let now_ms = self.clock.now_ms();
        let chip = &mut self.chip;
        let mut env = PacketEnv {
            config: &self.config,
            store: &mut self.store,
            sequencer: &mut self.sequencer,
            sync: &mut self.sync,
            upload: self.shared.upload(),
            now_us: when,
            now_ms,
        };
        let adopted = self.dispatcher.process_packet(raw, pipe, &mut env, || {
            chip.carrier_detect().unwrap_or(false)
        });
        if let Some(address) = adopted {
            self.chip.set_addresses(&address)?;
        }
        if !was_bound && self.dispatcher.binding.bound && self.config.rssi_channel() == 0 {
            // Bound peers never auto-bind again; stop the continuous
            // carrier sampling to save chip power. With an RSSI output
            // slot configured the stats roll keeps sampling instead.
            self.chip.enable_carrier_detect(false)?;
        }

        if pipe == PIPE_BIND {
            Ok(RxAction::Retune)
        } else {
            Ok(RxAction::Respond)
        }
    }

    /// Answer a control packet in its hop slot: one DFU fragment if the
    /// upload backlog earns the slot, a telemetry frame otherwise.
    async fn send_reply(&mut self) -> Result<(), LinkError<C::Error>> {
        self.chip.strobe(regs::FLUSH_TX)?;
        self.chip.clear_ack_overflow()?;
        let mut buf = [0u8; DFU_FRAME_LEN];
        let len = self.compose_reply(&mut buf);
        if self.applied_crc_disabled {
            // The peer always checks CRC on our replies.
            self.chip.set_crc_disabled(false)?;
        }
        self.chip.switch_to_tx()?;
        Timer::after_micros(TX_TURNAROUND_US).await;
        self.chip.send_packet(&buf[..len])?;
        Ok(())
    }

    fn compose_reply(&mut self, buf: &mut [u8; DFU_FRAME_LEN]) -> usize {
        if let Ok(mut upload) = self.shared.upload().try_lock() {
            if upload.fragment_due() {
                if let Some((offset, data)) = upload.next_fragment() {
                    *buf = DfuFrame { offset, data }.encode(self.sequencer.index());
                    return DFU_FRAME_LEN;
                }
            }
        }
        buf[..TELEMETRY_FRAME_LEN].copy_from_slice(&self.telemetry_reply());
        TELEMETRY_FRAME_LEN
    }

    fn telemetry_reply(&self) -> [u8; TELEMETRY_FRAME_LEN] {
        TelemetryFrame {
            pps: self.stats.pps,
            flags: self.status.telemetry_flags(),
            drone_id: self.status.drone_id(),
            flight_mode: self.status.flight_mode(),
            wifi: self.status.wifi_channel() + 24 * self.status.tx_max_power(),
            note_adjust: self.status.note_adjust(),
        }
        .encode(self.sequencer.index())
    }

    //==============================================================================
    // Timer path
    //==============================================================================

    async fn service_timeout(&mut self) -> Result<(), LinkError<C::Error>> {
        let now = self.clock.now_us();
        self.tick = self.tick.wrapping_add(1);
        if self.tick % PARAM_POLL_TICKS == 0 {
            self.poll_params()?;
        }

        if self.applied_fcc != 0 {
            // Carrier-wave modes transmit continuously on their own.
            if self.applied_fcc <= 3 && self.tick % FCC_SEND_TICKS == 0 {
                let frame = self.telemetry_reply();
                self.chip.switch_to_tx()?;
                Timer::after_micros(TX_TURNAROUND_US).await;
                self.chip.send_packet(&frame)?;
            }
        } else if (now.wrapping_sub(self.next_switch_us) as i32) >= 0 {
            self.forced_hop(now).await?;
        }

        self.upload_housekeeping();
        self.roll_stats()?;
        Ok(())
    }

    /// The expected packet never arrived: hop anyway, at the recovery
    /// cadence when the link has been silent too long.
    async fn forced_hop(&mut self, now: u32) -> Result<(), LinkError<C::Error>> {
        let (interval, lost) = self.sync.recovery_interval(now);
        if lost && !self.lost {
            self.lost = true;
            self.stats.sync_losses = self.stats.sync_losses.wrapping_add(1);
            self.sequencer.force_safe_table();
            #[cfg(feature = "defmt")]
            defmt::warn!("sync lost, slowing hops on safe table");
        }
        let fifo = self.chip.read_register(regs::FIFO_STATUS)?;
        if fifo & regs::FIFO_RX_EMPTY == 0 {
            // Missed interrupt: drain the frame instead of hopping away.
            self.service_irq(now).await?;
            return Ok(());
        }
        self.next_switch_us = self.next_switch_us.wrapping_add(interval);
        if (self.next_switch_us.wrapping_sub(now) as i32) < TIMER_STEP_US as i32 {
            // Less than one tick of lead left (or behind): rebase on now
            // so consecutive forced hops keep a full interval apart.
            self.next_switch_us = now.wrapping_add(interval);
        }
        if !self.chip.is_rx_mode()? {
            self.chip.switch_to_rx()?;
        }
        self.hop()?;
        self.chip.clear_ack_overflow()?;
        self.stats.timeouts = self.stats.timeouts.wrapping_add(1);
        Ok(())
    }

    fn service_bind_request(&mut self) {
        let now_ms = self.clock.now_ms();
        self.dispatcher.binding.requested_at_ms = Some(now_ms);
        self.dispatcher.channels.reset_count();
        self.sync.touch_packet_timer(self.clock.now_us());
        #[cfg(feature = "defmt")]
        defmt::info!("manual bind window opened");
    }

    /// Apply configuration changes. The chip only accepts power and CRC
    /// writes while idle, so each change cycles through idle and back.
    fn poll_params(&mut self) -> Result<(), LinkError<C::Error>> {
        let power = self.config.transmit_power();
        if (1..=8).contains(&power) && power != self.applied_power {
            self.chip.switch_to_idle()?;
            self.chip.set_power(power - 1)?;
            self.chip.switch_to_rx()?;
            self.applied_power = power;
        }

        let crc_disabled = self.config.crc_disabled();
        if crc_disabled != self.applied_crc_disabled {
            self.chip.switch_to_idle()?;
            self.chip.set_crc_disabled(crc_disabled)?;
            self.chip.switch_to_rx()?;
            self.applied_crc_disabled = crc_disabled;
        }

        let factory = self.config.factory_test();
        if factory != self.applied_factory {
            if factory != 0 {
                self.sequencer
                    .set_index(ChannelSequencer::factory_index(factory));
            } else {
                self.sequencer.set_index(0);
            }
            self.chip.set_factory_mode(factory)?;
            self.chip.set_channel(self.sequencer.rf_channel())?;
            self.applied_factory = factory;
        }

        let fcc = self.config.fcc_test();
        if fcc != self.applied_fcc {
            self.apply_fcc(fcc)?;
            self.applied_fcc = fcc;
        }
        Ok(())
    }

    /// Selector 0 leaves test mode; 1..=3 park on the low/mid/high test
    /// channel in packet mode, 4..=6 the same channels as raw carrier.
    fn apply_fcc(&mut self, selector: u8) -> Result<(), LinkError<C::Error>> {
        self.chip.strobe(regs::FLUSH_TX)?;
        if selector == 0 {
            self.chip.set_cw_mode(false)?;
            self.chip.set_channel(self.sequencer.rf_channel())?;
            self.chip.switch_to_rx()?;
            return Ok(());
        }
        let channel = match (selector - 1) % 3 {
            0 => FCC_CHANNEL_LOW,
            1 => FCC_CHANNEL_MID,
            _ => FCC_CHANNEL_HIGH,
        };
        self.chip.switch_to_idle()?;
        self.chip.set_cw_mode(selector > 3)?;
        self.chip.set_channel(channel)?;
        Ok(())
    }

    fn upload_housekeeping(&mut self) {
        let action = match self.shared.upload().try_lock() {
            Ok(mut upload) => upload.poll_refill(),
            Err(_) => None,
        };
        match action {
            Some(RefillAction::Request(offset)) => self.transport.request_more(offset),
            Some(RefillAction::Complete(total)) => self.transport.notify_complete(total),
            None => {}
        }
    }

    /// Once per second: roll the packet counter into pps and refresh the
    /// info output slots.
    fn roll_stats(&mut self) -> Result<(), LinkError<C::Error>> {
        let now_ms = self.clock.now_ms();
        if now_ms.wrapping_sub(self.last_stats_ms) < 1000 {
            return Ok(());
        }
        self.last_stats_ms = now_ms;
        self.stats.pps = self.pps_counter.min(255) as u8;
        self.pps_counter = 0;

        let rssi_slot = self.config.rssi_channel();
        if rssi_slot != 0 {
            // Sampling stays enabled for this slot even once bound.
            let rssi = if self.stats.pps == 0 {
                RSSI_FLOOR
            } else if self.chip.carrier_detect()? {
                RSSI_MIDSCALE + 4
            } else {
                RSSI_MIDSCALE - 4
            };
            self.write_info_slot(rssi_slot, rssi);
        }
        self.write_info_slot(self.config.pps_channel(), u16::from(self.stats.pps));
        self.write_info_slot(self.config.remote_rssi_channel(), RSSI_MIDSCALE);
        self.write_info_slot(
            self.config.remote_pps_channel(),
            u16::from(self.dispatcher.remote_pps),
        );
        Ok(())
    }

    /// Info slots are configured 1-based; 0 disables a slot.
    fn write_info_slot(&mut self, slot: u8, value: u16) {
        if slot != 0 {
            self.dispatcher.channels.write(usize::from(slot) - 1, value);
        }
    }

    fn hop(&mut self) -> Result<(), LinkError<C::Error>> {
        self.sequencer.advance();
        self.chip.set_channel(self.sequencer.rf_channel())?;
        Ok(())
    }
}

impl<C, B, K, F, S, T> Drop for LinkRunner<C, B, K, F, S, T>
where
    C: RadioChip,
    B: BindStore,
    K: LinkClock,
    F: LinkConfig,
    S: StatusSource,
    T: UploadTransport,
{
    fn drop(&mut self) {
        WORKER_CLAIMED.store(false, Ordering::Release);
    }
}
