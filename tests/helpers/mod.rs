//! Test doubles to simulate the radio chip, persistent storage, the
//! upload transport and the local clock during integration tests.
use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use hoplink::protocol::traits::{
    regs, BindStore, LinkClock, LinkConfig, RadioChip, StatusSource, UploadTransport,
};

/// Inner state of the simulated transceiver, shared with the test body.
#[derive(Default)]
pub struct ChipState {
    /// Staged inbound frames as `(pipe, payload)` pairs.
    pub rx_frames: VecDeque<(u8, Vec<u8>)>,
    /// Pending interrupt flags returned from the status register.
    pub pending_status: u8,
    /// Every payload handed to `send_packet`.
    pub sent: Vec<Vec<u8>>,
    /// Every address programmed via `set_addresses`.
    pub addresses: Vec<[u8; 5]>,
    /// Every channel tuned via `set_channel`.
    pub channels: Vec<u8>,
    pub carrier: bool,
    /// Latest `enable_carrier_detect` argument.
    pub carrier_sampling: bool,
    pub rx_mode: bool,
    pub strobes: Vec<u8>,
}

#[derive(Clone, Default)]
#[allow(dead_code)]
/// In-memory transceiver reproducing the `RadioChip` trait behavior.
pub struct MockChip {
    state: Arc<Mutex<ChipState>>,
}

#[allow(dead_code)]
impl MockChip {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an inbound frame and mark the receive interrupt pending.
    pub fn push_frame(&self, pipe: u8, payload: &[u8]) {
        let mut s = self.state.lock().unwrap();
        s.rx_frames.push_back((pipe, payload.to_vec()));
        s.pending_status |= regs::STATUS_RX_DR;
    }

    pub fn set_carrier(&self, present: bool) {
        self.state.lock().unwrap().carrier = present;
    }

    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn programmed_addresses(&self) -> Vec<[u8; 5]> {
        self.state.lock().unwrap().addresses.clone()
    }

    pub fn tuned_channels(&self) -> Vec<u8> {
        self.state.lock().unwrap().channels.clone()
    }

    pub fn carrier_sampling(&self) -> bool {
        self.state.lock().unwrap().carrier_sampling
    }
}

impl RadioChip for MockChip {
    type Error = Infallible;

    fn read_register(&mut self, reg: u8) -> Result<u8, Self::Error> {
        let s = self.state.lock().unwrap();
        Ok(match reg {
            regs::STATUS => {
                let pipe_bits = match s.rx_frames.front() {
                    Some((pipe, _)) => (pipe << 1) & regs::STATUS_RX_PIPE_MASK,
                    None => regs::STATUS_RX_PIPE_EMPTY,
                };
                s.pending_status | pipe_bits
            }
            regs::RX_PAYLOAD_WIDTH => s.rx_frames.front().map_or(0, |(_, p)| p.len() as u8),
            regs::FIFO_STATUS => {
                if s.rx_frames.is_empty() {
                    regs::FIFO_RX_EMPTY
                } else {
                    0
                }
            }
            _ => 0,
        })
    }

    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), Self::Error> {
        if reg == regs::WRITE_REG | regs::STATUS {
            self.state.lock().unwrap().pending_status &= !value;
        }
        Ok(())
    }

    fn strobe(&mut self, cmd: u8) -> Result<(), Self::Error> {
        let mut s = self.state.lock().unwrap();
        if cmd == regs::FLUSH_RX {
            s.rx_frames.clear();
        }
        s.strobes.push(cmd);
        Ok(())
    }

    fn read_fifo(&mut self, buf: &mut [u8]) -> Result<(), Self::Error> {
        let mut s = self.state.lock().unwrap();
        if let Some((_, payload)) = s.rx_frames.pop_front() {
            let n = buf.len().min(payload.len());
            buf[..n].copy_from_slice(&payload[..n]);
        }
        Ok(())
    }

    fn send_packet(&mut self, payload: &[u8]) -> Result<(), Self::Error> {
        let mut s = self.state.lock().unwrap();
        s.sent.push(payload.to_vec());
        // A real chip raises its interrupt line on completion; the test
        // decides when to report it.
        s.pending_status |= regs::STATUS_TX_DS;
        Ok(())
    }

    fn set_channel(&mut self, channel: u8) -> Result<(), Self::Error> {
        self.state.lock().unwrap().channels.push(channel);
        Ok(())
    }

    fn switch_to_rx(&mut self) -> Result<(), Self::Error> {
        self.state.lock().unwrap().rx_mode = true;
        Ok(())
    }

    fn switch_to_tx(&mut self) -> Result<(), Self::Error> {
        self.state.lock().unwrap().rx_mode = false;
        Ok(())
    }

    fn switch_to_idle(&mut self) -> Result<(), Self::Error> {
        self.state.lock().unwrap().rx_mode = false;
        Ok(())
    }

    fn is_rx_mode(&mut self) -> Result<bool, Self::Error> {
        Ok(self.state.lock().unwrap().rx_mode)
    }

    fn carrier_detect(&mut self) -> Result<bool, Self::Error> {
        Ok(self.state.lock().unwrap().carrier)
    }

    fn enable_carrier_detect(&mut self, enabled: bool) -> Result<(), Self::Error> {
        self.state.lock().unwrap().carrier_sampling = enabled;
        Ok(())
    }

    fn set_addresses(&mut self, address: &[u8; 5]) -> Result<(), Self::Error> {
        self.state.lock().unwrap().addresses.push(*address);
        Ok(())
    }

    fn set_power(&mut self, _level: u8) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_crc_disabled(&mut self, _disabled: bool) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_factory_mode(&mut self, _mode: u8) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_cw_mode(&mut self, _enabled: bool) -> Result<(), Self::Error> {
        Ok(())
    }

    fn clear_ack_overflow(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[derive(Clone, Default)]
/// In-memory bind storage.
pub struct MockStore {
    block: Arc<Mutex<[u8; 16]>>,
}

#[allow(dead_code)]
impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(&self) -> [u8; 16] {
        *self.block.lock().unwrap()
    }
}

impl BindStore for MockStore {
    type Error = Infallible;

    fn write_block(&mut self, offset: u16, data: &[u8]) -> Result<(), Self::Error> {
        let mut block = self.block.lock().unwrap();
        let start = offset as usize;
        block[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read_block(&mut self, offset: u16, data: &mut [u8]) -> Result<(), Self::Error> {
        let block = self.block.lock().unwrap();
        let start = offset as usize;
        data.copy_from_slice(&block[start..start + data.len()]);
        Ok(())
    }
}

#[derive(Clone)]
/// Wall-clock microsecond/millisecond source for the worker.
pub struct TestClock {
    start: Instant,
}

#[allow(dead_code)]
impl TestClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now_us(&self) -> u32 {
        self.start.elapsed().as_micros() as u32
    }
}

impl LinkClock for TestClock {
    fn now_us(&self) -> u32 {
        TestClock::now_us(self)
    }

    fn now_ms(&self) -> u32 {
        self.start.elapsed().as_millis() as u32
    }
}

#[derive(Clone, Default)]
/// Clock that only moves when the test advances it, for timing-sensitive
/// scenarios driven tick by tick.
pub struct ManualClock {
    micros: Arc<AtomicU32>,
}

#[allow(dead_code)]
impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, us: u32) {
        self.micros.fetch_add(us, Ordering::SeqCst);
    }

    pub fn now_us(&self) -> u32 {
        self.micros.load(Ordering::SeqCst)
    }
}

impl LinkClock for ManualClock {
    fn now_us(&self) -> u32 {
        ManualClock::now_us(self)
    }

    fn now_ms(&self) -> u32 {
        ManualClock::now_us(self) / 1000
    }
}

#[derive(Clone, Copy)]
/// Fixed link parameters for a plain bound session.
pub struct FixedConfig {
    pub telemetry_enabled: bool,
    pub stick_mode: u8,
    /// 1-based RSSI output slot; 0 leaves the slot unconfigured.
    pub rssi_slot: u8,
}

impl Default for FixedConfig {
    fn default() -> Self {
        Self {
            telemetry_enabled: true,
            stick_mode: 2,
            rssi_slot: 0,
        }
    }
}

impl LinkConfig for FixedConfig {
    fn transmit_power(&self) -> u8 {
        8
    }
    fn crc_disabled(&self) -> bool {
        false
    }
    fn factory_test(&self) -> u8 {
        0
    }
    fn fcc_test(&self) -> u8 {
        0
    }
    fn autobind_rssi(&self) -> u8 {
        0
    }
    fn autobind_grace_s(&self) -> u8 {
        0
    }
    fn telemetry_enabled(&self) -> bool {
        self.telemetry_enabled
    }
    fn stick_mode(&self) -> u8 {
        self.stick_mode
    }
    fn rssi_channel(&self) -> u8 {
        self.rssi_slot
    }
    fn pps_channel(&self) -> u8 {
        0
    }
    fn remote_rssi_channel(&self) -> u8 {
        0
    }
    fn remote_pps_channel(&self) -> u8 {
        0
    }
}

#[derive(Clone, Copy)]
/// Static vehicle status folded into telemetry replies.
pub struct StatusStub;

impl StatusSource for StatusStub {
    fn telemetry_flags(&self) -> u8 {
        0b0000_0101
    }
    fn flight_mode(&self) -> u8 {
        2
    }
    fn wifi_channel(&self) -> u8 {
        4
    }
    fn tx_max_power(&self) -> u8 {
        1
    }
    fn note_adjust(&self) -> u8 {
        0
    }
    fn drone_id(&self) -> [u8; 4] {
        [1, 2, 3, 4]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(dead_code)]
pub enum TransportCall {
    RequestMore(u32),
    Complete(u32),
}

#[derive(Clone, Default)]
/// Records the outbound upload-transport notifications.
pub struct MockTransport {
    calls: Arc<Mutex<Vec<TransportCall>>>,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl UploadTransport for MockTransport {
    fn request_more(&mut self, current_offset: u32) {
        self.calls
            .lock()
            .unwrap()
            .push(TransportCall::RequestMore(current_offset));
    }

    fn notify_complete(&mut self, total_length: u32) {
        self.calls
            .lock()
            .unwrap()
            .push(TransportCall::Complete(total_length));
    }
}
