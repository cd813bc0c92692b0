//! Synchronous abstraction over the half-duplex 2.4 GHz transceiver.
//! All methods are called exclusively from the link worker task; the
//! implementation handles bus acquisition per transaction.

/// Register and strobe codes shared by BK2425-class transceivers.
///
/// The worker reads interrupt status and drains the receive FIFO itself,
/// so the relevant codes live at this interface rather than inside the
/// chip driver.
pub mod regs {
    /// Interrupt/status register.
    pub const STATUS: u8 = 0x07;
    /// FIFO status register.
    pub const FIFO_STATUS: u8 = 0x17;
    /// Command register returning the top payload width.
    pub const RX_PAYLOAD_WIDTH: u8 = 0x60;
    /// OR onto a register number to write it.
    pub const WRITE_REG: u8 = 0x20;

    /// Packet received.
    pub const STATUS_RX_DR: u8 = 0x40;
    /// Packet transmitted.
    pub const STATUS_TX_DS: u8 = 0x20;
    /// Retransmit limit reached.
    pub const STATUS_MAX_RT: u8 = 0x10;
    /// Receive-pipe field, shifted right by one.
    pub const STATUS_RX_PIPE_MASK: u8 = 0x0E;
    /// Pipe-field value meaning "RX FIFO empty".
    pub const STATUS_RX_PIPE_EMPTY: u8 = 0x0E;

    /// RX FIFO empty flag in [`FIFO_STATUS`].
    pub const FIFO_RX_EMPTY: u8 = 0x01;

    /// Flush transmit FIFO strobe.
    pub const FLUSH_TX: u8 = 0xE1;
    /// Flush receive FIFO strobe.
    pub const FLUSH_RX: u8 = 0xE2;
}

/// Contract for the radio chip driver.
///
/// Everything is synchronous: the worker owns the chip outright and a
/// transaction-level bus lock inside the driver is all the mutual
/// exclusion the hardware needs.
pub trait RadioChip {
    type Error: core::fmt::Debug;

    /// Read one register (or width-returning command) value.
    fn read_register(&mut self, reg: u8) -> Result<u8, Self::Error>;
    /// Write one register value.
    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), Self::Error>;
    /// Issue a single-byte strobe command.
    fn strobe(&mut self, cmd: u8) -> Result<(), Self::Error>;
    /// Drain `buf.len()` bytes of the top receive-FIFO payload.
    fn read_fifo(&mut self, buf: &mut [u8]) -> Result<(), Self::Error>;
    /// Load `payload` into the transmit FIFO and start transmission.
    fn send_packet(&mut self, payload: &[u8]) -> Result<(), Self::Error>;

    /// Tune to a radio channel code from the hop table.
    fn set_channel(&mut self, channel: u8) -> Result<(), Self::Error>;
    fn switch_to_rx(&mut self) -> Result<(), Self::Error>;
    fn switch_to_tx(&mut self) -> Result<(), Self::Error>;
    fn switch_to_idle(&mut self) -> Result<(), Self::Error>;
    /// Whether the chip was left in receive mode.
    fn is_rx_mode(&mut self) -> Result<bool, Self::Error>;

    /// Chip-reported nearby-transmitter indication, used to gate
    /// auto-bind to physically close peers.
    fn carrier_detect(&mut self) -> Result<bool, Self::Error>;
    /// Enable or disable continuous carrier-detect sampling.
    fn enable_carrier_detect(&mut self, enabled: bool) -> Result<(), Self::Error>;

    /// Program the 5-byte pipe addresses for a newly bound peer.
    fn set_addresses(&mut self, address: &[u8; 5]) -> Result<(), Self::Error>;
    /// Transmit power, 0..=7. Chip must be idle.
    fn set_power(&mut self, level: u8) -> Result<(), Self::Error>;
    /// Disable (`true`) or re-enable (`false`) CRC checking. Chip must
    /// be idle.
    fn set_crc_disabled(&mut self, disabled: bool) -> Result<(), Self::Error>;
    /// Enter factory-test addressing mode (0 leaves it).
    fn set_factory_mode(&mut self, mode: u8) -> Result<(), Self::Error>;
    /// Continuous carrier-wave output for regulatory testing.
    fn set_cw_mode(&mut self, enabled: bool) -> Result<(), Self::Error>;
    /// Clear a pending acknowledge-FIFO overflow condition.
    fn clear_ack_overflow(&mut self) -> Result<(), Self::Error>;
}
