//! Read-only configuration and status providers. The integrating
//! firmware owns the values (user parameters, notifier flags); the link
//! engine polls them from the worker task only.

/// User-configured link parameters.
pub trait LinkConfig {
    /// Requested transmit power, 1..=8; 0 leaves the chip untouched.
    fn transmit_power(&self) -> u8;
    /// Disable CRC on reception (regulatory/diagnostic use).
    fn crc_disabled(&self) -> bool;
    /// Factory-test selector, 0 = off, 1..=8 picks a test channel.
    fn factory_test(&self) -> u8;
    /// FCC-test selector: 0 = off, 1..=3 packet mode on the low/mid/high
    /// test channel, 4..=6 the same channels in carrier-wave mode.
    fn fcc_test(&self) -> u8;
    /// Auto-bind RSSI threshold; values above midscale disable auto-bind.
    fn autobind_rssi(&self) -> u8;
    /// Seconds after boot before auto-bind may trigger; 0 disables it.
    fn autobind_grace_s(&self) -> u8;
    /// Whether telemetry replies are transmitted at all.
    fn telemetry_enabled(&self) -> bool;
    /// Stick mode 1..=4 (mode 2 is the native layout).
    fn stick_mode(&self) -> u8;

    /// 1-based output slot for local RSSI; 0 disables the slot.
    fn rssi_channel(&self) -> u8;
    /// 1-based output slot for local packets-per-second; 0 disables.
    fn pps_channel(&self) -> u8;
    /// 1-based output slot for the transmitter's RSSI; 0 disables.
    fn remote_rssi_channel(&self) -> u8;
    /// 1-based output slot for the transmitter's pps; 0 disables.
    fn remote_pps_channel(&self) -> u8;
}

/// Live vehicle status folded into telemetry replies.
pub trait StatusSource {
    /// Flag byte built from [`crate::protocol::wire::telem_flags`].
    fn telemetry_flags(&self) -> u8;
    fn flight_mode(&self) -> u8;
    /// Current WiFi channel of the video link.
    fn wifi_channel(&self) -> u8;
    /// User-limited maximum transmitter power, folded into the WiFi byte.
    fn tx_max_power(&self) -> u8;
    /// Buzzer tuning offset echoed to the transmitter.
    fn note_adjust(&self) -> u8;
    /// Identifier reported in every telemetry frame.
    fn drone_id(&self) -> [u8; 4];
}
