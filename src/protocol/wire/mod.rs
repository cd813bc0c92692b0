//! Wire formats of the RC link: 12-byte control/bind frames received
//! from the transmitter, and the 12-byte telemetry / 20-byte DFU frames
//! sent back. Layouts and type codes are negotiated with the peer
//! firmware and must not change.

/// Longest valid inbound frame; anything larger is a garbled FIFO read.
pub const RX_FRAME_LEN: usize = 12;
/// Outbound telemetry frame length.
pub const TELEMETRY_FRAME_LEN: usize = 12;
/// Outbound DFU frame length.
pub const DFU_FRAME_LEN: usize = 20;
/// Firmware payload bytes per DFU frame.
pub const DFU_FRAGMENT_LEN: usize = 16;

/// Packet type codes (first byte of every frame).
pub mod packet_type {
    /// Control sticks, transmitter sees our telemetry.
    pub const CTRL_FOUND: u8 = 0x10;
    /// Control sticks, transmitter lost our telemetry.
    pub const CTRL_LOST: u8 = 0x11;
    /// Unsolicited bind offer, gated by carrier detect.
    pub const BIND_AUTO: u8 = 0x12;
    /// Our own telemetry reply type.
    pub const TELEMETRY: u8 = 0x13;
    /// Our own firmware-fragment reply type.
    pub const DFU: u8 = 0x14;
    /// Bind triggered by a user action on the transmitter.
    pub const BIND_MANUAL: u8 = 0x15;
}

/// Tag codes of the auxiliary info slot in control frames.
mod aux_tag {
    pub const FW_VERSION: u8 = 1;
    pub const DFU_ACK: u8 = 2;
    pub const FW_CRC_LO: u8 = 3;
    pub const FW_CRC_HI: u8 = 4;
    pub const FW_YEAR_MONTH: u8 = 5;
    pub const FW_DAY: u8 = 6;
    pub const MODEL: u8 = 7;
    pub const PPS: u8 = 8;
    pub const BATTERY: u8 = 9;
    pub const COUNTDOWN: u8 = 10;
}

/// Telemetry status flag bits.
pub mod telem_flags {
    pub const GPS_OK: u8 = 1 << 0;
    pub const ARM_OK: u8 = 1 << 1;
    pub const BATT_OK: u8 = 1 << 2;
    pub const ARMED: u8 = 1 << 3;
    pub const POS_OK: u8 = 1 << 4;
    pub const VIDEO: u8 = 1 << 5;
}

/// Decoded auxiliary info slot of a control frame.
///
/// One tagged value rides along with every control frame; the
/// transmitter rotates through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuxField {
    /// Firmware version/CRC/date/model echoes; nothing to act on here.
    FirmwareInfo,
    /// Transmitter acknowledged our DFU fragment ending at `offset`.
    DfuAck { offset: u16 },
    /// Transmitter-side packets-per-second.
    RemotePps(u8),
    /// Transmitter battery in its raw 0.04 V units.
    RemoteBattery(u8),
    /// Hop `hops` more times, then land on channel index `target`.
    Countdown { hops: u8, target: u8 },
    /// Unknown tag; skipped for forward compatibility.
    Unknown(u8),
}

impl AuxField {
    fn decode(tag: u8, lo: u8, hi: u8) -> Self {
        match tag {
            aux_tag::FW_VERSION
            | aux_tag::FW_CRC_LO
            | aux_tag::FW_CRC_HI
            | aux_tag::FW_YEAR_MONTH
            | aux_tag::FW_DAY
            | aux_tag::MODEL => AuxField::FirmwareInfo,
            aux_tag::DFU_ACK => AuxField::DfuAck {
                offset: u16::from(hi) << 8 | u16::from(lo),
            },
            aux_tag::PPS => AuxField::RemotePps(lo),
            aux_tag::BATTERY => AuxField::RemoteBattery(lo),
            aux_tag::COUNTDOWN => AuxField::Countdown {
                hops: lo,
                target: hi,
            },
            other => AuxField::Unknown(other),
        }
    }
}

/// Control frame: stick positions plus switch states and the aux slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlFrame {
    /// Hop-table index the transmitter is on.
    pub channel: u8,
    pub roll: u8,
    pub pitch: u8,
    pub throttle: u8,
    pub yaw: u8,
    /// Packed bits 8..9 of the four stick values.
    pub msb: u8,
    pub buttons_held: u8,
    pub buttons_toggled: u8,
    pub aux: AuxField,
}

impl ControlFrame {
    /// Stick values widened to 1000..=2023 µs-style outputs, native
    /// (mode 2) ordering: roll, pitch, throttle, yaw.
    pub fn stick_values(&self) -> [u16; 4] {
        [
            1000 + u16::from(self.roll) + (u16::from(self.msb & 0xC0) << 2),
            1000 + u16::from(self.pitch) + (u16::from(self.msb & 0x30) << 4),
            1000 + u16::from(self.throttle) + (u16::from(self.msb & 0x0C) << 6),
            1000 + u16::from(self.yaw) + (u16::from(self.msb & 0x03) << 8),
        ]
    }

    /// Switch banks SW1-3 and SW4-6 as stepped channel outputs.
    pub fn switch_values(&self) -> [u16; 2] {
        [
            1000 + u16::from(self.buttons_held & 0x07) * 100,
            1000 + u16::from((self.buttons_held & 0x38) >> 3) * 100,
        ]
    }
}

/// Bind frame: the channel index to land on and the peer address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindFrame {
    pub channel: u8,
    pub address: [u8; 5],
}

/// Classified inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxPacket {
    Control(ControlFrame),
    AutoBind(BindFrame),
    ManualBind(BindFrame),
    /// Telemetry/DFU types: our own outbound traffic echoed back.
    OwnEcho,
}

impl RxPacket {
    /// Parse a drained FIFO payload. `None` means an unknown type code
    /// or a frame too short for its type.
    pub fn parse(raw: &[u8]) -> Option<Self> {
        if raw.len() < RX_FRAME_LEN {
            return None;
        }
        match raw[0] {
            packet_type::CTRL_FOUND | packet_type::CTRL_LOST => {
                Some(RxPacket::Control(ControlFrame {
                    channel: raw[1],
                    roll: raw[2],
                    pitch: raw[3],
                    throttle: raw[4],
                    yaw: raw[5],
                    msb: raw[6],
                    buttons_held: raw[7],
                    buttons_toggled: raw[8],
                    aux: AuxField::decode(raw[9], raw[10], raw[11]),
                }))
            }
            packet_type::BIND_AUTO | packet_type::BIND_MANUAL => {
                let mut address = [0u8; 5];
                address.copy_from_slice(&raw[2..7]);
                let frame = BindFrame {
                    channel: raw[1],
                    address,
                };
                if raw[0] == packet_type::BIND_AUTO {
                    Some(RxPacket::AutoBind(frame))
                } else {
                    Some(RxPacket::ManualBind(frame))
                }
            }
            packet_type::TELEMETRY | packet_type::DFU => Some(RxPacket::OwnEcho),
            _ => None,
        }
    }
}

/// Outbound telemetry reply.
#[derive(Debug, Clone, Copy, Default)]
pub struct TelemetryFrame {
    pub pps: u8,
    pub flags: u8,
    pub drone_id: [u8; 4],
    pub flight_mode: u8,
    /// WiFi channel plus `24 * tx_max_power`, packed as on the wire.
    pub wifi: u8,
    pub note_adjust: u8,
}

impl TelemetryFrame {
    /// Encode for transmission on hop-table index `channel`.
    pub fn encode(&self, channel: u8) -> [u8; TELEMETRY_FRAME_LEN] {
        [
            packet_type::TELEMETRY,
            channel,
            self.pps,
            self.flags,
            self.drone_id[0],
            self.drone_id[1],
            self.drone_id[2],
            self.drone_id[3],
            self.flight_mode,
            self.wifi,
            self.note_adjust,
            0,
        ]
    }
}

/// Outbound firmware-upload fragment.
#[derive(Debug, Clone, Copy)]
pub struct DfuFrame {
    /// Byte offset of this fragment within the transfer.
    pub offset: u16,
    pub data: [u8; DFU_FRAGMENT_LEN],
}

impl DfuFrame {
    /// Encode for transmission on hop-table index `channel`.
    pub fn encode(&self, channel: u8) -> [u8; DFU_FRAME_LEN] {
        let mut out = [0u8; DFU_FRAME_LEN];
        out[0] = packet_type::DFU;
        out[1] = channel;
        out[2] = (self.offset & 0xFF) as u8;
        out[3] = (self.offset >> 8) as u8;
        out[4..].copy_from_slice(&self.data);
        out
    }
}

#[cfg(test)]
mod tests;
