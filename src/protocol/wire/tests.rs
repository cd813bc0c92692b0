//! Wire-format tests against the fixed peer layout.
use super::*;

fn control_raw(aux: [u8; 3]) -> [u8; 12] {
    [
        packet_type::CTRL_FOUND,
        9,      // channel
        0x20,   // roll
        0x40,   // pitch
        0x60,   // throttle
        0x80,   // yaw
        0b1110_0110, // msb
        0b0010_1101, // buttons held
        0x00,
        aux[0],
        aux[1],
        aux[2],
    ]
}

#[test]
/// Stick values combine the packed high bits per axis.
fn control_sticks_combine_msb_bits() {
    let pkt = RxPacket::parse(&control_raw([0, 0, 0])).unwrap();
    let RxPacket::Control(frame) = pkt else {
        panic!("expected control frame");
    };
    assert_eq!(frame.channel, 9);
    let sticks = frame.stick_values();
    assert_eq!(sticks[0], 1000 + 0x20 + (0xC0 << 2)); // both roll bits
    assert_eq!(sticks[1], 1000 + 0x40 + (0x20 << 4)); // pitch bit 9
    assert_eq!(sticks[2], 1000 + 0x60 + (0x04 << 6)); // throttle bit 8
    assert_eq!(sticks[3], 1000 + 0x80 + (0x02 << 8)); // yaw bit 9
    let sw = frame.switch_values();
    assert_eq!(sw[0], 1000 + 5 * 100); // SW1-3 = 0b101
    assert_eq!(sw[1], 1000 + 5 * 100); // SW4-6 = 0b101
}

#[test]
/// The aux slot decodes each tagged variant.
fn aux_slot_variants() {
    let cases = [
        ([1, 7, 7], AuxField::FirmwareInfo),
        ([2, 0x10, 0x02], AuxField::DfuAck { offset: 0x0210 }),
        ([8, 91, 0], AuxField::RemotePps(91)),
        ([9, 150, 0], AuxField::RemoteBattery(150)),
        ([10, 4, 37], AuxField::Countdown { hops: 4, target: 37 }),
        ([200, 1, 2], AuxField::Unknown(200)),
    ];
    for (raw_aux, expected) in cases {
        let RxPacket::Control(frame) = RxPacket::parse(&control_raw(raw_aux)).unwrap() else {
            panic!("expected control frame");
        };
        assert_eq!(frame.aux, expected);
    }
}

#[test]
/// Bind frames carry the landing channel and the 5-byte peer address.
fn bind_frame_parse() {
    let raw = [
        packet_type::BIND_MANUAL,
        3,
        0xA1,
        0xB2,
        0xC3,
        0xD4,
        0xE5,
        0,
        0,
        0,
        0,
        0,
    ];
    let RxPacket::ManualBind(frame) = RxPacket::parse(&raw).unwrap() else {
        panic!("expected manual bind");
    };
    assert_eq!(frame.channel, 3);
    assert_eq!(frame.address, [0xA1, 0xB2, 0xC3, 0xD4, 0xE5]);

    let mut auto = raw;
    auto[0] = packet_type::BIND_AUTO;
    assert!(matches!(
        RxPacket::parse(&auto).unwrap(),
        RxPacket::AutoBind(_)
    ));
}

#[test]
/// Own outbound types classify as echoes; junk and runts are rejected.
fn echo_and_invalid_frames() {
    let mut raw = [0u8; 12];
    raw[0] = packet_type::TELEMETRY;
    assert_eq!(RxPacket::parse(&raw), Some(RxPacket::OwnEcho));
    raw[0] = packet_type::DFU;
    assert_eq!(RxPacket::parse(&raw), Some(RxPacket::OwnEcho));
    raw[0] = 0x77;
    assert_eq!(RxPacket::parse(&raw), None);
    assert_eq!(RxPacket::parse(&raw[..7]), None);
}

#[test]
/// Telemetry frame layout byte for byte.
fn telemetry_encode_layout() {
    let frame = TelemetryFrame {
        pps: 190,
        flags: telem_flags::GPS_OK | telem_flags::ARMED,
        drone_id: [1, 2, 3, 4],
        flight_mode: 5,
        wifi: 6 + 24 * 2,
        note_adjust: 30,
    };
    let bytes = frame.encode(11);
    assert_eq!(
        bytes,
        [packet_type::TELEMETRY, 11, 190, 0b1001, 1, 2, 3, 4, 5, 54, 30, 0]
    );
}

#[test]
/// DFU frame: little-endian offset then 16 payload bytes.
fn dfu_encode_layout() {
    let frame = DfuFrame {
        offset: 0x1234,
        data: [9u8; DFU_FRAGMENT_LEN],
    };
    let bytes = frame.encode(2);
    assert_eq!(bytes[..4], [packet_type::DFU, 2, 0x34, 0x12]);
    assert_eq!(bytes[4..], [9u8; 16]);
    assert_eq!(bytes.len(), DFU_FRAME_LEN);
}
