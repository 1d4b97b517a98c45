use thrustbus::*;
use thrustbus::checksum::checksum;
use thrustbus::frame::{self, Frame, FrameError};
use thrustbus::protocol::*;
use thrustbus::watchdog::{ControlState, DEFAULT_HEARTBEAT_TIMEOUT};
use tokio::time::Instant;

const GET_KILL_STATUS: [u8; 4] = [0x47, 0x44, 0x02, 0x35];
const SET_THRUSTER_4: [u8; 9] = [0x47, 0x44, 0x07, 0x04, 0x45, 0xD8, 0xA0, 0x3E, 0x8E];

fn setup() -> (ProtocolHandler, ControlState, Instant) {
    let now = Instant::now();
    let handler = ProtocolHandler::new(FloatByteOrder::Little, KillSemantics::WireCompatible);
    (handler, ControlState::new(DEFAULT_HEARTBEAT_TIMEOUT, now), now)
}

fn respond(handler: &mut ProtocolHandler, control: &mut ControlState, now: Instant, bytes: &[u8]) -> Option<Vec<u8>> {
    handler
        .handle(bytes, control, now)
        .map(|response| response.to_frame().to_vec())
}

#[test]
fn test_protocol_handler_creation() {
    let (handler, _, _) = setup();

    // Handler should start with clean counters
    assert_eq!(*handler.stats(), ProtocolStats::default());
    assert_eq!(handler.byte_order(), FloatByteOrder::Little);
    assert_eq!(handler.kill_semantics(), KillSemantics::WireCompatible);
}

#[test]
fn test_get_kill_status_armed_and_killed() {
    let (mut handler, mut control, now) = setup();

    let armed = respond(&mut handler, &mut control, now, &GET_KILL_STATUS);
    assert_eq!(armed, Some(vec![0x47, 0x44, 0x03, 0x00, 0x1B]));

    control.actuators.kill();
    let killed = respond(&mut handler, &mut control, now, &GET_KILL_STATUS);
    assert_eq!(killed, Some(vec![0x47, 0x44, 0x03, 0x01, 0x1C]));
    assert_eq!(handler.stats().kill_status_sent, 2);
}

#[test]
fn test_get_kill_status_is_idempotent() {
    let (mut handler, mut control, now) = setup();

    let first = respond(&mut handler, &mut control, now, &GET_KILL_STATUS);
    for _ in 0..10 {
        assert_eq!(respond(&mut handler, &mut control, now, &GET_KILL_STATUS), first);
    }
    assert!(!control.actuators.is_killed());
}

#[test]
fn test_set_thruster_reference_frame() {
    let (mut handler, mut control, now) = setup();

    let response = respond(&mut handler, &mut control, now, &SET_THRUSTER_4);
    assert_eq!(response, Some(vec![0x47, 0x44, 0x00, 0x33]));

    let expected = f32::from_le_bytes([0x45, 0xD8, 0xA0, 0x3E]);
    assert_eq!(control.actuators.thrusters()[4], expected);
    assert_eq!(control.actuators.setpoints()[4], expected);
    assert!((expected - 0.31415).abs() < 1e-6);
}

#[test]
fn test_set_thruster_while_killed_acks_without_change() {
    let (mut handler, mut control, now) = setup();
    control.actuators.kill();

    let response = respond(&mut handler, &mut control, now, &SET_THRUSTER_4);
    assert_eq!(response, Some(vec![0x47, 0x44, 0x00, 0x33]));
    assert_eq!(control.actuators.thrusters()[4], 0.0);
    assert_eq!(control.actuators.setpoints()[4], 0.0);
}

#[test]
fn test_set_thruster_index_out_of_range_nacks() {
    let (mut handler, mut control, now) = setup();

    let bad_index = [0x47, 0x44, 0x07, 0x08, 0x45, 0xD8, 0xA0, 0x3E, 0x8E];
    let response = respond(&mut handler, &mut control, now, &bad_index);
    assert_eq!(response, Some(vec![0x47, 0x44, 0x01, 0x34]));
    assert_eq!(*control.actuators.thrusters(), [0.0; THRUSTER_COUNT]);
    assert_eq!(*control.actuators.setpoints(), [0.0; THRUSTER_COUNT]);
    assert_eq!(handler.stats().nacks_sent, 1);
}

#[test]
fn test_set_thruster_value_out_of_range_nacks() {
    let (mut handler, mut control, now) = setup();

    // index 4, 1.5f32 little-endian
    let too_high = [0x47, 0x44, 0x07, 0x04, 0x00, 0x00, 0xC0, 0x3F, 0xA1];
    let response = respond(&mut handler, &mut control, now, &too_high);
    assert_eq!(response, Some(vec![0x47, 0x44, 0x01, 0x34]));
    assert_eq!(*control.actuators.setpoints(), [0.0; THRUSTER_COUNT]);

    let negative = frame::encode(0x07, &[0x02, 0x00, 0x00, 0x80, 0xBF]).unwrap();
    let response = respond(&mut handler, &mut control, now, &negative);
    assert_eq!(response, Some(vec![0x47, 0x44, 0x01, 0x34]));

    let nan = frame::encode(0x07, &[0x02, 0x00, 0x00, 0xC0, 0x7F]).unwrap();
    let response = respond(&mut handler, &mut control, now, &nan);
    assert_eq!(response, Some(vec![0x47, 0x44, 0x01, 0x34]));
    assert_eq!(*control.actuators.thrusters(), [0.0; THRUSTER_COUNT]);
}

#[test]
fn test_set_thruster_wrong_length_nacks() {
    let (mut handler, mut control, now) = setup();

    let short = frame::encode(0x07, &[0x04, 0x45, 0xD8]).unwrap();
    let response = respond(&mut handler, &mut control, now, &short);
    assert_eq!(response, Some(vec![0x47, 0x44, 0x01, 0x34]));

    let bare = frame::encode(0x07, &[]).unwrap();
    let response = respond(&mut handler, &mut control, now, &bare);
    assert_eq!(response, Some(vec![0x47, 0x44, 0x01, 0x34]));
}

#[test]
fn test_big_endian_byte_order() {
    let now = Instant::now();
    let mut handler = ProtocolHandler::new(FloatByteOrder::Big, KillSemantics::WireCompatible);
    let mut control = ControlState::new(DEFAULT_HEARTBEAT_TIMEOUT, now);

    let frame = [0x47, 0x44, 0x07, 0x04, 0x3E, 0xA0, 0xD8, 0x45, 0x62];
    let response = respond(&mut handler, &mut control, now, &frame);
    assert_eq!(response, Some(vec![0x47, 0x44, 0x00, 0x33]));
    assert!((control.actuators.setpoints()[4] - 0.31415).abs() < 1e-6);
}

#[test]
fn test_ack_and_nack_passthrough() {
    let (mut handler, mut control, now) = setup();

    let ack = respond(&mut handler, &mut control, now, &[0x47, 0x44, 0x00, 0x33]);
    let nack = respond(&mut handler, &mut control, now, &[0x47, 0x44, 0x01, 0x34]);
    assert_eq!(ack, Some(vec![0x47, 0x44, 0x01, 0x34]));
    assert_eq!(nack, Some(vec![0x47, 0x44, 0x01, 0x34]));
}

#[test]
fn test_framing_faults_are_silent() {
    let (mut handler, mut control, now) = setup();

    assert_eq!(respond(&mut handler, &mut control, now, &[]), None);
    assert_eq!(respond(&mut handler, &mut control, now, &[0x47]), None);
    assert_eq!(respond(&mut handler, &mut control, now, &[0x47, 0x44, 0x67]), None);
    assert_eq!(respond(&mut handler, &mut control, now, &[0x48, 0x44, 0x02, 0x35]), None);
    assert_eq!(respond(&mut handler, &mut control, now, &[0x47, 0x44, 0x02, 0x36]), None);

    let stats = handler.stats();
    assert_eq!(stats.too_short, 3);
    assert_eq!(stats.bad_header, 1);
    assert_eq!(stats.bad_checksum, 1);
    assert_eq!(stats.frames_dropped(), 5);
    assert_eq!(stats.datagrams_processed, 5);
    assert!(!control.actuators.is_killed());
}

#[test]
fn test_unknown_type_is_ignored() {
    let (mut handler, mut control, now) = setup();

    let unknown = frame::encode(0x42, &[]).unwrap();
    assert_eq!(respond(&mut handler, &mut control, now, &unknown), None);
    assert_eq!(handler.stats().unknown_type, 1);
}

#[test]
fn test_fixed_commands_with_payload_are_dropped() {
    let (mut handler, mut control, now) = setup();

    // GetKillStatus padded to 5 bytes with a valid checksum
    let padded = [0x47, 0x44, 0x02, 0x00, 0x1A];
    assert_eq!(respond(&mut handler, &mut control, now, &padded), None);

    let padded_kill = frame::encode(0x06, &[0x00]).unwrap();
    assert_eq!(respond(&mut handler, &mut control, now, &padded_kill), None);
    assert!(!control.actuators.is_killed());
    assert_eq!(handler.stats().dropped_commands, 2);
}

#[test]
fn test_heartbeat_via_handler_rearms_without_response() {
    let (mut handler, mut control, now) = setup();
    control.actuators.kill();

    assert_eq!(respond(&mut handler, &mut control, now, &HEARTBEAT_FRAME), None);
    assert!(!control.actuators.is_killed());
    assert_eq!(handler.stats().heartbeats, 1);

    // Type 0x04 with a codec-valid trailer is not the heartbeat
    control.actuators.kill();
    assert_eq!(respond(&mut handler, &mut control, now, &[0x47, 0x44, 0x04, 0x37]), None);
    assert!(control.actuators.is_killed());
}

#[test]
fn test_every_response_carries_valid_checksum() {
    let (mut handler, mut control, now) = setup();

    let requests: [&[u8]; 6] = [
        &GET_KILL_STATUS,
        &SET_THRUSTER_4,
        &[0x47, 0x44, 0x00, 0x33],
        &[0x47, 0x44, 0x05, 0x38],
        &[0x47, 0x44, 0x06, 0x39],
        &[0x47, 0x44, 0x07, 0x08, 0x45, 0xD8, 0xA0, 0x3E, 0x8E],
    ];

    for request in requests {
        if let Some(response) = respond(&mut handler, &mut control, now, request) {
            let (trailer, body) = response.split_last().unwrap();
            assert_eq!(checksum(body), *trailer, "response {:02X?}", response);
            assert!(Frame::parse(&response).is_ok());
        }
    }
}

#[test]
fn test_command_decoding() {
    let frame = Frame::parse(&SET_THRUSTER_4).unwrap();
    let command = Command::decode(&frame, FloatByteOrder::Little).unwrap();
    match command {
        Command::SetThruster { index, output } => {
            assert_eq!(index.get(), 4);
            assert!((output.get() - 0.31415).abs() < 1e-6);
        }
        other => panic!("Expected SetThruster, got {:?}", other),
    }

    let frame = Frame::parse(&GET_KILL_STATUS).unwrap();
    assert_eq!(Command::decode(&frame, FloatByteOrder::Little), Ok(Command::GetKillStatus));

    let status = frame::encode(0x03, &[0x00]).unwrap();
    let frame = Frame::parse(&status).unwrap();
    assert_eq!(
        Command::decode(&frame, FloatByteOrder::Little),
        Err(CommandError::ResponseType(CommandType::KillStatus))
    );
}

#[test]
fn test_frame_errors() {
    assert_eq!(Frame::parse(&[0x47, 0x44]), Err(FrameError::TooShort { len: 2 }));
    assert_eq!(
        Frame::parse(&[0x00, 0x44, 0x02, 0x35]),
        Err(FrameError::BadHeader(0x00, 0x44))
    );
    assert_eq!(
        Frame::parse(&[0x47, 0x44, 0x02, 0x00]),
        Err(FrameError::BadChecksum { expected: 0x35, actual: 0x00 })
    );
}

#[test]
fn test_encode_command_round_trips_through_handler() {
    let (mut handler, mut control, now) = setup();

    let command = Command::SetThruster {
        index: ThrusterIndex::new(7).unwrap(),
        output: ThrusterOutput::new(1.0).unwrap(),
    };
    let request = encode_command(command, FloatByteOrder::Little);
    assert_eq!(request.len(), 9);

    let response = respond(&mut handler, &mut control, now, &request);
    assert_eq!(response, Some(vec![0x47, 0x44, 0x00, 0x33]));
    assert_eq!(control.actuators.setpoints()[7], 1.0);

    let heartbeat = encode_command(Command::Heartbeat, FloatByteOrder::Little);
    assert_eq!(heartbeat.as_slice(), &HEARTBEAT_FRAME);
}
